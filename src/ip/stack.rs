//! UDP sockets and datagram delivery.
//!
//! The stack resolves destinations through the [`AddressTable`], reports
//! every send, receive and drop to the packet tap, and maps arriving
//! datagrams to the application bound at `(node, port)`. It never calls
//! into the MAC or the applications itself: it returns what should happen
//! and the simulation carries it out.

use std::collections::BTreeMap;
use std::net::SocketAddrV4;

use super::address::AddressTable;
use super::datagram::Datagram;
use crate::apps::AppId;
use crate::flowmon::{DropReason, PacketTap};
use crate::sim::SimTime;
use crate::topology::{DeviceId, NodeId};

/// First port handed out by [`UdpStack::bind_ephemeral`].
pub const EPHEMERAL_PORT_START: u16 = 49153;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    #[error("port {port} on {node} is already bound")]
    PortInUse { node: NodeId, port: u16 },
    #[error("no ephemeral ports left on {0}")]
    EphemeralPortsExhausted(NodeId),
    #[error("{0} has no IPv4 address")]
    NoAddress(DeviceId),
}

/// Result of handing a datagram to the stack for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Destination resolved; the datagram should go out on the source
    /// device addressed to `dst_device`.
    Routed { dst_device: DeviceId, datagram: Datagram },
    /// Destination not in the subnet. Already reported to the tap.
    NoRoute,
}

#[derive(Debug, Default)]
pub struct UdpStack {
    table: AddressTable,
    sockets: BTreeMap<(NodeId, u16), AppId>,
    bindings: BTreeMap<AppId, (NodeId, u16)>,
    next_ephemeral: BTreeMap<NodeId, u16>,
    next_uid: u64,
}

impl UdpStack {
    pub fn new(table: AddressTable) -> Self {
        Self { table, ..Self::default() }
    }

    pub fn table(&self) -> &AddressTable {
        &self.table
    }

    pub fn bind(&mut self, node: NodeId, port: u16, app: AppId) -> Result<(), StackError> {
        if self.sockets.contains_key(&(node, port)) {
            return Err(StackError::PortInUse { node, port });
        }
        self.sockets.insert((node, port), app);
        self.bindings.insert(app, (node, port));
        Ok(())
    }

    /// Bind `app` to the next free port from 49153 upwards on `node`.
    pub fn bind_ephemeral(&mut self, node: NodeId, app: AppId) -> Result<u16, StackError> {
        let span = u32::from(u16::MAX - EPHEMERAL_PORT_START) + 1;
        let mut port = *self.next_ephemeral.get(&node).unwrap_or(&EPHEMERAL_PORT_START);
        for _ in 0..span {
            let candidate = port;
            port = if port == u16::MAX { EPHEMERAL_PORT_START } else { port + 1 };
            if !self.sockets.contains_key(&(node, candidate)) {
                self.next_ephemeral.insert(node, port);
                self.bind(node, candidate, app)?;
                return Ok(candidate);
            }
        }
        Err(StackError::EphemeralPortsExhausted(node))
    }

    /// Release whatever `app` has bound. Unbinding twice is a no-op.
    pub fn unbind(&mut self, app: AppId) {
        if let Some(key) = self.bindings.remove(&app) {
            self.sockets.remove(&key);
        }
    }

    pub fn local_port(&self, app: AppId) -> Option<u16> {
        self.bindings.get(&app).map(|&(_, port)| port)
    }

    pub fn socket(&self, node: NodeId, port: u16) -> Option<AppId> {
        self.sockets.get(&(node, port)).copied()
    }

    /// Stamp a new datagram from `src_device:src_port`, report it to the
    /// tap and resolve its destination.
    pub fn send_datagram(
        &mut self,
        now: SimTime,
        src_device: DeviceId,
        src_port: u16,
        dst: SocketAddrV4,
        payload: Vec<u8>,
        tap: &mut dyn PacketTap,
    ) -> Result<SendOutcome, StackError> {
        let src_addr = self.table.address_of(src_device).ok_or(StackError::NoAddress(src_device))?;
        self.next_uid += 1;
        let datagram = Datagram {
            uid: self.next_uid,
            src: SocketAddrV4::new(src_addr, src_port),
            dst,
            payload,
        };
        tap.on_send(now, &datagram);

        match self.table.resolve(*dst.ip()) {
            Some(dst_device) => Ok(SendOutcome::Routed { dst_device, datagram }),
            None => {
                log::debug!("No route to {}, dropping datagram {}", dst.ip(), datagram.uid);
                tap.on_drop(now, &datagram, DropReason::NoRoute);
                Ok(SendOutcome::NoRoute)
            }
        }
    }

    /// An intact datagram arrived at `node`. Returns the application bound
    /// to its destination port, if any.
    pub fn receive(&mut self, now: SimTime, node: NodeId, datagram: &Datagram, tap: &mut dyn PacketTap) -> Option<AppId> {
        tap.on_receive(now, datagram);
        let app = self.socket(node, datagram.dst.port());
        if app.is_none() {
            log::trace!("No socket on {} port {}, discarding datagram {}", node, datagram.dst.port(), datagram.uid);
            tap.on_drop(now, datagram, DropReason::NoSocket);
        }
        app
    }
}
