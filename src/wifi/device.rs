//! A wireless network interface.

use super::frame::MacAddress;
use super::mac::{Mac, MacParameters};
use super::rate::RateControl;
use crate::topology::{DeviceId, NodeId};

/// Binds a MAC (and the PHY inside it) to the node that owns it.
#[derive(Debug)]
pub struct WifiDevice {
    id: DeviceId,
    node: NodeId,
    mac: Mac,
}

impl WifiDevice {
    pub fn new(id: DeviceId, node: NodeId, address: MacAddress, params: MacParameters, rate: RateControl) -> Self {
        Self { id, node, mac: Mac::new(address, params, rate) }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn address(&self) -> MacAddress {
        self.mac.address()
    }

    pub fn mac(&self) -> &Mac {
        &self.mac
    }

    pub fn mac_mut(&mut self) -> &mut Mac {
        &mut self.mac
    }
}
