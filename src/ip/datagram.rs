//! UDP datagrams.

use std::net::SocketAddrV4;

/// IP protocol number for UDP.
pub const UDP_PROTOCOL: u8 = 17;
/// IPv4 header (20) + UDP header (8).
pub const IP_UDP_HEADER: u32 = 28;

/// A UDP datagram in flight. `uid` is unique per send within a simulation
/// and is how the flow monitor matches a receive to its send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub uid: u64,
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn protocol(&self) -> u8 {
        UDP_PROTOCOL
    }

    /// Size of the IP packet carrying this datagram.
    pub fn ip_size(&self) -> u32 {
        self.payload.len() as u32 + IP_UDP_HEADER
    }
}
