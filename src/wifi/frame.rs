//! MAC frames and addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ip::Datagram;
use crate::sim::SimTime;

/// MAC header (24) + LLC/SNAP (8) + FCS (4) carried by every data frame.
pub const MAC_DATA_OVERHEAD: u32 = 36;
/// Size of an RTS control frame.
pub const RTS_SIZE: u32 = 20;
/// Size of a CTS control frame.
pub const CTS_SIZE: u32 = 14;

/// 48-bit MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// Address number `n` of the sequential allocation (`00:00:00:00:00:01`
    /// for n = 1).
    pub fn from_index(n: u64) -> Self {
        let bytes = n.to_be_bytes();
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&bytes[2..]);
        MacAddress(addr)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", b[0], b[1], b[2], b[3], b[4], b[5])
    }
}

/// Hands out unique MAC addresses in sequence.
#[derive(Debug, Default)]
pub struct MacAllocator {
    next: u64,
}

impl MacAllocator {
    pub fn allocate(&mut self) -> MacAddress {
        self.next += 1;
        MacAddress::from_index(self.next)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    Data(Datagram),
    Rts,
    Cts,
}

/// A frame on the air.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub src: MacAddress,
    pub dst: MacAddress,
    pub kind: FrameKind,
    /// Duration field: how long overhearing stations must defer after
    /// this frame ends (virtual carrier sense). Zero for plain data.
    pub nav: SimTime,
}

impl Frame {
    pub fn data(src: MacAddress, dst: MacAddress, datagram: Datagram) -> Self {
        Self { src, dst, kind: FrameKind::Data(datagram), nav: SimTime::ZERO }
    }

    pub fn rts(src: MacAddress, dst: MacAddress, nav: SimTime) -> Self {
        Self { src, dst, kind: FrameKind::Rts, nav }
    }

    pub fn cts(src: MacAddress, dst: MacAddress, nav: SimTime) -> Self {
        Self { src, dst, kind: FrameKind::Cts, nav }
    }

    /// Bytes on the air.
    pub fn size(&self) -> u32 {
        match &self.kind {
            FrameKind::Data(datagram) => datagram.ip_size() + MAC_DATA_OVERHEAD,
            FrameKind::Rts => RTS_SIZE,
            FrameKind::Cts => CTS_SIZE,
        }
    }

    pub fn into_datagram(self) -> Option<Datagram> {
        match self.kind {
            FrameKind::Data(datagram) => Some(datagram),
            _ => None,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self.kind, FrameKind::Data(_))
    }

    pub fn is_for(&self, addr: MacAddress) -> bool {
        self.dst == addr || self.dst.is_broadcast()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    #[test]
    fn test_sequential_mac_allocation() {
        let mut alloc = MacAllocator::default();
        assert_eq!(alloc.allocate().to_string(), "00:00:00:00:00:01");
        assert_eq!(alloc.allocate().to_string(), "00:00:00:00:00:02");
        assert_eq!(MacAddress::from_index(256).to_string(), "00:00:00:00:01:00");
    }

    #[test]
    fn test_frame_sizes() {
        let datagram = Datagram {
            uid: 1,
            src: SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 49153),
            dst: SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 9),
            payload: vec![0; 1024],
        };
        let a = MacAddress::from_index(1);
        let b = MacAddress::from_index(2);
        assert_eq!(Frame::data(a, b, datagram).size(), 1024 + 28 + 36);
        assert_eq!(Frame::rts(a, b, SimTime::ZERO).size(), RTS_SIZE);
        assert_eq!(Frame::cts(a, b, SimTime::ZERO).size(), CTS_SIZE);
    }

    #[test]
    fn test_addressing() {
        let a = MacAddress::from_index(1);
        let b = MacAddress::from_index(2);
        let frame = Frame::rts(a, b, SimTime::ZERO);
        assert!(frame.is_for(b));
        assert!(!frame.is_for(a));
        let bcast = Frame::cts(a, MacAddress::BROADCAST, SimTime::ZERO);
        assert!(bcast.is_for(a));
    }
}
