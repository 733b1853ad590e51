//! IPv4 addressing and the UDP stack.
//!
//! A single flat subnet: every destination is resolved directly to the
//! device that owns the address, with no routing between subnets.

pub mod address;
pub mod datagram;
pub mod stack;

// Re-export commonly used types
pub use address::{AddressError, AddressTable, Ipv4AddressAllocator};
pub use datagram::{Datagram, IP_UDP_HEADER, UDP_PROTOCOL};
pub use stack::{SendOutcome, StackError, UdpStack, EPHEMERAL_PORT_START};
