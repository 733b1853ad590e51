//! Packet tap interface.
//!
//! The network stack and the MAC report datagram sends, receptions and
//! drops through [`PacketTap`]. Taps only observe: nothing they do can
//! change what happens to a packet.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ip::Datagram;
use crate::sim::SimTime;

/// Why a datagram never reached its destination socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Overlapping receptions at the receiver.
    Collision,
    /// The receiver was transmitting while the frame arrived.
    HalfDuplex,
    /// Damaged by the channel loss model.
    ChannelLoss,
    /// Destination address not resolvable in the subnet.
    NoRoute,
    /// Device transmit queue full.
    QueueOverflow,
    /// RTS/CTS handshake failed too many times.
    RetryExhausted,
    /// Arrived, but no socket is bound to the destination port.
    NoSocket,
}

impl DropReason {
    /// Drops that happen before the receiver's IP layer saw the packet.
    pub fn is_loss(self) -> bool {
        !matches!(self, DropReason::NoSocket)
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DropReason::Collision => "collision",
            DropReason::HalfDuplex => "half_duplex",
            DropReason::ChannelLoss => "channel_loss",
            DropReason::NoRoute => "no_route",
            DropReason::QueueOverflow => "queue_overflow",
            DropReason::RetryExhausted => "retry_exhausted",
            DropReason::NoSocket => "no_socket",
        };
        f.write_str(name)
    }
}

/// Passive observer of datagram events.
pub trait PacketTap {
    fn on_send(&mut self, now: SimTime, datagram: &Datagram);
    fn on_receive(&mut self, now: SimTime, datagram: &Datagram);
    fn on_drop(&mut self, now: SimTime, datagram: &Datagram, reason: DropReason);
}

/// A tap that ignores everything, for runs without a flow monitor.
#[derive(Debug, Default)]
pub struct NullTap;

impl PacketTap for NullTap {
    fn on_send(&mut self, _now: SimTime, _datagram: &Datagram) {}
    fn on_receive(&mut self, _now: SimTime, _datagram: &Datagram) {}
    fn on_drop(&mut self, _now: SimTime, _datagram: &Datagram, _reason: DropReason) {}
}
