//! Per-device reception tracking and collision detection.
//!
//! The PHY keeps the list of signals currently arriving at a device. Any
//! two that overlap in time damage each other, and anything arriving while
//! the device itself is on the air is lost (half duplex). There is no
//! capture effect.

use serde::{Deserialize, Serialize};

use super::frame::Frame;
use crate::flowmon::DropReason;
use crate::sim::SimTime;

/// Identifies one transmission; every receiver of it sees the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub u64);

#[derive(Debug, Clone)]
struct Reception {
    signal: SignalId,
    frame: Frame,
    damage: Option<DropReason>,
}

/// Frame-level counters for one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhyStats {
    pub tx_frames: u64,
    pub rx_frames: u64,
    pub collisions: u64,
    pub half_duplex_drops: u64,
    pub channel_losses: u64,
}

/// Outcome of a finished reception.
pub type RxOutcome = Result<Frame, (Frame, DropReason)>;

#[derive(Debug, Default)]
pub struct Phy {
    receptions: Vec<Reception>,
    tx_until: SimTime,
    stats: PhyStats,
}

impl Phy {
    pub fn is_transmitting(&self, now: SimTime) -> bool {
        self.tx_until > now
    }

    pub fn is_receiving(&self) -> bool {
        !self.receptions.is_empty()
    }

    pub fn stats(&self) -> &PhyStats {
        &self.stats
    }

    /// First bit of `frame` arrives.
    pub fn begin_rx(&mut self, now: SimTime, signal: SignalId, frame: Frame, damaged: bool) {
        let mut damage = damaged.then_some(DropReason::ChannelLoss);
        if self.is_transmitting(now) {
            damage = Some(DropReason::HalfDuplex);
        }
        if !self.receptions.is_empty() {
            for other in &mut self.receptions {
                other.damage.get_or_insert(DropReason::Collision);
            }
            damage.get_or_insert(DropReason::Collision);
        }
        self.receptions.push(Reception { signal, frame, damage });
    }

    /// Last bit of the signal arrives. Returns `None` for unknown signals.
    pub fn end_rx(&mut self, signal: SignalId) -> Option<RxOutcome> {
        let index = self.receptions.iter().position(|r| r.signal == signal)?;
        let reception = self.receptions.remove(index);
        match reception.damage {
            None => {
                self.stats.rx_frames += 1;
                Some(Ok(reception.frame))
            }
            Some(reason) => {
                match reason {
                    DropReason::Collision => self.stats.collisions += 1,
                    DropReason::HalfDuplex => self.stats.half_duplex_drops += 1,
                    _ => self.stats.channel_losses += 1,
                }
                Some(Err((reception.frame, reason)))
            }
        }
    }

    /// Start transmitting for `duration`. Ongoing receptions are ruined.
    pub fn begin_tx(&mut self, now: SimTime, duration: SimTime) {
        self.tx_until = now + duration;
        self.stats.tx_frames += 1;
        for reception in &mut self.receptions {
            reception.damage.get_or_insert(DropReason::HalfDuplex);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::frame::MacAddress;

    fn rts() -> Frame {
        Frame::rts(MacAddress::from_index(1), MacAddress::from_index(2), SimTime::ZERO)
    }

    #[test]
    fn test_clean_reception() {
        let mut phy = Phy::default();
        phy.begin_rx(SimTime::ZERO, SignalId(1), rts(), false);
        assert!(phy.is_receiving());
        assert!(matches!(phy.end_rx(SignalId(1)), Some(Ok(_))));
        assert!(!phy.is_receiving());
        assert_eq!(phy.stats().rx_frames, 1);
    }

    #[test]
    fn test_overlap_damages_both() {
        let mut phy = Phy::default();
        phy.begin_rx(SimTime::ZERO, SignalId(1), rts(), false);
        phy.begin_rx(SimTime::from_micros(5), SignalId(2), rts(), false);
        assert!(matches!(phy.end_rx(SignalId(1)), Some(Err((_, DropReason::Collision)))));
        assert!(matches!(phy.end_rx(SignalId(2)), Some(Err((_, DropReason::Collision)))));
        assert_eq!(phy.stats().collisions, 2);
    }

    #[test]
    fn test_half_duplex() {
        let mut phy = Phy::default();
        phy.begin_rx(SimTime::ZERO, SignalId(1), rts(), false);
        phy.begin_tx(SimTime::from_micros(1), SimTime::from_micros(100));
        assert!(phy.is_transmitting(SimTime::from_micros(50)));
        assert!(!phy.is_transmitting(SimTime::from_micros(101)));
        phy.begin_rx(SimTime::from_micros(2), SignalId(2), rts(), false);
        assert!(matches!(phy.end_rx(SignalId(1)), Some(Err((_, DropReason::HalfDuplex)))));
        assert!(matches!(phy.end_rx(SignalId(2)), Some(Err((_, DropReason::HalfDuplex)))));
    }

    #[test]
    fn test_channel_damage_and_unknown_signal() {
        let mut phy = Phy::default();
        phy.begin_rx(SimTime::ZERO, SignalId(9), rts(), true);
        assert!(matches!(phy.end_rx(SignalId(9)), Some(Err((_, DropReason::ChannelLoss)))));
        assert!(phy.end_rx(SignalId(9)).is_none());
    }
}
