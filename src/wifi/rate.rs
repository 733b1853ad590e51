//! Transmission rate control.

use serde::{Deserialize, Serialize};

use crate::sim::SimTime;

/// PLCP preamble and header, sent before every frame.
pub const PREAMBLE: SimTime = SimTime::from_micros(20);

/// Rate control strategies. The set is closed: new strategies are added as
/// variants, not looked up by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RateControl {
    /// Fixed rates for every transmission, no adaptation.
    Constant {
        /// Data frame rate in bit/s.
        data_rate: u64,
        /// RTS/CTS rate in bit/s.
        control_rate: u64,
    },
}

impl Default for RateControl {
    fn default() -> Self {
        RateControl::Constant { data_rate: 6_000_000, control_rate: 6_000_000 }
    }
}

impl RateControl {
    /// Rate for a data frame of `size` bytes.
    pub fn data_rate(&self, _size: u32) -> u64 {
        match self {
            RateControl::Constant { data_rate, .. } => *data_rate,
        }
    }

    pub fn control_rate(&self) -> u64 {
        match self {
            RateControl::Constant { control_rate, .. } => *control_rate,
        }
    }

    /// Feedback after a transmission the sender knows went through.
    pub fn on_tx_success(&mut self) {
        match self {
            RateControl::Constant { .. } => {}
        }
    }

    /// Feedback after a transmission the sender knows failed.
    pub fn on_tx_failure(&mut self) {
        match self {
            RateControl::Constant { .. } => {}
        }
    }
}

/// Time on the air for `size` bytes at `rate` bit/s, preamble included.
pub fn airtime(size: u32, rate: u64) -> SimTime {
    let bits = u64::from(size) * 8;
    let nanos = (bits * 1_000_000_000).div_ceil(rate.max(1));
    PREAMBLE + SimTime::from_nanos(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_airtime() {
        // 1088 bytes at 6 Mb/s = 1450.67 us, rounded up, plus 20 us preamble
        assert_eq!(airtime(1088, 6_000_000), SimTime::from_nanos(20_000 + 1_450_667));
        assert_eq!(airtime(0, 6_000_000), PREAMBLE);
    }

    #[test]
    fn test_constant_rate_never_adapts() {
        let mut rate = RateControl::default();
        rate.on_tx_failure();
        rate.on_tx_failure();
        assert_eq!(rate.data_rate(1500), 6_000_000);
        rate.on_tx_success();
        assert_eq!(rate.control_rate(), 6_000_000);
    }
}
