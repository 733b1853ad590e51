//! The shared wireless medium.
//!
//! Every device attached to a channel hears every transmission on it,
//! subject to the loss model, after a propagation delay that depends on
//! the distance between sender and receiver.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::sim::SimTime;
use crate::topology::{DeviceId, Position};

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PropagationDelayModel {
    /// Delay = distance / speed.
    ConstantSpeed { speed: f64 },
}

impl Default for PropagationDelayModel {
    fn default() -> Self {
        PropagationDelayModel::ConstantSpeed { speed: SPEED_OF_LIGHT }
    }
}

impl PropagationDelayModel {
    pub fn delay(&self, distance: f64) -> SimTime {
        match self {
            PropagationDelayModel::ConstantSpeed { speed } => SimTime::from_secs_f64(distance / speed),
        }
    }
}

/// Whether a signal makes it to a receiver intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum LossModel {
    /// Every receiver hears every frame intact (collisions aside).
    #[default]
    Lossless,
    /// Receivers further than `max_range` metres do not hear the signal
    /// at all, neither for decoding nor for carrier sense.
    Range { max_range: f64 },
    /// The signal is sensed but the frame arrives damaged with the given
    /// probability.
    Random { drop_probability: f64 },
}

/// Channel configuration with documented defaults: speed-of-light delay,
/// lossless propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChannelConfig {
    pub propagation_delay: PropagationDelayModel,
    pub loss: LossModel,
}

/// One receiver's view of a transmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrival {
    pub device: DeviceId,
    /// Propagation delay from the sender.
    pub delay: SimTime,
    /// The frame will be undecodable even without interference.
    pub damaged: bool,
}

#[derive(Debug, Clone)]
pub struct Channel {
    config: ChannelConfig,
    devices: Vec<DeviceId>,
}

impl Channel {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config, devices: Vec::new() }
    }

    pub fn attach(&mut self, device: DeviceId) {
        if !self.devices.contains(&device) {
            self.devices.push(device);
        }
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Work out who hears a transmission from `sender` at `origin`.
    ///
    /// `position_of` resolves a device to its current position. Receivers
    /// are returned in attachment order so the resulting events are
    /// scheduled deterministically.
    pub fn propagate<R, F>(&self, sender: DeviceId, origin: Position, position_of: F, rng: &mut R) -> Vec<Arrival>
    where
        R: Rng + ?Sized,
        F: Fn(DeviceId) -> Position,
    {
        let mut arrivals = Vec::with_capacity(self.devices.len().saturating_sub(1));
        for &device in &self.devices {
            if device == sender {
                continue;
            }
            let distance = origin.distance_to(&position_of(device));
            let damaged = match &self.config.loss {
                LossModel::Lossless => false,
                LossModel::Range { max_range } => {
                    if distance > *max_range {
                        continue;
                    }
                    false
                }
                LossModel::Random { drop_probability } => rng.gen_bool(drop_probability.clamp(0.0, 1.0)),
            };
            arrivals.push(Arrival {
                device,
                delay: self.config.propagation_delay.delay(distance),
                damaged,
            });
        }
        arrivals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn line_positions(device: DeviceId) -> Position {
        Position::new(f64::from(device.0) * 100.0, 0.0)
    }

    #[test]
    fn test_propagation_delay() {
        let model = PropagationDelayModel::default();
        // ~299.79 m per microsecond
        assert_eq!(model.delay(SPEED_OF_LIGHT), SimTime::from_secs(1));
        assert_eq!(model.delay(0.0), SimTime::ZERO);
    }

    #[test]
    fn test_lossless_reaches_everyone_but_sender() {
        let mut channel = Channel::new(ChannelConfig::default());
        for i in 0..3 {
            channel.attach(DeviceId(i));
        }
        let mut rng = StdRng::seed_from_u64(1);
        let arrivals = channel.propagate(DeviceId(0), line_positions(DeviceId(0)), line_positions, &mut rng);
        let devices: Vec<_> = arrivals.iter().map(|a| a.device).collect();
        assert_eq!(devices, vec![DeviceId(1), DeviceId(2)]);
        assert!(arrivals.iter().all(|a| !a.damaged));
        assert!(arrivals[0].delay < arrivals[1].delay);
    }

    #[test]
    fn test_range_loss_hides_far_receivers() {
        let mut channel = Channel::new(ChannelConfig {
            loss: LossModel::Range { max_range: 150.0 },
            ..ChannelConfig::default()
        });
        for i in 0..3 {
            channel.attach(DeviceId(i));
        }
        let mut rng = StdRng::seed_from_u64(1);
        let arrivals = channel.propagate(DeviceId(0), line_positions(DeviceId(0)), line_positions, &mut rng);
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].device, DeviceId(1));
    }

    #[test]
    fn test_random_loss_extremes() {
        let mut channel = Channel::new(ChannelConfig {
            loss: LossModel::Random { drop_probability: 1.0 },
            ..ChannelConfig::default()
        });
        channel.attach(DeviceId(0));
        channel.attach(DeviceId(1));
        let mut rng = StdRng::seed_from_u64(7);
        let arrivals = channel.propagate(DeviceId(0), Position::default(), line_positions, &mut rng);
        assert!(arrivals[0].damaged);
    }
}
