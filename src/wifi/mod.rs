//! Shared wireless medium and CSMA/CA access.
//!
//! Frames travel from a device's MAC onto the [`Channel`], which works out
//! who hears them and after what delay. Each receiving device tracks
//! overlapping signals in its PHY and hands intact frames back up to its
//! MAC.

pub mod channel;
pub mod device;
pub mod frame;
pub mod mac;
pub mod phy;
pub mod rate;

pub use channel::{Arrival, Channel, ChannelConfig, LossModel, PropagationDelayModel};
pub use device::WifiDevice;
pub use frame::{Frame, FrameKind, MacAddress, MacAllocator};
pub use mac::{Mac, MacContext, MacOutput, MacParameters, MacState, MacStrategy, MacTimer, MacType};
pub use phy::{Phy, PhyStats, SignalId};
pub use rate::{airtime, RateControl};
