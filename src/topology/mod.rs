//! Node and topology model.
//!
//! This module holds node identity, device bindings, placement strategies
//! and mobility models.

pub mod node;
pub mod placement;
pub mod types;

// Re-export key types for easier access
pub use node::{MobilityModel, Node, NodeContainer};
pub use placement::{GridLayout, GridPositionAllocator, Placement};
pub use types::{DeviceId, NodeId, Position};
