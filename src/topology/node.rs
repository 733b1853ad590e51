//! Nodes and their mobility.

use serde::{Deserialize, Serialize};

use super::types::{DeviceId, NodeId, Position};
use crate::sim::SimTime;

/// How a node's position evolves over simulated time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MobilityModel {
    /// The node never moves.
    ConstantPosition { position: Position },
    /// Straight-line movement at a fixed velocity (m/s) from `origin`,
    /// measured from `since`.
    ConstantVelocity { origin: Position, velocity: Position, since: SimTime },
}

impl MobilityModel {
    pub fn position_at(&self, now: SimTime) -> Position {
        match self {
            MobilityModel::ConstantPosition { position } => *position,
            MobilityModel::ConstantVelocity { origin, velocity, since } => {
                let dt = now.saturating_sub(*since).as_secs_f64();
                Position::new(origin.x + velocity.x * dt, origin.y + velocity.y * dt)
            }
        }
    }

    /// Teleport to `position`, keeping the kind of motion.
    pub fn set_position(&mut self, position: Position, now: SimTime) {
        match self {
            MobilityModel::ConstantPosition { position: p } => *p = position,
            MobilityModel::ConstantVelocity { origin, since, .. } => {
                *origin = position;
                *since = now;
            }
        }
    }
}

/// A simulated host.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    mobility: MobilityModel,
    devices: Vec<DeviceId>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            mobility: MobilityModel::ConstantPosition { position: Position::default() },
            devices: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn attach_device(&mut self, device: DeviceId) {
        self.devices.push(device);
    }

    pub fn mobility(&self) -> &MobilityModel {
        &self.mobility
    }

    pub fn set_mobility(&mut self, mobility: MobilityModel) {
        self.mobility = mobility;
    }

    pub fn position_at(&self, now: SimTime) -> Position {
        self.mobility.position_at(now)
    }
}

/// All nodes of a simulation, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct NodeContainer {
    nodes: Vec<Node>,
}

impl NodeContainer {
    /// Create `count` nodes with ids `0..count`.
    pub fn create(count: u32) -> Self {
        Self {
            nodes: (0..count).map(|i| Node::new(NodeId(i))).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(Node::id)
    }

    /// Install static positions, one per node in id order.
    pub fn install_positions(&mut self, positions: &[Position]) {
        for (node, position) in self.nodes.iter_mut().zip(positions) {
            node.set_mobility(MobilityModel::ConstantPosition { position: *position });
        }
    }
}
