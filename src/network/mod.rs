pub mod address;
pub mod channel;
pub mod device;
pub mod packet;
pub mod stack;
pub mod topology;

pub use address::{AddressAllocator, AddressBlock, AddressTable};
pub use channel::WirelessChannel;
pub use device::{MacAddress, WifiConfig, WifiDevice};
pub use packet::{Packet, PacketId};
pub use stack::{InstalledNetwork, install_stack};
pub use topology::{GridLayout, GridSpec, build_topology};

use crate::error::{ScenarioError, ScenarioResult};
use crate::routing::RoutingConfiguration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    position: Position,
    device: Option<WifiDevice>,
    address: Option<Ipv4Addr>,
    routing: Option<Arc<RoutingConfiguration>>,
}

impl Node {
    pub(crate) fn new(id: NodeId, position: Position) -> Self {
        Self {
            id,
            position,
            device: None,
            address: None,
            routing: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn has_stack(&self) -> bool {
        self.device.is_some() && self.routing.is_some()
    }

    pub fn device(&self) -> Option<&WifiDevice> {
        self.device.as_ref()
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        self.address
    }

    pub fn routing(&self) -> Option<&Arc<RoutingConfiguration>> {
        self.routing.as_ref()
    }

    pub(crate) fn attach_stack(&mut self, device: WifiDevice, routing: Arc<RoutingConfiguration>) {
        self.device = Some(device);
        self.routing = Some(routing);
    }

    pub(crate) fn assign_address(&mut self, address: Ipv4Addr) {
        self.address = Some(address);
    }
}

/// The node population of one run, handed explicitly to every component that needs it.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: Vec<Node>,
}

impl NodeSet {
    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
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

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|node| node.id)
    }

    pub fn address_of(&self, id: NodeId) -> ScenarioResult<Ipv4Addr> {
        self.get(id)
            .and_then(Node::address)
            .ok_or(ScenarioError::UnaddressedNode(id.0))
    }
}
