pub mod broadcast;
pub mod onoff;
pub mod rate;
pub mod unicast;

pub use onoff::{OnOffModel, OnOffSampler};
pub use rate::DataRate;

use crate::engine::SimTime;
use crate::error::{ScenarioError, ScenarioResult};
use crate::network::{NodeId, NodeSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

/// Discard port (RFC 863)
pub const DEFAULT_PORT: u16 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// UDP
    Datagram,
    /// TCP
    Connection,
}

impl TransportKind {
    pub fn from_selector(selector: i64) -> ScenarioResult<Self> {
        match selector {
            0 => Ok(TransportKind::Datagram),
            1 => Ok(TransportKind::Connection),
            value => Err(ScenarioError::InvalidSelector { selector: "traffic type", value }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::Datagram => "udp",
            TransportKind::Connection => "tcp",
        }
    }

    pub fn header_len(&self) -> u32 {
        match self {
            TransportKind::Datagram => 8,
            TransportKind::Connection => 20,
        }
    }

    pub fn protocol_number(&self) -> u8 {
        match self {
            TransportKind::Datagram => 17,
            TransportKind::Connection => 6,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistributionKind {
    UnicastFanOut,
    BroadcastFlood,
}

impl DistributionKind {
    pub fn name(&self) -> &'static str {
        match self {
            DistributionKind::UnicastFanOut => "unicast",
            DistributionKind::BroadcastFlood => "broadcast",
        }
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub u32);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowRole {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Unicast { node: NodeId, address: Ipv4Addr },
    Broadcast { address: Ipv4Addr },
    /// What a receiving endpoint binds to
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficFlow {
    pub id: FlowId,
    pub role: FlowRole,
    /// Node the application is installed on
    pub node: NodeId,
    pub destination: Destination,
    pub port: u16,
    pub transport: TransportKind,
    pub packet_size: u32,
    pub data_rate: DataRate,
    pub start: SimTime,
    pub stop: SimTime,
}

impl TrafficFlow {
    pub fn is_sender(&self) -> bool {
        self.role == FlowRole::Sender
    }

    pub fn validate(&self, sim_stop: SimTime) -> ScenarioResult<()> {
        let invalid = |msg: String| Err(ScenarioError::InvalidFlow(format!("flow {}: {msg}", self.id)));
        if self.start >= self.stop {
            return invalid(format!("starts at {}s but stops at {}s", self.start, self.stop));
        }
        if self.stop > sim_stop {
            return invalid(format!("stops at {}s, after the simulation ends at {}s", self.stop, sim_stop));
        }
        if self.packet_size == 0 || self.data_rate.bps() == 0 {
            return invalid("packet size and data rate must be positive".into());
        }
        if self.is_sender() && self.data_rate.packet_interval(self.packet_size) == SimTime::ZERO {
            return invalid(format!("{} bytes at {} leaves no time between packets", self.packet_size, self.data_rate));
        }
        Ok(())
    }
}

/// Everything every flow of a run has in common.
#[derive(Debug, Clone, Copy)]
pub struct FlowParams {
    pub transport: TransportKind,
    pub packet_size: u32,
    pub data_rate: DataRate,
    pub port: u16,
    pub start: SimTime,
    pub stop: SimTime,
    pub broadcast: Ipv4Addr,
}

/// Numbers flows in the order they are produced.
pub(crate) struct FlowBuilder<'a> {
    params: &'a FlowParams,
    flows: Vec<TrafficFlow>,
}

impl<'a> FlowBuilder<'a> {
    pub(crate) fn new(params: &'a FlowParams) -> Self {
        Self {
            params,
            flows: Vec::new(),
        }
    }

    fn push(&mut self, role: FlowRole, node: NodeId, destination: Destination) {
        let p = self.params;
        self.flows.push(TrafficFlow {
            id: FlowId(self.flows.len() as u32),
            role,
            node,
            destination,
            port: p.port,
            transport: p.transport,
            packet_size: p.packet_size,
            data_rate: p.data_rate,
            start: p.start,
            stop: p.stop,
        });
    }

    pub(crate) fn sender(&mut self, node: NodeId, destination: Destination) {
        self.push(FlowRole::Sender, node, destination);
    }

    pub(crate) fn receiver(&mut self, node: NodeId) {
        self.push(FlowRole::Receiver, node, Destination::Any);
    }

    pub(crate) fn finish(self) -> Vec<TrafficFlow> {
        self.flows
    }
}

pub trait TrafficPattern: fmt::Debug + Send + Sync {
    fn kind(&self) -> DistributionKind;
    fn generate(&self, nodes: &NodeSet, params: &FlowParams) -> ScenarioResult<Vec<TrafficFlow>>;
}

/// The flows of one run, checked against the simulation window.
#[derive(Debug, Clone, Default)]
pub struct TrafficPlan {
    flows: Vec<TrafficFlow>,
}

impl TrafficPlan {
    pub fn new(flows: Vec<TrafficFlow>, sim_stop: SimTime) -> ScenarioResult<Self> {
        for (index, flow) in flows.iter().enumerate() {
            if flow.id.0 as usize != index {
                return Err(ScenarioError::InvalidFlow(format!(
                    "flow ids must count up from 0, found {} at position {index}",
                    flow.id
                )));
            }
            flow.validate(sim_stop)?;
        }
        Ok(Self { flows })
    }

    pub fn flows(&self) -> &[TrafficFlow] {
        &self.flows
    }

    pub fn get(&self, id: FlowId) -> Option<&TrafficFlow> {
        self.flows.get(id.0 as usize)
    }

    pub fn senders(&self) -> impl Iterator<Item = &TrafficFlow> {
        self.flows.iter().filter(|f| f.role == FlowRole::Sender)
    }

    pub fn receivers(&self) -> impl Iterator<Item = &TrafficFlow> {
        self.flows.iter().filter(|f| f.role == FlowRole::Receiver)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PatternSettings {
    pub server_count: u32,
}

type PatternFactory = Box<dyn Fn(&PatternSettings) -> Box<dyn TrafficPattern> + Send + Sync>;

pub struct PatternRegistry {
    patterns: BTreeMap<i64, (DistributionKind, PatternFactory)>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            patterns: BTreeMap::new(),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&mut self) {
        self.register(0, DistributionKind::UnicastFanOut, |s| {
            Box::new(unicast::UnicastFanOut::new(s.server_count))
        });
        self.register(1, DistributionKind::BroadcastFlood, |_| Box::new(broadcast::BroadcastFlood));
    }

    pub fn register<F>(&mut self, selector: i64, kind: DistributionKind, factory: F)
    where
        F: Fn(&PatternSettings) -> Box<dyn TrafficPattern> + Send + Sync + 'static,
    {
        self.patterns.insert(selector, (kind, Box::new(factory)));
    }

    pub fn resolve(&self, selector: i64) -> ScenarioResult<DistributionKind> {
        self.patterns
            .get(&selector)
            .map(|(kind, _)| *kind)
            .ok_or(ScenarioError::InvalidSelector { selector: "distribution", value: selector })
    }

    pub fn create(&self, selector: i64, settings: &PatternSettings) -> ScenarioResult<Box<dyn TrafficPattern>> {
        self.patterns
            .get(&selector)
            .map(|(_, factory)| factory(settings))
            .ok_or(ScenarioError::InvalidSelector { selector: "distribution", value: selector })
    }

    pub fn list(&self) -> Vec<(i64, DistributionKind)> {
        self.patterns.iter().map(|(selector, (kind, _))| (*selector, *kind)).collect()
    }

    pub fn global() -> &'static PatternRegistry {
        use std::sync::OnceLock;
        static REGISTRY: OnceLock<PatternRegistry> = OnceLock::new();
        REGISTRY.get_or_init(PatternRegistry::new)
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}
