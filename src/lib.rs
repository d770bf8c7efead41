pub mod engine;
pub mod error;
pub mod network;
pub mod routing;
pub mod simulation;
pub mod trace;
pub mod traffic;

pub use error::{ScenarioError, ScenarioResult};
pub use simulation::{Scenario, ScenarioArgs, ScenarioConfig, Simulation, SimulationReport};

pub mod prelude {
    pub use crate::engine::{SimTime, Simulator};
    pub use crate::error::{ScenarioError, ScenarioResult};
    pub use crate::network::{NodeId, NodeSet, Packet};
    pub use crate::routing::{RoutingConfiguration, RoutingKind, RoutingRegistry};
    pub use crate::simulation::{Scenario, ScenarioArgs, ScenarioConfig, Simulation, SimulationReport};
    pub use crate::trace::{FlowStats, TraceOptions};
    pub use crate::traffic::{DataRate, DistributionKind, PatternRegistry, TrafficPlan, TransportKind};
}
