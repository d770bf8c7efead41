use super::{Destination, DistributionKind, FlowBuilder, FlowParams, TrafficFlow, TrafficPattern, TransportKind};
use crate::error::{ScenarioError, ScenarioResult};
use crate::network::{NodeId, NodeSet};

/// Node 0 floods the broadcast address; everyone else listens.
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastFlood;

impl TrafficPattern for BroadcastFlood {
    fn kind(&self) -> DistributionKind {
        DistributionKind::BroadcastFlood
    }

    fn generate(&self, nodes: &NodeSet, params: &FlowParams) -> ScenarioResult<Vec<TrafficFlow>> {
        if params.transport == TransportKind::Connection {
            return Err(ScenarioError::IncompatibleSelectors {
                transport: params.transport.name(),
                distribution: self.kind().name(),
            });
        }
        if nodes.is_empty() {
            return Err(ScenarioError::InvalidNodeCount(0));
        }

        let mut flows = FlowBuilder::new(params);
        flows.sender(NodeId(0), Destination::Broadcast { address: params.broadcast });
        for id in nodes.ids().filter(|id| id.0 != 0) {
            flows.receiver(id);
        }
        Ok(flows.finish())
    }
}
