use super::{Destination, DistributionKind, FlowBuilder, FlowParams, TrafficFlow, TrafficPattern};
use crate::error::{ScenarioError, ScenarioResult};
use crate::network::{NodeId, NodeSet};
use tracing::debug;

/// The last `servers` nodes receive, every other node sends to each of them.
#[derive(Debug, Clone)]
pub struct UnicastFanOut {
    servers: u32,
}

impl UnicastFanOut {
    pub fn new(servers: u32) -> Self {
        Self { servers }
    }

    pub fn servers(&self) -> u32 {
        self.servers
    }
}

impl TrafficPattern for UnicastFanOut {
    fn kind(&self) -> DistributionKind {
        DistributionKind::UnicastFanOut
    }

    fn generate(&self, nodes: &NodeSet, params: &FlowParams) -> ScenarioResult<Vec<TrafficFlow>> {
        let count = nodes.len() as u32;
        if self.servers == 0 || self.servers >= count {
            return Err(ScenarioError::InvalidServerCount {
                servers: self.servers,
                max: count.saturating_sub(1),
            });
        }

        let first_server = count - self.servers;
        let servers: Vec<NodeId> = (first_server..count).map(NodeId).collect();
        let clients = (0..first_server).map(NodeId);

        let mut flows = FlowBuilder::new(params);
        for &server in &servers {
            flows.receiver(server);
        }
        for client in clients {
            for &server in &servers {
                let address = nodes.address_of(server)?;
                flows.sender(client, Destination::Unicast { node: server, address });
            }
        }

        debug!(
            "Unicast fan-out: {} clients -> servers {:?}",
            first_server,
            servers.iter().map(|s| s.0).collect::<Vec<_>>()
        );
        Ok(flows.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::test_support::{addressed_nodes, params};
    use crate::traffic::{FlowRole, TransportKind};
    use std::collections::HashSet;

    #[test]
    fn twenty_nodes_two_servers() {
        let nodes = addressed_nodes(20);
        let flows = UnicastFanOut::new(2)
            .generate(&nodes, &params(TransportKind::Datagram))
            .unwrap();

        let receivers: Vec<_> = flows.iter().filter(|f| f.role == FlowRole::Receiver).collect();
        let senders: Vec<_> = flows.iter().filter(|f| f.role == FlowRole::Sender).collect();

        assert_eq!(receivers.len(), 2);
        assert_eq!(senders.len(), 36);
        assert_eq!(
            receivers.iter().map(|f| f.node).collect::<Vec<_>>(),
            vec![NodeId(18), NodeId(19)]
        );

        let pairs: HashSet<_> = senders
            .iter()
            .map(|f| match f.destination {
                Destination::Unicast { node, .. } => (f.node, node),
                other => panic!("unexpected destination {other:?}"),
            })
            .collect();
        assert_eq!(pairs.len(), 36);
        assert!(senders.iter().all(|f| f.node.0 < 18));
    }

    #[test]
    fn senders_target_server_addresses() {
        let nodes = addressed_nodes(4);
        let flows = UnicastFanOut::new(1)
            .generate(&nodes, &params(TransportKind::Connection))
            .unwrap();

        for flow in flows.iter().filter(|f| f.is_sender()) {
            assert_eq!(
                flow.destination,
                Destination::Unicast { node: NodeId(3), address: nodes.address_of(NodeId(3)).unwrap() }
            );
            assert_eq!(flow.transport, TransportKind::Connection);
            assert_eq!(flow.port, 9);
        }
    }

    #[test]
    fn server_count_must_leave_a_client() {
        let nodes = addressed_nodes(3);
        let p = params(TransportKind::Datagram);
        for servers in [0, 3, 5] {
            assert!(matches!(
                UnicastFanOut::new(servers).generate(&nodes, &p),
                Err(ScenarioError::InvalidServerCount { max: 2, .. })
            ));
        }
    }
}
