use super::{InstallPath, RouteDecision, RouteQuery, RoutingKind, RoutingProtocol, on_demand_route};
use crate::engine::SimTime;

/// Dynamic source routing. Discovers like AODV but puts the whole path in the
/// packet and sits below the routing table instead of inside it.
#[derive(Debug, Clone)]
pub struct Dsr {
    pub node_traversal_time: SimTime,
}

impl Default for Dsr {
    fn default() -> Self {
        Self {
            node_traversal_time: SimTime::from_millis(40),
        }
    }
}

impl RoutingProtocol for Dsr {
    fn kind(&self) -> RoutingKind {
        RoutingKind::Dsr
    }

    fn install_path(&self) -> InstallPath {
        InstallPath::Intercept
    }

    fn route(&self, query: &RouteQuery<'_>) -> RouteDecision {
        on_demand_route(query, RoutingKind::Dsr, self.node_traversal_time, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{GridSpec, NodeId, WifiConfig, WirelessChannel, build_topology};
    use crate::routing::DiscoveryState;

    #[test]
    fn established_routes_are_source_routed() {
        let nodes = build_topology(20, &GridSpec::default()).unwrap();
        let channel = WirelessChannel::new(&nodes, &WifiConfig::default());
        let query = RouteQuery {
            now: SimTime::from_secs(2),
            source: NodeId(3),
            destination: NodeId(15),
            channel: &channel,
            discovery: Some(DiscoveryState::Established),
        };

        let RouteDecision::Forward(route) = Dsr::default().route(&query) else {
            panic!("expected a source route");
        };
        assert!(route.source_routed);
        assert_eq!(route.path.first(), Some(&NodeId(3)));
        assert_eq!(route.path.last(), Some(&NodeId(15)));
    }
}
