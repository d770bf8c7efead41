use super::{DYNAMIC_PRIORITY, InstallPath, RouteDecision, RouteQuery, RoutingKind, RoutingProtocol, on_demand_route};
use crate::engine::SimTime;

/// Reactive: nothing is known until someone asks, then an RREQ/RREP round trip later.
#[derive(Debug, Clone)]
pub struct Aodv {
    pub node_traversal_time: SimTime,
}

impl Default for Aodv {
    fn default() -> Self {
        Self {
            node_traversal_time: SimTime::from_millis(40),
        }
    }
}

impl RoutingProtocol for Aodv {
    fn kind(&self) -> RoutingKind {
        RoutingKind::Aodv
    }

    fn install_path(&self) -> InstallPath {
        InstallPath::Table { priority: DYNAMIC_PRIORITY }
    }

    fn route(&self, query: &RouteQuery<'_>) -> RouteDecision {
        on_demand_route(query, RoutingKind::Aodv, self.node_traversal_time, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{GridSpec, NodeId, WifiConfig, WirelessChannel, build_topology};
    use crate::routing::DiscoveryState;

    #[test]
    fn discovery_then_forward() {
        let nodes = build_topology(20, &GridSpec::default()).unwrap();
        let channel = WirelessChannel::new(&nodes, &WifiConfig::default());
        let aodv = Aodv::default();
        let mut query = RouteQuery {
            now: SimTime::from_secs(1),
            source: NodeId(0),
            destination: NodeId(19),
            channel: &channel,
            discovery: None,
        };

        // three hops there and back at 40ms each
        let ready_at = SimTime::from_millis(1_240);
        assert_eq!(aodv.route(&query), RouteDecision::Discover { ready_at });

        query.discovery = Some(DiscoveryState::InProgress { ready_at });
        query.now = SimTime::from_millis(1_100);
        assert_eq!(aodv.route(&query), RouteDecision::Discover { ready_at });

        query.discovery = Some(DiscoveryState::Established);
        let RouteDecision::Forward(route) = aodv.route(&query) else {
            panic!("route should be usable once discovered");
        };
        assert_eq!(route.provider, RoutingKind::Aodv);
        assert_eq!(route.hops(), 3);
    }

    #[test]
    fn unreachable_destination_is_not_discovered() {
        let nodes = build_topology(2, &GridSpec { delta_x: 400.0, ..GridSpec::default() }).unwrap();
        let channel = WirelessChannel::new(&nodes, &WifiConfig::default());
        let query = RouteQuery {
            now: SimTime::from_secs(1),
            source: NodeId(0),
            destination: NodeId(1),
            channel: &channel,
            discovery: None,
        };
        assert_eq!(Aodv::default().route(&query), RouteDecision::NoRoute);
    }
}
