// Destination-sequenced distance vector: every update round pushes routes one hop
// further, so an h-hop destination is known after h rounds.

use super::{DYNAMIC_PRIORITY, InstallPath, Route, RouteDecision, RouteQuery, RoutingKind, RoutingProtocol};
use crate::engine::SimTime;

#[derive(Debug, Clone)]
pub struct Dsdv {
    pub hop_update_delay: SimTime,
}

impl Default for Dsdv {
    fn default() -> Self {
        Self {
            hop_update_delay: SimTime::from_secs(1),
        }
    }
}

impl RoutingProtocol for Dsdv {
    fn kind(&self) -> RoutingKind {
        RoutingKind::Dsdv
    }

    fn install_path(&self) -> InstallPath {
        InstallPath::Table { priority: DYNAMIC_PRIORITY }
    }

    fn route(&self, query: &RouteQuery<'_>) -> RouteDecision {
        match query.channel.shortest_path(query.source, query.destination) {
            Some(path) if query.now >= self.hop_update_delay * (path.len() as u64 - 1) => {
                RouteDecision::Forward(Route {
                    path,
                    provider: RoutingKind::Dsdv,
                    source_routed: false,
                })
            }
            _ => RouteDecision::NoRoute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{GridSpec, NodeId, WifiConfig, WirelessChannel, build_topology};

    #[test]
    fn each_hop_costs_one_update_round() {
        let nodes = build_topology(20, &GridSpec::default()).unwrap();
        let channel = WirelessChannel::new(&nodes, &WifiConfig::default());
        let dsdv = Dsdv::default();
        let query = |millis: u64| RouteQuery {
            now: SimTime::from_millis(millis),
            source: NodeId(0),
            destination: NodeId(19),
            channel: &channel,
            discovery: None,
        };

        assert_eq!(dsdv.route(&query(2_999)), RouteDecision::NoRoute);
        assert!(matches!(dsdv.route(&query(3_000)), RouteDecision::Forward(r) if r.hops() == 3));
    }
}
