// Proactive link state. Neighbours show up with the first HELLO, the rest of the
// topology once a TC round has been flooded on top of that.

use super::{DYNAMIC_PRIORITY, InstallPath, Route, RouteDecision, RouteQuery, RoutingKind, RoutingProtocol};
use crate::engine::SimTime;

#[derive(Debug, Clone)]
pub struct Olsr {
    pub hello_interval: SimTime,
    pub tc_interval: SimTime,
}

impl Default for Olsr {
    fn default() -> Self {
        Self {
            hello_interval: SimTime::from_secs(2),
            tc_interval: SimTime::from_secs(5),
        }
    }
}

impl Olsr {
    fn known_at(&self, hops: usize) -> SimTime {
        if hops <= 1 {
            self.hello_interval
        } else {
            self.hello_interval + self.tc_interval
        }
    }
}

impl RoutingProtocol for Olsr {
    fn kind(&self) -> RoutingKind {
        RoutingKind::Olsr
    }

    fn install_path(&self) -> InstallPath {
        InstallPath::Table { priority: DYNAMIC_PRIORITY }
    }

    fn route(&self, query: &RouteQuery<'_>) -> RouteDecision {
        match query.channel.shortest_path(query.source, query.destination) {
            Some(path) if query.now >= self.known_at(path.len() - 1) => RouteDecision::Forward(Route {
                path,
                provider: RoutingKind::Olsr,
                source_routed: false,
            }),
            _ => RouteDecision::NoRoute,
        }
    }
}
