use super::{FALLBACK_PRIORITY, InstallPath, Route, RouteDecision, RouteQuery, RoutingKind, RoutingProtocol};

/// The on-link subnet route: reaches whoever is in radio range, nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRouting;

impl RoutingProtocol for StaticRouting {
    fn kind(&self) -> RoutingKind {
        RoutingKind::Static
    }

    fn install_path(&self) -> InstallPath {
        InstallPath::Table { priority: FALLBACK_PRIORITY }
    }

    fn route(&self, query: &RouteQuery<'_>) -> RouteDecision {
        if query.channel.in_range(query.source, query.destination) {
            RouteDecision::Forward(Route {
                path: vec![query.source, query.destination],
                provider: RoutingKind::Static,
                source_routed: false,
            })
        } else {
            RouteDecision::NoRoute
        }
    }
}
