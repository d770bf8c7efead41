pub mod aodv;
pub mod dsdv;
pub mod dsr;
pub mod olsr;
pub mod static_routing;

use crate::engine::SimTime;
use crate::error::{ScenarioError, ScenarioResult};
use crate::network::{NodeId, WirelessChannel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub const FALLBACK_PRIORITY: i16 = 0;
pub const DYNAMIC_PRIORITY: i16 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingKind {
    Static,
    Olsr,
    Aodv,
    Dsdv,
    Dsr,
}

impl RoutingKind {
    pub fn name(&self) -> &'static str {
        match self {
            RoutingKind::Static => "static",
            RoutingKind::Olsr => "OLSR",
            RoutingKind::Aodv => "AODV",
            RoutingKind::Dsdv => "DSDV",
            RoutingKind::Dsr => "DSR",
        }
    }

    pub fn is_dynamic(&self) -> bool {
        !matches!(self, RoutingKind::Static)
    }
}

impl fmt::Display for RoutingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a protocol hooks into the network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPath {
    /// Consulted through the routing table at the given priority
    Table { priority: i16 },
    /// Grabs packets below the routing layer and never registers a table entry
    Intercept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    InProgress { ready_at: SimTime },
    Established,
}

pub struct RouteQuery<'a> {
    pub now: SimTime,
    pub source: NodeId,
    pub destination: NodeId,
    pub channel: &'a WirelessChannel,
    /// Per (source, destination) state kept by the runtime for on-demand protocols
    pub discovery: Option<DiscoveryState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Both endpoints included
    pub path: Vec<NodeId>,
    pub provider: RoutingKind,
    pub source_routed: bool,
}

impl Route {
    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    pub fn next_hop(&self) -> Option<NodeId> {
        self.path.get(1).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Forward(Route),
    /// No route yet; one will exist at `ready_at`, hold the packet until then
    Discover { ready_at: SimTime },
    NoRoute,
}

pub trait RoutingProtocol: fmt::Debug + Send + Sync {
    fn kind(&self) -> RoutingKind;
    fn install_path(&self) -> InstallPath;
    fn route(&self, query: &RouteQuery<'_>) -> RouteDecision;
}

// Shared by the on-demand protocols: a route exists only after a request/reply round trip.
pub(crate) fn on_demand_route(
    query: &RouteQuery<'_>,
    kind: RoutingKind,
    node_traversal: SimTime,
    source_routed: bool,
) -> RouteDecision {
    let Some(path) = query.channel.shortest_path(query.source, query.destination) else {
        return RouteDecision::NoRoute;
    };

    match query.discovery {
        Some(DiscoveryState::Established) => RouteDecision::Forward(Route {
            path,
            provider: kind,
            source_routed,
        }),
        Some(DiscoveryState::InProgress { ready_at }) => RouteDecision::Discover { ready_at },
        None => {
            let hops = (path.len() - 1) as u64;
            RouteDecision::Discover {
                ready_at: query.now + node_traversal * (2 * hops),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutingEntry {
    pub priority: i16,
    protocol: Arc<dyn RoutingProtocol>,
}

impl RoutingEntry {
    pub fn new(protocol: Arc<dyn RoutingProtocol>, priority: i16) -> Self {
        Self { priority, protocol }
    }

    pub fn kind(&self) -> RoutingKind {
        self.protocol.kind()
    }

    pub fn protocol(&self) -> &dyn RoutingProtocol {
        self.protocol.as_ref()
    }
}

/// Ordered routing contributors shared by every node of a run.
///
/// Entries are kept highest priority first. The static fallback is always the
/// last entry; a source-routing interceptor, if any, is consulted before them all.
#[derive(Debug, Clone)]
pub struct RoutingConfiguration {
    entries: Vec<RoutingEntry>,
    interceptor: Option<Arc<dyn RoutingProtocol>>,
}

impl RoutingConfiguration {
    pub fn new(
        mut entries: Vec<RoutingEntry>,
        interceptor: Option<Arc<dyn RoutingProtocol>>,
    ) -> ScenarioResult<Self> {
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        let config = Self { entries, interceptor };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScenarioResult<()> {
        let malformed = |msg: String| Err(ScenarioError::MalformedRouting(msg));

        let fallbacks = self.entries.iter().filter(|e| e.kind() == RoutingKind::Static).count();
        if fallbacks != 1 {
            return malformed(format!("expected exactly one static fallback entry, found {fallbacks}"));
        }
        if self.entries.last().map(RoutingEntry::kind) != Some(RoutingKind::Static) {
            return malformed("static fallback is not at the lowest priority".into());
        }

        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.priority) {
                return malformed(format!("duplicate priority {}", entry.priority));
            }
            if entry.protocol.install_path() == InstallPath::Intercept {
                return malformed(format!("{} cannot be a routing table entry", entry.kind()));
            }
        }

        let dynamic = self.entries.iter().filter(|e| e.kind().is_dynamic()).count()
            + self.interceptor.iter().count();
        if dynamic > 1 {
            return malformed(format!("at most one dynamic protocol allowed, found {dynamic}"));
        }

        if let Some(interceptor) = &self.interceptor {
            if interceptor.install_path() != InstallPath::Intercept {
                return malformed(format!("{} does not intercept packets", interceptor.kind()));
            }
        }

        Ok(())
    }

    /// Highest priority first.
    pub fn entries(&self) -> &[RoutingEntry] {
        &self.entries
    }

    pub fn fallback(&self) -> Option<&RoutingEntry> {
        self.entries.last()
    }

    pub fn dynamic(&self) -> Option<&RoutingEntry> {
        self.entries.iter().find(|e| e.kind().is_dynamic())
    }

    pub fn interceptor(&self) -> Option<RoutingKind> {
        self.interceptor.as_ref().map(|p| p.kind())
    }

    pub fn uses_source_routing(&self) -> bool {
        self.interceptor.is_some()
    }

    /// The multi-hop protocol of this configuration, table entry or interceptor.
    pub fn protocol_kind(&self) -> RoutingKind {
        self.interceptor()
            .or_else(|| self.dynamic().map(RoutingEntry::kind))
            .unwrap_or(RoutingKind::Static)
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(kind) = self.interceptor() {
            parts.push(format!("{kind} intercept"));
        }
        for entry in &self.entries {
            parts.push(format!("{}@{}", entry.kind(), entry.priority));
        }
        parts.join(", ")
    }

    pub fn route(&self, query: &RouteQuery<'_>) -> RouteDecision {
        let interceptor = self.interceptor.iter().map(|p| p.as_ref());
        let table = self.entries.iter().map(|e| e.protocol.as_ref());

        for protocol in interceptor.chain(table) {
            match protocol.route(query) {
                RouteDecision::NoRoute => continue,
                decision => return decision,
            }
        }
        RouteDecision::NoRoute
    }
}

type ProtocolFactory = Box<dyn Fn() -> Arc<dyn RoutingProtocol> + Send + Sync>;

pub struct RoutingRegistry {
    protocols: BTreeMap<i64, ProtocolFactory>,
}

impl RoutingRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            protocols: BTreeMap::new(),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&mut self) {
        self.register(0, || Arc::new(olsr::Olsr::default()));
        self.register(1, || Arc::new(aodv::Aodv::default()));
        self.register(2, || Arc::new(dsdv::Dsdv::default()));
        self.register(3, || Arc::new(dsr::Dsr::default()));
    }

    pub fn register<F>(&mut self, selector: i64, factory: F)
    where
        F: Fn() -> Arc<dyn RoutingProtocol> + Send + Sync + 'static,
    {
        self.protocols.insert(selector, Box::new(factory));
    }

    pub fn contains(&self, selector: i64) -> bool {
        self.protocols.contains_key(&selector)
    }

    /// Static fallback plus the protocol registered under `selector`, placed
    /// according to how that protocol installs itself.
    pub fn configuration(&self, selector: i64) -> ScenarioResult<RoutingConfiguration> {
        let factory = self.protocols.get(&selector).ok_or(ScenarioError::InvalidSelector {
            selector: "routing",
            value: selector,
        })?;
        let protocol = factory();
        let fallback = RoutingEntry::new(Arc::new(static_routing::StaticRouting), FALLBACK_PRIORITY);

        match protocol.install_path() {
            InstallPath::Table { priority } => {
                RoutingConfiguration::new(vec![fallback, RoutingEntry::new(protocol, priority)], None)
            }
            InstallPath::Intercept => RoutingConfiguration::new(vec![fallback], Some(protocol)),
        }
    }

    pub fn list(&self) -> Vec<(i64, RoutingKind)> {
        self.protocols
            .iter()
            .map(|(selector, factory)| (*selector, factory().kind()))
            .collect()
    }

    pub fn global() -> &'static RoutingRegistry {
        use std::sync::OnceLock;
        static REGISTRY: OnceLock<RoutingRegistry> = OnceLock::new();
        REGISTRY.get_or_init(RoutingRegistry::new)
    }
}

impl Default for RoutingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{GridSpec, WifiConfig, build_topology};

    #[test]
    fn table_protocols_sit_above_the_fallback() {
        for (selector, kind) in [(0, RoutingKind::Olsr), (1, RoutingKind::Aodv), (2, RoutingKind::Dsdv)] {
            let config = RoutingRegistry::global().configuration(selector).unwrap();
            let entries = config.entries();

            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].kind(), kind);
            assert_eq!(entries[1].kind(), RoutingKind::Static);
            assert!(entries[0].priority > entries[1].priority);
            assert_eq!(config.interceptor(), None);
            assert_eq!(config.protocol_kind(), kind);
        }
    }

    #[test]
    fn dsr_intercepts_instead_of_registering() {
        let config = RoutingRegistry::global().configuration(3).unwrap();
        assert_eq!(config.entries().len(), 1);
        assert_eq!(config.fallback().unwrap().kind(), RoutingKind::Static);
        assert_eq!(config.dynamic().map(RoutingEntry::kind), None);
        assert_eq!(config.interceptor(), Some(RoutingKind::Dsr));
        assert!(config.uses_source_routing());
        assert_eq!(config.describe(), "DSR intercept, static@0");
    }

    #[test]
    fn unknown_selectors_are_rejected() {
        for selector in [-1, 4, 99] {
            assert_eq!(
                RoutingRegistry::global().configuration(selector).unwrap_err(),
                ScenarioError::InvalidSelector { selector: "routing", value: selector }
            );
        }
    }

    #[test]
    fn missing_fallback_is_malformed() {
        let olsr = RoutingEntry::new(Arc::new(olsr::Olsr::default()), DYNAMIC_PRIORITY);
        assert!(matches!(
            RoutingConfiguration::new(vec![olsr], None),
            Err(ScenarioError::MalformedRouting(_))
        ));
    }

    #[test]
    fn duplicate_priorities_are_malformed() {
        let entries = vec![
            RoutingEntry::new(Arc::new(static_routing::StaticRouting), 0),
            RoutingEntry::new(Arc::new(aodv::Aodv::default()), 0),
        ];
        assert!(matches!(
            RoutingConfiguration::new(entries, None),
            Err(ScenarioError::MalformedRouting(_))
        ));
    }

    #[test]
    fn two_dynamic_protocols_are_malformed() {
        let entries = vec![
            RoutingEntry::new(Arc::new(static_routing::StaticRouting), 0),
            RoutingEntry::new(Arc::new(olsr::Olsr::default()), 10),
            RoutingEntry::new(Arc::new(aodv::Aodv::default()), 20),
        ];
        assert!(RoutingConfiguration::new(entries, None).is_err());

        let entries = vec![
            RoutingEntry::new(Arc::new(static_routing::StaticRouting), 0),
            RoutingEntry::new(Arc::new(olsr::Olsr::default()), 10),
        ];
        assert!(RoutingConfiguration::new(entries, Some(Arc::new(dsr::Dsr::default()))).is_err());
    }

    #[test]
    fn fallback_answers_when_dynamic_protocol_has_nothing() {
        let nodes = build_topology(20, &GridSpec::default()).unwrap();
        let channel = WirelessChannel::new(&nodes, &WifiConfig::default());
        let config = RoutingRegistry::global().configuration(0).unwrap();

        // before the first HELLO, OLSR knows nobody and static covers direct neighbours
        let query = RouteQuery {
            now: SimTime::from_secs(1),
            source: NodeId(0),
            destination: NodeId(1),
            channel: &channel,
            discovery: None,
        };
        let RouteDecision::Forward(route) = config.route(&query) else {
            panic!("expected a route");
        };
        assert_eq!(route.provider, RoutingKind::Static);
        assert_eq!(route.path, vec![NodeId(0), NodeId(1)]);

        let far = RouteQuery { destination: NodeId(19), ..query };
        assert_eq!(config.route(&far), RouteDecision::NoRoute);
    }
}
