use crate::engine::SimTime;
use crate::error::{ScenarioError, ScenarioResult};
use crate::network::{AddressBlock, GridSpec, WifiConfig};
use crate::routing::{RoutingKind, RoutingRegistry};
use crate::trace::TraceOptions;
use crate::traffic::{DataRate, DistributionKind, OnOffModel, PatternRegistry, TransportKind, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MIN_STOP_TIME_S: f64 = 6.0;

/// Raw scenario inputs, straight from the command line or a JSON file. Nothing
/// here has been checked yet; see [`ScenarioConfig::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioArgs {
    pub name: Option<String>,
    pub nodes: u32,
    pub servers: u32,
    pub stop_time: f64,
    pub packet_size: u64,
    pub data_rate: String,
    pub traffic_type: i64,
    pub distribution: i64,
    pub routing: i64,
    pub grid: GridSpec,
    pub address_block: String,
    pub port: u16,
    pub app_start: f64,
    pub wifi: WifiConfig,
    pub on_off: OnOffModel,
    pub seed: u64,
    pub output: TraceOptions,
}

impl Default for ScenarioArgs {
    fn default() -> Self {
        Self {
            name: None,
            nodes: 20,
            servers: 2,
            stop_time: 10.0,
            packet_size: 1024,
            data_rate: "100kb/s".to_string(),
            traffic_type: 0,
            distribution: 0,
            routing: 0,
            grid: GridSpec::default(),
            address_block: AddressBlock::default().to_string(),
            port: DEFAULT_PORT,
            app_start: 1.0,
            wifi: WifiConfig::default(),
            on_off: OnOffModel::AlwaysOn,
            seed: 1,
            output: TraceOptions::default(),
        }
    }
}

impl ScenarioArgs {
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse scenario file {}", path.display()))
    }

    pub fn with_routing(mut self, selector: i64) -> Self {
        self.routing = selector;
        self
    }

    pub fn with_distribution(mut self, selector: i64) -> Self {
        self.distribution = selector;
        self
    }

    pub fn with_traffic_type(mut self, selector: i64) -> Self {
        self.traffic_type = selector;
        self
    }

    pub fn with_stop_time(mut self, secs: f64) -> Self {
        self.stop_time = secs;
        self
    }
}

/// A selector value together with what it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Selection<K> {
    pub selector: i64,
    pub kind: K,
}

/// The checked, immutable form of [`ScenarioArgs`]. Built once, read everywhere.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioConfig {
    name: String,
    node_count: u32,
    server_count: u32,
    stop_time: SimTime,
    packet_size: u32,
    data_rate: DataRate,
    transport: Selection<TransportKind>,
    distribution: Selection<DistributionKind>,
    routing: Selection<RoutingKind>,
    grid: GridSpec,
    address_block: AddressBlock,
    port: u16,
    app_start: SimTime,
    wifi: WifiConfig,
    on_off: OnOffModel,
    seed: u64,
    output: TraceOptions,
}

impl ScenarioConfig {
    pub fn resolve(args: &ScenarioArgs) -> ScenarioResult<Self> {
        Self::resolve_with(args, RoutingRegistry::global(), PatternRegistry::global())
    }

    pub fn resolve_with(
        args: &ScenarioArgs,
        routing_registry: &RoutingRegistry,
        pattern_registry: &PatternRegistry,
    ) -> ScenarioResult<Self> {
        let transport = TransportKind::from_selector(args.traffic_type)?;
        let distribution = pattern_registry.resolve(args.distribution)?;
        let routing = routing_registry.configuration(args.routing)?.protocol_kind();

        if distribution == DistributionKind::BroadcastFlood && transport == TransportKind::Connection {
            return Err(ScenarioError::IncompatibleSelectors {
                transport: transport.name(),
                distribution: distribution.name(),
            });
        }

        if !args.stop_time.is_finite() || args.stop_time < MIN_STOP_TIME_S {
            return Err(ScenarioError::StopTimeTooShort {
                stop_time: args.stop_time,
                minimum: MIN_STOP_TIME_S,
            });
        }
        let stop_time = SimTime::from_secs_f64(args.stop_time);

        if args.nodes == 0 {
            return Err(ScenarioError::InvalidNodeCount(args.nodes));
        }
        if distribution == DistributionKind::UnicastFanOut && (args.servers == 0 || args.servers >= args.nodes) {
            return Err(ScenarioError::InvalidServerCount {
                servers: args.servers,
                max: args.nodes - 1,
            });
        }

        let packet_size = u32::try_from(args.packet_size)
            .ok()
            .filter(|size| *size > 0)
            .ok_or(ScenarioError::InvalidPacketSize(args.packet_size))?;
        let data_rate: DataRate = args.data_rate.parse()?;
        if data_rate.packet_interval(packet_size) == SimTime::ZERO {
            return Err(ScenarioError::RateTooHigh {
                packet_size,
                data_rate: data_rate.to_string(),
            });
        }
        let address_block: AddressBlock = args.address_block.parse()?;

        let app_start = SimTime::from_secs_f64(args.app_start);
        if !args.app_start.is_finite() || args.app_start < 0.0 || app_start >= stop_time {
            return Err(ScenarioError::InvalidFlow(format!(
                "applications start at {}s, which is not before the stop time {}s",
                args.app_start, args.stop_time
            )));
        }

        args.grid.validate()?;
        args.on_off.validate()?;
        if !args.wifi.radio_range_m.is_finite() || args.wifi.radio_range_m <= 0.0 || args.wifi.phy_rate_bps == 0 {
            return Err(ScenarioError::InvalidFlow("radio range and PHY rate must be positive".into()));
        }

        let name = args.name.clone().unwrap_or_else(|| {
            format!(
                "{}_{}_{}",
                routing.name().to_lowercase(),
                distribution.name(),
                transport.name()
            )
        });

        Ok(Self {
            name,
            node_count: args.nodes,
            server_count: args.servers,
            stop_time,
            packet_size,
            data_rate,
            transport: Selection { selector: args.traffic_type, kind: transport },
            distribution: Selection { selector: args.distribution, kind: distribution },
            routing: Selection { selector: args.routing, kind: routing },
            grid: args.grid,
            address_block,
            port: args.port,
            app_start,
            wifi: args.wifi.clone(),
            on_off: args.on_off,
            seed: args.seed,
            output: args.output.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn server_count(&self) -> u32 {
        self.server_count
    }

    pub fn stop_time(&self) -> SimTime {
        self.stop_time
    }

    pub fn packet_size(&self) -> u32 {
        self.packet_size
    }

    pub fn data_rate(&self) -> DataRate {
        self.data_rate
    }

    pub fn transport(&self) -> Selection<TransportKind> {
        self.transport
    }

    pub fn distribution(&self) -> Selection<DistributionKind> {
        self.distribution
    }

    pub fn routing(&self) -> Selection<RoutingKind> {
        self.routing
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn address_block(&self) -> AddressBlock {
        self.address_block
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn app_start(&self) -> SimTime {
        self.app_start
    }

    pub fn wifi(&self) -> &WifiConfig {
        &self.wifi
    }

    pub fn on_off(&self) -> OnOffModel {
        self.on_off
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn output(&self) -> &TraceOptions {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let config = ScenarioConfig::resolve(&ScenarioArgs::default()).unwrap();
        assert_eq!(config.node_count(), 20);
        assert_eq!(config.stop_time(), SimTime::from_secs(10));
        assert_eq!(config.data_rate().bps(), 100_000);
        assert_eq!(config.routing().kind, RoutingKind::Olsr);
        assert_eq!(config.transport().kind, TransportKind::Datagram);
        assert_eq!(config.distribution().kind, DistributionKind::UnicastFanOut);
        assert_eq!(config.name(), "olsr_unicast_udp");
    }

    #[test]
    fn stop_time_minimum_is_inclusive() {
        let accepted = ScenarioArgs::default().with_stop_time(6.0);
        assert!(ScenarioConfig::resolve(&accepted).is_ok());

        let rejected = ScenarioArgs::default().with_stop_time(5.999);
        assert!(matches!(
            ScenarioConfig::resolve(&rejected),
            Err(ScenarioError::StopTimeTooShort { minimum: 6.0, .. })
        ));
    }

    #[test]
    fn each_selector_reports_its_own_name() {
        let cases = [
            (ScenarioArgs::default().with_traffic_type(2), "traffic type", 2),
            (ScenarioArgs::default().with_distribution(-1), "distribution", -1),
            (ScenarioArgs::default().with_routing(4), "routing", 4),
        ];
        for (args, selector, value) in cases {
            assert_eq!(
                ScenarioConfig::resolve(&args).unwrap_err(),
                ScenarioError::InvalidSelector { selector, value }
            );
        }
    }

    #[test]
    fn broadcast_over_tcp_is_an_invalid_combination() {
        let args = ScenarioArgs::default().with_distribution(1).with_traffic_type(1);
        assert!(matches!(
            ScenarioConfig::resolve(&args),
            Err(ScenarioError::IncompatibleSelectors { .. })
        ));
    }

    #[test]
    fn server_count_only_matters_for_unicast() {
        let args = ScenarioArgs { servers: 20, ..ScenarioArgs::default() };
        assert!(matches!(
            ScenarioConfig::resolve(&args),
            Err(ScenarioError::InvalidServerCount { servers: 20, max: 19 })
        ));
        assert!(ScenarioConfig::resolve(&args.with_distribution(1)).is_ok());
    }

    #[test]
    fn bad_sizes_and_rates_are_rejected() {
        let zero = ScenarioArgs { packet_size: 0, ..ScenarioArgs::default() };
        assert_eq!(ScenarioConfig::resolve(&zero).unwrap_err(), ScenarioError::InvalidPacketSize(0));

        let rate = ScenarioArgs { data_rate: "lots".into(), ..ScenarioArgs::default() };
        assert_eq!(
            ScenarioConfig::resolve(&rate).unwrap_err(),
            ScenarioError::InvalidDataRate("lots".into())
        );
    }

    #[test]
    fn rate_must_leave_time_between_packets() {
        let args = ScenarioArgs {
            nodes: 2,
            servers: 1,
            packet_size: 1,
            data_rate: "10Gb/s".into(),
            ..ScenarioArgs::default()
        };
        assert_eq!(
            ScenarioConfig::resolve(&args).unwrap_err(),
            ScenarioError::RateTooHigh { packet_size: 1, data_rate: "10Gb/s".into() }
        );

        // 8 bits at 8 Gb/s is exactly one nanosecond
        let slowest_allowed = ScenarioArgs { data_rate: "8Gb/s".into(), ..args };
        let config = ScenarioConfig::resolve(&slowest_allowed).unwrap();
        assert_eq!(config.data_rate().packet_interval(1), SimTime::from_nanos(1));
    }

    #[test]
    fn json_fields_are_optional() {
        let args: ScenarioArgs = serde_json::from_str(r#"{ "routing": 3, "stop_time": 12 }"#).unwrap();
        let config = ScenarioConfig::resolve(&args).unwrap();
        assert_eq!(config.routing().kind, RoutingKind::Dsr);
        assert_eq!(config.stop_time(), SimTime::from_secs(12));
        assert_eq!(config.packet_size(), 1024);
    }
}
