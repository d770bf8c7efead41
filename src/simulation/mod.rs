pub mod config;
mod world;

pub use config::{MIN_STOP_TIME_S, ScenarioArgs, ScenarioConfig, Selection};

use crate::engine::{RunSummary, SimTime, Simulator};
use crate::error::ScenarioResult;
use crate::network::{InstalledNetwork, NodeSet, build_topology, install_stack};
use crate::routing::{RoutingKind, RoutingRegistry};
use crate::trace::{FlowMonitor, FlowStats, TraceSet};
use crate::traffic::{DistributionKind, FlowParams, PatternRegistry, PatternSettings, TrafficPlan, TransportKind};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use world::{Event, World};

/// A fully constructed run: placed nodes with their stacks installed, and the flows to drive.
#[derive(Debug, Clone)]
pub struct Scenario {
    config: ScenarioConfig,
    nodes: NodeSet,
    network: InstalledNetwork,
    plan: TrafficPlan,
}

impl Scenario {
    pub fn build(config: ScenarioConfig) -> ScenarioResult<Self> {
        Self::build_with(config, RoutingRegistry::global(), PatternRegistry::global())
    }

    pub fn build_with(
        config: ScenarioConfig,
        routing_registry: &RoutingRegistry,
        pattern_registry: &PatternRegistry,
    ) -> ScenarioResult<Self> {
        // Both selectors resolve before any node exists
        let routing = routing_registry.configuration(config.routing().selector)?;
        let pattern = pattern_registry.create(
            config.distribution().selector,
            &PatternSettings { server_count: config.server_count() },
        )?;

        let mut nodes = build_topology(config.node_count(), config.grid())?;
        let network = install_stack(&mut nodes, routing, config.address_block(), config.wifi())?;

        let params = FlowParams {
            transport: config.transport().kind,
            packet_size: config.packet_size(),
            data_rate: config.data_rate(),
            port: config.port(),
            start: config.app_start(),
            stop: config.stop_time(),
            broadcast: network.addresses.broadcast(),
        };
        let plan = TrafficPlan::new(pattern.generate(&nodes, &params)?, config.stop_time())?;

        info!(
            "Scenario {}: {} nodes, {} senders, {} receivers",
            config.name(),
            nodes.len(),
            plan.senders().count(),
            plan.receivers().count()
        );

        Ok(Self { config, nodes, network, plan })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    pub fn network(&self) -> &InstalledNetwork {
        &self.network
    }

    pub fn plan(&self) -> &TrafficPlan {
        &self.plan
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub scenario: String,
    pub routing: RoutingKind,
    pub distribution: DistributionKind,
    pub transport: TransportKind,
    pub nodes: u32,
    pub senders: usize,
    pub receivers: usize,
    pub events_processed: u64,
    pub final_time_s: f64,
    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub packets_dropped: u64,
    /// TCP senders that never got a connection up
    pub connect_failures: u64,
    /// Deliveries over expected deliveries; a broadcast packet is expected at every receiver
    pub delivery_ratio: f64,
    pub flows: Vec<FlowStats>,
}

impl SimulationReport {
    fn new(scenario: &Scenario, summary: RunSummary, monitor: &FlowMonitor) -> Self {
        let config = scenario.config();
        let plan = scenario.plan();
        let receivers = plan.receivers().count();

        let packets_sent = monitor.packets_sent();
        let packets_delivered = monitor.packets_delivered();
        let fan_out = match config.distribution().kind {
            DistributionKind::UnicastFanOut => 1,
            DistributionKind::BroadcastFlood => receivers.max(1) as u64,
        };
        let expected = packets_sent * fan_out;

        Self {
            scenario: config.name().to_string(),
            routing: config.routing().kind,
            distribution: config.distribution().kind,
            transport: config.transport().kind,
            nodes: config.node_count(),
            senders: plan.senders().count(),
            receivers,
            events_processed: summary.events_processed,
            final_time_s: summary.final_time.as_secs_f64(),
            packets_sent,
            packets_delivered,
            packets_dropped: monitor.packets_dropped(),
            connect_failures: monitor.connect_failures(),
            delivery_ratio: if expected == 0 { 0.0 } else { packets_delivered as f64 / expected as f64 },
            flows: monitor.stats(),
        }
    }
}

pub struct Simulation {
    scenario: Scenario,
    show_progress: bool,
}

impl Simulation {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Schedules every flow, runs the clock to the stop time, then flushes the trace sinks.
    pub fn run(&self) -> Result<SimulationReport> {
        let config = self.scenario.config();
        let plan = self.scenario.plan();

        info!("Starting simulation: {}", config.name());
        info!(
            "Routing: {} [{}]",
            config.routing().kind,
            self.scenario.network().routing.describe()
        );
        info!(
            "Traffic: {} over {}, {} bytes at {}",
            config.distribution().kind,
            config.transport().kind,
            config.packet_size(),
            config.data_rate()
        );
        info!("Stop time: {}s", config.stop_time());

        let mut traces = TraceSet::open(config.output(), self.scenario.nodes(), plan)?;

        let mut simulator = Simulator::new();
        simulator.stop_at(config.stop_time());
        for flow in plan.flows() {
            simulator.schedule_at(flow.start, Event::AppStart(flow.id));
            simulator.schedule_at(flow.stop, Event::AppStop(flow.id));
        }

        let progress = if self.show_progress {
            simulator.schedule_at(SimTime::from_secs(1), Event::Tick);
            Some(progress_bar(config.stop_time())?)
        } else {
            None
        };

        let summary = {
            let mut world = World::new(&self.scenario, &mut traces, progress.clone())?;
            simulator.run(&mut world)
        };
        if let Some(pb) = &progress {
            pb.set_position(summary.final_time.as_secs_f64() as u64);
            pb.finish_with_message("Simulation complete");
        }
        simulator.destroy();

        let report = SimulationReport::new(&self.scenario, summary, traces.monitor());
        traces.finish()?;

        if let Some(path) = config.output().path("-report.json") {
            std::fs::write(&path, serde_json::to_string_pretty(&report)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Report saved to: {}", path.display());
        }

        if report.connect_failures > 0 {
            warn!("{} TCP senders failed to connect", report.connect_failures);
        }
        info!(
            "Sent: {} | Delivered: {} | Dropped: {} | Delivery ratio: {:.2}%",
            report.packets_sent,
            report.packets_delivered,
            report.packets_dropped,
            report.delivery_ratio * 100.0
        );

        Ok(report)
    }
}

fn progress_bar(stop: SimTime) -> Result<ProgressBar> {
    let pb = ProgressBar::new(stop.as_secs_f64().ceil() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.orange/yellow} {pos}/{len}s {msg}")?
            .progress_chars("█▓░"),
    );
    Ok(pb)
}
