pub mod animation;
pub mod ascii;
pub mod pcap;
pub mod stats;

pub use animation::AnimationRecorder;
pub use ascii::AsciiTrace;
pub use pcap::PcapTrace;
pub use stats::{FlowMonitor, FlowStats};

use crate::engine::SimTime;
use crate::network::{NodeId, NodeSet, Packet};
use crate::traffic::{FlowId, TrafficPlan};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropReason {
    NoRoute,
    /// Route discovery buffer for the destination was full
    BufferFull,
    ConnectFailed,
    ReceiverClosed,
    NoReceiver,
}

impl DropReason {
    pub fn name(&self) -> &'static str {
        match self {
            DropReason::NoRoute => "no-route",
            DropReason::BufferFull => "buffer-full",
            DropReason::ConnectFailed => "connect-failed",
            DropReason::ReceiverClosed => "receiver-closed",
            DropReason::NoReceiver => "no-receiver",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// Application handed the packet to the stack
    Send,
    /// Frame went on the air at this node
    Transmit,
    /// Frame came off the air at this node
    Receive,
    /// A receiving endpoint consumed the packet
    Deliver { receiver: FlowId },
    Drop(DropReason),
}

#[derive(Debug, Clone, Copy)]
pub struct TraceRecord<'a> {
    pub time: SimTime,
    pub node: NodeId,
    pub event: TraceEvent,
    pub packet: &'a Packet,
}

pub trait TraceSink {
    fn record(&mut self, record: &TraceRecord<'_>) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOptions {
    /// Where trace files go. Nothing is written without one.
    pub dir: Option<PathBuf>,
    pub prefix: String,
    pub ascii: bool,
    pub pcap: bool,
    pub animation: bool,
    pub flow_stats: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: "adhoc".to_string(),
            ascii: true,
            pcap: true,
            animation: true,
            flow_stats: true,
        }
    }
}

impl TraceOptions {
    pub fn path(&self, suffix: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}{}", self.prefix, suffix)))
    }
}

/// The flow monitor plus whichever file sinks are enabled.
///
/// Sink errors don't stop the run; the first one is kept and returned from [`TraceSet::finish`].
pub struct TraceSet {
    sinks: Vec<Box<dyn TraceSink>>,
    monitor: FlowMonitor,
    first_error: Option<anyhow::Error>,
    options: TraceOptions,
}

impl TraceSet {
    pub fn in_memory(plan: &TrafficPlan) -> Self {
        Self {
            sinks: Vec::new(),
            monitor: FlowMonitor::new(plan),
            first_error: None,
            options: TraceOptions { dir: None, ..TraceOptions::default() },
        }
    }

    pub fn open(options: &TraceOptions, nodes: &NodeSet, plan: &TrafficPlan) -> Result<Self> {
        let mut set = Self::in_memory(plan);
        set.options = options.clone();

        let Some(dir) = &options.dir else {
            return Ok(set);
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;

        if let Some(path) = options.path(".tr").filter(|_| options.ascii) {
            set.sinks.push(Box::new(AsciiTrace::create(&path)?));
        }
        if options.pcap {
            set.sinks.push(Box::new(PcapTrace::create(dir, &options.prefix, nodes)?));
        }
        if let Some(path) = options.path("-anim.json").filter(|_| options.animation) {
            set.sinks.push(Box::new(AnimationRecorder::new(path, nodes)));
        }

        info!("Writing traces to {}", dir.display());
        Ok(set)
    }

    pub fn add_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.sinks.push(sink);
    }

    pub fn record(&mut self, record: TraceRecord<'_>) {
        self.monitor.observe(&record);

        for sink in &mut self.sinks {
            if let Err(e) = sink.record(&record) {
                if self.first_error.is_none() {
                    warn!("Trace sink failed: {:#}", e);
                    self.first_error = Some(e);
                }
            }
        }
    }

    pub fn monitor(&self) -> &FlowMonitor {
        &self.monitor
    }

    /// Flushes every sink and writes the per-flow CSV.
    pub fn finish(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            if let Err(e) = sink.finish() {
                self.first_error.get_or_insert(e);
            }
        }
        self.sinks.clear();

        if let Some(path) = self.options.path("-flows.csv").filter(|_| self.options.flow_stats) {
            write_flow_csv(&path, &self.monitor)?;
            info!("Flow statistics saved to: {}", path.display());
        }

        match self.first_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn write_flow_csv(path: &Path, monitor: &FlowMonitor) -> Result<()> {
    let mut logger = stats::FlowLogger::new(path)?;
    logger.log_batch(&monitor.stats())
}
