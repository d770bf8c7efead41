use super::{DropReason, TraceEvent, TraceRecord};
use crate::engine::SimTime;
use crate::network::NodeId;
use crate::traffic::{FlowId, FlowRole, TrafficPlan};
use anyhow::Result;
use csv::Writer;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    pub flow: u32,
    pub node: u32,
    pub role: FlowRole,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub dropped: u64,
    /// Connects abandoned after the last retry; no data packet was lost
    pub connect_failures: u64,
    pub first_tx_s: Option<f64>,
    pub last_rx_s: Option<f64>,
    pub mean_delay_ms: Option<f64>,
}

#[derive(Debug, Clone)]
struct Counters {
    node: NodeId,
    role: FlowRole,
    tx_packets: u64,
    tx_bytes: u64,
    rx_packets: u64,
    rx_bytes: u64,
    dropped: u64,
    connect_failures: u64,
    first_tx: Option<SimTime>,
    last_rx: Option<SimTime>,
    total_delay: SimTime,
}

/// Per-flow packet counters, fed from trace records.
///
/// A sender counts what it sent and how much of it arrived anywhere; a
/// receiver counts what it consumed.
#[derive(Debug, Clone)]
pub struct FlowMonitor {
    flows: Vec<Counters>,
}

impl FlowMonitor {
    pub fn new(plan: &TrafficPlan) -> Self {
        let flows = plan
            .flows()
            .iter()
            .map(|flow| Counters {
                node: flow.node,
                role: flow.role,
                tx_packets: 0,
                tx_bytes: 0,
                rx_packets: 0,
                rx_bytes: 0,
                dropped: 0,
                connect_failures: 0,
                first_tx: None,
                last_rx: None,
                total_delay: SimTime::ZERO,
            })
            .collect();
        Self { flows }
    }

    fn counters(&mut self, flow: FlowId) -> Option<&mut Counters> {
        self.flows.get_mut(flow.0 as usize)
    }

    pub fn observe(&mut self, record: &TraceRecord<'_>) {
        let packet = record.packet;
        let bytes = packet.payload_size as u64;

        match record.event {
            TraceEvent::Send => {
                if let Some(c) = self.counters(packet.flow) {
                    c.tx_packets += 1;
                    c.tx_bytes += bytes;
                    c.first_tx.get_or_insert(record.time);
                }
            }
            TraceEvent::Deliver { receiver } => {
                let delay = packet.sojourn_time(record.time);
                for flow in [packet.flow, receiver] {
                    if let Some(c) = self.counters(flow) {
                        c.rx_packets += 1;
                        c.rx_bytes += bytes;
                        c.last_rx = Some(record.time);
                        c.total_delay = c.total_delay + delay;
                    }
                }
            }
            TraceEvent::Drop(DropReason::ConnectFailed) => {
                if let Some(c) = self.counters(packet.flow) {
                    c.connect_failures += 1;
                }
            }
            TraceEvent::Drop(_) => {
                if let Some(c) = self.counters(packet.flow) {
                    c.dropped += 1;
                }
            }
            TraceEvent::Transmit | TraceEvent::Receive => {}
        }
    }

    pub fn stats(&self) -> Vec<FlowStats> {
        self.flows
            .iter()
            .enumerate()
            .map(|(i, c)| FlowStats {
                flow: i as u32,
                node: c.node.0,
                role: c.role,
                tx_packets: c.tx_packets,
                tx_bytes: c.tx_bytes,
                rx_packets: c.rx_packets,
                rx_bytes: c.rx_bytes,
                dropped: c.dropped,
                connect_failures: c.connect_failures,
                first_tx_s: c.first_tx.map(|t| t.as_secs_f64()),
                last_rx_s: c.last_rx.map(|t| t.as_secs_f64()),
                mean_delay_ms: (c.rx_packets > 0)
                    .then(|| c.total_delay.as_secs_f64() * 1000.0 / c.rx_packets as f64),
            })
            .collect()
    }

    pub fn packets_sent(&self) -> u64 {
        self.flows
            .iter()
            .filter(|c| c.role == FlowRole::Sender)
            .map(|c| c.tx_packets)
            .sum()
    }

    pub fn packets_delivered(&self) -> u64 {
        self.flows
            .iter()
            .filter(|c| c.role == FlowRole::Receiver)
            .map(|c| c.rx_packets)
            .sum()
    }

    /// Data packets only, so this never exceeds [`FlowMonitor::packets_sent`].
    pub fn packets_dropped(&self) -> u64 {
        self.flows.iter().map(|c| c.dropped).sum()
    }

    pub fn connect_failures(&self) -> u64 {
        self.flows.iter().map(|c| c.connect_failures).sum()
    }
}

pub struct FlowLogger {
    writer: Writer<File>,
}

impl FlowLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let writer = Writer::from_path(path)?;
        Ok(Self { writer })
    }

    pub fn log_batch(&mut self, stats: &[FlowStats]) -> Result<()> {
        for row in stats {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
