use super::{TraceEvent, TraceRecord, TraceSink};
use crate::network::{NodeId, NodeSet, Position};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::net::Ipv4Addr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
struct AnimNode {
    id: NodeId,
    position: Position,
    address: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Serialize)]
struct AnimPacket {
    uid: u64,
    from: NodeId,
    to: NodeId,
    first_tx_s: f64,
    first_rx_s: f64,
}

#[derive(Debug, Default, Serialize)]
struct AnimationFile {
    nodes: Vec<AnimNode>,
    packets: Vec<AnimPacket>,
}

/// Node placement plus every over-the-air hop, dumped as JSON when the run ends.
pub struct AnimationRecorder {
    path: PathBuf,
    file: AnimationFile,
    // uid -> last transmitter and when it started
    in_flight: HashMap<u64, (NodeId, f64)>,
}

impl AnimationRecorder {
    pub fn new(path: PathBuf, nodes: &NodeSet) -> Self {
        let nodes = nodes
            .iter()
            .map(|node| AnimNode {
                id: node.id(),
                position: node.position(),
                address: node.address(),
            })
            .collect();

        Self {
            path,
            file: AnimationFile { nodes, packets: Vec::new() },
            in_flight: HashMap::new(),
        }
    }

    pub fn hop_count(&self) -> usize {
        self.file.packets.len()
    }
}

impl TraceSink for AnimationRecorder {
    fn record(&mut self, record: &TraceRecord<'_>) -> Result<()> {
        let uid = record.packet.uid.value();
        let at = record.time.as_secs_f64();

        match record.event {
            TraceEvent::Transmit => {
                self.in_flight.insert(uid, (record.node, at));
            }
            TraceEvent::Receive => {
                if let Some(&(from, first_tx_s)) = self.in_flight.get(&uid) {
                    self.file.packets.push(AnimPacket {
                        uid,
                        from,
                        to: record.node,
                        first_tx_s,
                        first_rx_s: at,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("failed to open {} for writing", self.path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.file)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        self.in_flight.clear();
        Ok(())
    }
}
