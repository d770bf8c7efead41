use super::{TraceEvent, TraceRecord, TraceSink};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One line per packet event, loosely in the ns-3 ascii layout:
/// `t 1.000000000 /NodeList/0/DeviceList/1 udp 192.168.0.1:49153 > 192.168.0.19:9 len=1052 uid=0`
pub struct AsciiTrace<W: Write> {
    out: W,
}

impl AsciiTrace<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("failed to open {} for writing", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> AsciiTrace<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TraceSink for AsciiTrace<W> {
    fn record(&mut self, record: &TraceRecord<'_>) -> Result<()> {
        let tag = match record.event {
            TraceEvent::Send => "+",
            TraceEvent::Transmit => "t",
            TraceEvent::Receive => "r",
            TraceEvent::Drop(_) => "d",
            // application level, not a device event
            TraceEvent::Deliver { .. } => return Ok(()),
        };
        let p = record.packet;

        write!(
            self.out,
            "{} {} /NodeList/{}/DeviceList/1 {} {}:{} > {}:{} len={} uid={}",
            tag,
            record.time,
            record.node,
            p.transport,
            p.source,
            p.source_port,
            p.destination,
            p.destination_port,
            p.wire_size(),
            p.uid.value()
        )?;
        if let Some(route) = &p.source_route {
            let hops: Vec<String> = route.iter().map(|n| n.to_string()).collect();
            write!(self.out, " route={}", hops.join(","))?;
        }
        if let TraceEvent::Drop(reason) = record.event {
            write!(self.out, " reason={}", reason.name())?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().context("failed to flush ascii trace")
    }
}
