use super::{TraceEvent, TraceRecord, TraceSink};
use crate::engine::SimTime;
use crate::network::{NodeSet, Packet, packet::IPV4_HEADER_LEN};
use crate::traffic::TransportKind;
use anyhow::{Context, Result};
use pcap_file::pcapng::PcapNgWriter;
use pcap_file::pcapng::blocks::enhanced_packet::EnhancedPacketBlock;
use pcap_file::pcapng::blocks::interface_description::InterfaceDescriptionBlock;
use pcap_file::pcapng::blocks::section_header::SectionHeaderBlock;
use pcap_file::{DataLink, Endianness};
use pnet_packet::ip::IpNextHeaderProtocol;
use pnet_packet::ipv4::{self, MutableIpv4Packet};
use pnet_packet::tcp::{self, MutableTcpPacket, TcpFlags};
use pnet_packet::udp::{self, MutableUdpPacket};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

const SNAPLEN: u32 = 65535;

type NodeWriter = PcapNgWriter<BufWriter<File>>;

/// One capture per node device, `<prefix>-<node>-1.pcap`, holding every frame
/// the device put on or took off the air.
pub struct PcapTrace {
    writers: Vec<NodeWriter>,
}

impl PcapTrace {
    pub fn create(dir: &Path, prefix: &str, nodes: &NodeSet) -> Result<Self> {
        let writers = nodes
            .ids()
            .map(|id| {
                let path = dir.join(format!("{prefix}-{id}-1.pcap"));
                let file = File::create(&path)
                    .with_context(|| format!("failed to open {} for writing", path.display()))?;
                open_writer(BufWriter::new(file))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { writers })
    }
}

fn open_writer<W: Write>(out: W) -> Result<PcapNgWriter<W>> {
    let mut writer = PcapNgWriter::with_section_header(
        out,
        SectionHeaderBlock {
            endianness: Endianness::Big,
            major_version: 1,
            minor_version: 0,
            section_length: 0,
            options: vec![],
        },
    )?;
    writer.write_pcapng_block(InterfaceDescriptionBlock {
        linktype: DataLink::IPV4,
        snaplen: SNAPLEN,
        options: vec![],
    })?;
    Ok(writer)
}

impl TraceSink for PcapTrace {
    fn record(&mut self, record: &TraceRecord<'_>) -> Result<()> {
        if !matches!(record.event, TraceEvent::Transmit | TraceEvent::Receive) {
            return Ok(());
        }
        let Some(writer) = self.writers.get_mut(record.node.index()) else {
            return Ok(());
        };

        let data = encode_ipv4(record.packet)?;
        writer.write_pcapng_block(EnhancedPacketBlock {
            interface_id: 0,
            timestamp: capture_timestamp(record.time),
            original_len: record.packet.wire_size(),
            data: data.into(),
            options: Vec::new(),
        })?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        for writer in &mut self.writers {
            writer.get_mut().flush().context("failed to flush pcap writer")?;
        }
        Ok(())
    }
}

// pcap-file writes nanoseconds into a block whose interface declares microseconds
fn capture_timestamp(time: SimTime) -> Duration {
    Duration::from_nanos(time.as_nanos() / 1000)
}

/// IPv4 + UDP/TCP headers around a zeroed payload. Payloads that would push the
/// datagram past 64 KiB are truncated; the block's original length keeps the full size.
pub fn encode_ipv4(packet: &Packet) -> Result<Vec<u8>> {
    let transport_header = packet.transport.header_len();
    let max_payload = SNAPLEN - IPV4_HEADER_LEN - transport_header;
    let payload = vec![0u8; packet.payload_size.min(max_payload) as usize];
    let segment_len = (transport_header as usize + payload.len()) as u16;
    let total_len = IPV4_HEADER_LEN as u16 + segment_len;

    let mut segment = vec![0u8; segment_len as usize];
    match packet.transport {
        TransportKind::Datagram => {
            let mut udp_writer = MutableUdpPacket::new(&mut segment).context("buffer too small for UDP")?;
            udp_writer.set_source(packet.source_port);
            udp_writer.set_destination(packet.destination_port);
            udp_writer.set_length(segment_len);
            udp_writer.set_payload(&payload);
            let checksum = udp::ipv4_checksum(&udp_writer.to_immutable(), &packet.source, &packet.destination);
            udp_writer.set_checksum(checksum);
        }
        TransportKind::Connection => {
            let mut tcp_writer = MutableTcpPacket::new(&mut segment).context("buffer too small for TCP")?;
            tcp_writer.set_source(packet.source_port);
            tcp_writer.set_destination(packet.destination_port);
            tcp_writer.set_sequence((packet.seq as u32).wrapping_mul(packet.payload_size).wrapping_add(1));
            tcp_writer.set_acknowledgement(1);
            tcp_writer.set_data_offset(5);
            tcp_writer.set_flags(TcpFlags::ACK | TcpFlags::PSH);
            tcp_writer.set_window(u16::MAX);
            tcp_writer.set_payload(&payload);
            let checksum = tcp::ipv4_checksum(&tcp_writer.to_immutable(), &packet.source, &packet.destination);
            tcp_writer.set_checksum(checksum);
        }
    }

    let mut buffer = vec![0u8; total_len as usize];
    let mut ip_writer = MutableIpv4Packet::new(&mut buffer).context("buffer too small for IPv4")?;
    ip_writer.set_version(4);
    ip_writer.set_header_length(5);
    ip_writer.set_dscp(0);
    ip_writer.set_identification(packet.uid.value() as u16);
    ip_writer.set_flags(0b010);
    ip_writer.set_fragment_offset(0);
    ip_writer.set_ttl(64);
    ip_writer.set_next_level_protocol(IpNextHeaderProtocol::new(packet.transport.protocol_number()));
    ip_writer.set_source(packet.source);
    ip_writer.set_destination(packet.destination);
    ip_writer.set_total_length(total_len);
    ip_writer.set_payload(&segment);
    let checksum = ipv4::checksum(&ip_writer.to_immutable());
    ip_writer.set_checksum(checksum);
    drop(ip_writer);

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NodeId, PacketId};
    use crate::traffic::FlowId;
    use pnet_packet::Packet as _;
    use pnet_packet::ipv4::Ipv4Packet;
    use pnet_packet::udp::UdpPacket;
    use std::net::Ipv4Addr;

    fn packet(transport: TransportKind, payload_size: u32) -> Packet {
        Packet {
            uid: PacketId::new(7),
            flow: FlowId(0),
            origin: NodeId(0),
            source: Ipv4Addr::new(192, 168, 0, 1),
            destination: Ipv4Addr::new(192, 168, 0, 19),
            source_port: 49153,
            destination_port: 9,
            transport,
            payload_size,
            seq: 3,
            created_at: SimTime::from_secs(1),
            source_route: None,
        }
    }

    #[test]
    fn udp_datagram_round_trips_through_pnet() {
        let bytes = encode_ipv4(&packet(TransportKind::Datagram, 1024)).unwrap();
        assert_eq!(bytes.len(), 1052);

        let ip = Ipv4Packet::new(&bytes).unwrap();
        assert_eq!(ip.get_total_length(), 1052);
        assert_eq!(ip.get_next_level_protocol().0, 17);
        assert_eq!(ip.get_source(), Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));

        let udp = UdpPacket::new(ip.payload()).unwrap();
        assert_eq!(udp.get_destination(), 9);
        assert_eq!(udp.get_length(), 1032);
    }

    #[test]
    fn tcp_segment_carries_tcp_protocol_number() {
        let bytes = encode_ipv4(&packet(TransportKind::Connection, 512)).unwrap();
        let ip = Ipv4Packet::new(&bytes).unwrap();
        assert_eq!(ip.get_next_level_protocol().0, 6);
        assert_eq!(bytes.len(), 20 + 20 + 512);
    }

    #[test]
    fn oversized_payloads_are_truncated() {
        let bytes = encode_ipv4(&packet(TransportKind::Datagram, 100_000)).unwrap();
        assert_eq!(bytes.len(), SNAPLEN as usize);
    }

    #[test]
    fn writes_one_file_per_node() {
        use crate::network::{GridSpec, build_topology};

        let dir = std::env::temp_dir().join(format!("adhocsim-pcap-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let nodes = build_topology(3, &GridSpec::default()).unwrap();

        let mut trace = PcapTrace::create(&dir, "cap", &nodes).unwrap();
        let p = packet(TransportKind::Datagram, 64);
        trace
            .record(&TraceRecord { time: SimTime::from_secs(1), node: NodeId(1), event: TraceEvent::Receive, packet: &p })
            .unwrap();
        trace.finish().unwrap();

        for id in 0..3 {
            assert!(dir.join(format!("cap-{id}-1.pcap")).exists());
        }
        let busy = std::fs::metadata(dir.join("cap-1-1.pcap")).unwrap().len();
        let idle = std::fs::metadata(dir.join("cap-0-1.pcap")).unwrap().len();
        assert!(busy > idle);
        std::fs::remove_dir_all(&dir).ok();
    }
}
