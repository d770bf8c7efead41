use super::NodeId;
use crate::engine::SimTime;
use crate::traffic::{FlowId, TransportKind};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

pub const IPV4_HEADER_LEN: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketId(u64);

impl PacketId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Packet {
    pub uid: PacketId,
    pub flow: FlowId,
    pub origin: NodeId,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub transport: TransportKind,
    pub payload_size: u32,
    /// Sequence number within the flow
    pub seq: u64,
    pub created_at: SimTime,
    /// Full path carried in the header when the route was source routed
    pub source_route: Option<Vec<NodeId>>,
}

impl Packet {
    pub fn header_size(&self) -> u32 {
        IPV4_HEADER_LEN + self.transport.header_len()
    }

    pub fn wire_size(&self) -> u32 {
        self.header_size() + self.payload_size + self.source_route_len()
    }

    // DSR option header: 4 fixed bytes plus one address per hop
    fn source_route_len(&self) -> u32 {
        self.source_route
            .as_ref()
            .map(|route| 4 + 4 * route.len() as u32)
            .unwrap_or(0)
    }

    /// Sojourn time = how long the packet has been in the network.
    pub fn sojourn_time(&self, now: SimTime) -> SimTime {
        now.saturating_sub(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(transport: TransportKind, route: Option<Vec<NodeId>>) -> Packet {
        Packet {
            uid: PacketId::new(1),
            flow: FlowId(0),
            origin: NodeId(0),
            source: Ipv4Addr::new(192, 168, 0, 1),
            destination: Ipv4Addr::new(192, 168, 0, 2),
            source_port: 49153,
            destination_port: 9,
            transport,
            payload_size: 1024,
            seq: 0,
            created_at: SimTime::from_secs(1),
            source_route: route,
        }
    }

    #[test]
    fn wire_size_counts_headers() {
        assert_eq!(packet(TransportKind::Datagram, None).wire_size(), 1052);
        assert_eq!(packet(TransportKind::Connection, None).wire_size(), 1064);
        let routed = packet(TransportKind::Datagram, Some(vec![NodeId(0), NodeId(3), NodeId(7)]));
        assert_eq!(routed.wire_size(), 1052 + 16);
    }

    #[test]
    fn sojourn_time_never_goes_negative() {
        let p = packet(TransportKind::Datagram, None);
        assert_eq!(p.sojourn_time(SimTime::from_millis(1500)), SimTime::from_millis(500));
        assert_eq!(p.sojourn_time(SimTime::ZERO), SimTime::ZERO);
    }
}
