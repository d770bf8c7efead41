use super::{NodeId, NodeSet, WifiConfig};
use crate::engine::SimTime;
use std::collections::VecDeque;

// OFDM preamble + PLCP header, roughly
const PHY_OVERHEAD: SimTime = SimTime::from_nanos(20_000);

/// Unit disk channel: two nodes hear each other iff they are within `range` metres.
#[derive(Debug, Clone)]
pub struct WirelessChannel {
    range: f64,
    phy_rate_bps: u64,
    neighbors: Vec<Vec<NodeId>>,
}

impl WirelessChannel {
    pub fn new(nodes: &NodeSet, config: &WifiConfig) -> Self {
        let neighbors = nodes
            .iter()
            .map(|node| {
                nodes
                    .iter()
                    .filter(|other| other.id() != node.id())
                    .filter(|other| node.position().distance_to(&other.position()) <= config.radio_range_m)
                    .map(|other| other.id())
                    .collect()
            })
            .collect();

        Self {
            range: config.radio_range_m,
            phy_rate_bps: config.phy_rate_bps.max(1),
            neighbors,
        }
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        self.neighbors.get(node.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_range(&self, a: NodeId, b: NodeId) -> bool {
        self.neighbors(a).contains(&b)
    }

    /// Fewest-hop path including both endpoints. Ties go to lower node ids.
    pub fn shortest_path(&self, src: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
        if src == dst {
            return Some(vec![src]);
        }
        if src.index() >= self.neighbors.len() || dst.index() >= self.neighbors.len() {
            return None;
        }

        let mut parent: Vec<Option<NodeId>> = vec![None; self.neighbors.len()];
        let mut visited = vec![false; self.neighbors.len()];
        let mut queue = VecDeque::from([src]);
        visited[src.index()] = true;

        while let Some(current) = queue.pop_front() {
            for &next in self.neighbors(current) {
                if visited[next.index()] {
                    continue;
                }
                visited[next.index()] = true;
                parent[next.index()] = Some(current);

                if next == dst {
                    let mut path = vec![dst];
                    let mut cursor = dst;
                    while let Some(prev) = parent[cursor.index()] {
                        path.push(prev);
                        cursor = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }

        None
    }

    pub fn hop_count(&self, src: NodeId, dst: NodeId) -> Option<usize> {
        self.shortest_path(src, dst).map(|path| path.len() - 1)
    }

    /// Time to put `bytes` on the air, one hop.
    pub fn transmission_delay(&self, bytes: u32) -> SimTime {
        let nanos = (bytes as u64 * 8).saturating_mul(1_000_000_000) / self.phy_rate_bps;
        SimTime::from_nanos(nanos) + PHY_OVERHEAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{GridSpec, build_topology};

    fn default_channel(count: u32) -> WirelessChannel {
        let nodes = build_topology(count, &GridSpec::default()).unwrap();
        WirelessChannel::new(&nodes, &WifiConfig::default())
    }

    #[test]
    fn neighbors_are_within_range() {
        let channel = default_channel(20);
        // node 0 sits at (20, 20); 50m reaches two grid steps along an axis
        assert_eq!(
            channel.neighbors(NodeId(0)),
            &[NodeId(1), NodeId(2), NodeId(5), NodeId(6), NodeId(7), NodeId(10), NodeId(11)]
        );
        assert!(channel.in_range(NodeId(1), NodeId(0)));
        assert!(!channel.in_range(NodeId(0), NodeId(3)));
    }

    #[test]
    fn shortest_path_spans_the_grid() {
        let channel = default_channel(20);
        let path = channel.shortest_path(NodeId(0), NodeId(19)).unwrap();
        assert_eq!(path.first(), Some(&NodeId(0)));
        assert_eq!(path.last(), Some(&NodeId(19)));
        assert_eq!(channel.hop_count(NodeId(0), NodeId(19)), Some(3));
        for hop in path.windows(2) {
            assert!(channel.in_range(hop[0], hop[1]));
        }
    }

    #[test]
    fn isolated_nodes_have_no_path() {
        let nodes = build_topology(2, &GridSpec { delta_x: 500.0, ..GridSpec::default() }).unwrap();
        let channel = WirelessChannel::new(&nodes, &WifiConfig::default());
        assert_eq!(channel.shortest_path(NodeId(0), NodeId(1)), None);
    }

    #[test]
    fn transmission_delay_scales_with_size() {
        let channel = default_channel(2);
        let small = channel.transmission_delay(100);
        let large = channel.transmission_delay(1052);
        assert!(large > small);
        // 1052 bytes at 54 Mb/s is ~155.8us plus overhead
        assert_eq!(large.as_nanos(), 155_851 + 20_000);
    }
}
