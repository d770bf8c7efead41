use super::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Sequential addresses, 00:00:00:00:00:01 for the first node.
    pub fn for_node(id: NodeId) -> Self {
        let n = (id.0 as u64 + 1).to_be_bytes();
        Self([n[2], n[3], n[4], n[5], n[6], n[7]])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", b[0], b[1], b[2], b[3], b[4], b[5])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    /// Constant rate station manager mode
    pub data_mode: String,
    pub phy_rate_bps: u64,
    /// Unit disk radius in metres
    pub radio_range_m: f64,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            data_mode: "OfdmRate54Mbps".to_string(),
            phy_rate_bps: 54_000_000,
            radio_range_m: 50.0,
        }
    }
}

/// An ad-hoc wireless interface. Interface 0 is loopback, so the radio is always 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WifiDevice {
    pub interface: u32,
    pub mac: MacAddress,
    pub data_mode: String,
}

impl WifiDevice {
    pub fn adhoc(node: NodeId, config: &WifiConfig) -> Self {
        Self {
            interface: 1,
            mac: MacAddress::for_node(node),
            data_mode: config.data_mode.clone(),
        }
    }
}
