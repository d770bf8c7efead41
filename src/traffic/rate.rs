use crate::engine::SimTime;
use crate::error::ScenarioError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A send rate in bits per second, written the usual way: `100kb/s`, `54Mbps`, `1KiB/s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataRate(u64);

impl DataRate {
    pub fn from_bps(bps: u64) -> Self {
        Self(bps)
    }

    pub fn bps(&self) -> u64 {
        self.0
    }

    /// Time between two packets of `bytes` each when sending at this rate.
    pub fn packet_interval(&self, bytes: u32) -> SimTime {
        if self.0 == 0 {
            return SimTime::MAX;
        }
        let nanos = (bytes as u128 * 8 * 1_000_000_000) / self.0 as u128;
        SimTime::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }
}

fn unit_multiplier(unit: &str) -> Option<f64> {
    // "ps" and "/s" are interchangeable
    let base = unit
        .strip_suffix("/s")
        .or_else(|| unit.strip_suffix("ps"))
        .unwrap_or(unit);

    let Some((last, _)) = base.char_indices().last() else {
        return Some(1.0);
    };
    let (prefix, symbol) = base.split_at(last);
    let bits = match symbol {
        "b" => 1.0,
        "B" => 8.0,
        _ => return None,
    };
    let scale = match prefix {
        "" => 1.0,
        "k" | "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "Ki" => 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some(bits * scale)
}

impl FromStr for DataRate {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScenarioError::InvalidDataRate(s.to_string());
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);

        let value: f64 = number.parse().map_err(|_| invalid())?;
        let multiplier = unit_multiplier(unit.trim()).ok_or_else(invalid)?;
        let bps = (value * multiplier).round();

        if !bps.is_finite() || bps < 1.0 || bps > u64::MAX as f64 {
            return Err(invalid());
        }
        Ok(Self(bps as u64))
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            bps if bps >= 1_000_000_000 && bps % 1_000_000_000 == 0 => write!(f, "{}Gb/s", bps / 1_000_000_000),
            bps if bps >= 1_000_000 && bps % 1_000_000 == 0 => write!(f, "{}Mb/s", bps / 1_000_000),
            bps if bps >= 1_000 && bps % 1_000 == 0 => write!(f, "{}kb/s", bps / 1_000),
            bps => write!(f, "{bps}b/s"),
        }
    }
}

impl TryFrom<String> for DataRate {
    type Error = ScenarioError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataRate> for String {
    fn from(rate: DataRate) -> Self {
        rate.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_spellings() {
        let cases = [
            ("100kb/s", 100_000),
            ("100kbps", 100_000),
            ("54Mbps", 54_000_000),
            ("1Gb/s", 1_000_000_000),
            ("500bps", 500),
            ("1kB/s", 8_000),
            ("1KiB/s", 8_192),
            ("2.5Mb/s", 2_500_000),
            ("9600", 9_600),
        ];
        for (input, bps) in cases {
            assert_eq!(input.parse::<DataRate>().unwrap().bps(), bps, "{input}");
        }
    }

    #[test]
    fn rejects_garbage_and_zero() {
        for input in ["", "fast", "0kb/s", "10xb/s", "kb/s", "-5kb/s"] {
            assert!(input.parse::<DataRate>().is_err(), "{input} should not parse");
        }
    }

    #[test]
    fn packet_interval_matches_rate() {
        let rate: DataRate = "100kb/s".parse().unwrap();
        // 1024 bytes = 8192 bits at 100 kb/s
        assert_eq!(rate.packet_interval(1024), SimTime::from_nanos(81_920_000));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for input in ["100kb/s", "54Mb/s", "1Gb/s", "1500b/s"] {
            assert_eq!(input.parse::<DataRate>().unwrap().to_string(), input);
        }
    }
}
