use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A bit rate in bits per second.
///
/// Parses either a bare number (bits per second) or a number followed by one
/// of the SI suffixes `bps`, `kbps`, `Mbps`, `Gbps`, or their byte forms
/// `Bps`, `kBps`, `MBps`, `GBps`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "RateRepr")]
pub struct DataRate(f64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RateRepr {
    Bps(f64),
    Text(String),
}

impl TryFrom<RateRepr> for DataRate {
    type Error = String;

    fn try_from(repr: RateRepr) -> Result<Self, Self::Error> {
        match repr {
            RateRepr::Bps(bps) => Ok(DataRate(bps)),
            RateRepr::Text(text) => text.parse(),
        }
    }
}

impl DataRate {
    pub fn from_bps(bps: f64) -> Self {
        Self(bps)
    }

    pub fn bps(&self) -> f64 {
        self.0
    }

    /// Seconds needed to push `bytes` at this rate.
    pub fn transmission_secs(&self, bytes: u32) -> f64 {
        bytes as f64 * 8.0 / self.0
    }

    /// Like [`DataRate::transmission_secs`], as a `Duration`. Intervals too
    /// large for `Duration` saturate at `Duration::MAX`.
    pub fn transmission_time(&self, bytes: u32) -> Duration {
        Duration::try_from_secs_f64(self.transmission_secs(bytes)).unwrap_or(Duration::MAX)
    }
}

impl FromStr for DataRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| format!("invalid data rate '{s}'"))?;
        let multiplier = match unit {
            "" | "bps" | "b/s" => 1.0,
            "kbps" | "Kbps" => 1e3,
            "Mbps" => 1e6,
            "Gbps" => 1e9,
            "Bps" => 8.0,
            "kBps" | "KBps" => 8e3,
            "MBps" => 8e6,
            "GBps" => 8e9,
            other => return Err(format!("unknown data rate unit '{other}' in '{s}'")),
        };
        Ok(DataRate(value * multiplier))
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffixes() {
        assert_eq!("1Mbps".parse::<DataRate>().unwrap().bps(), 1e6);
        assert_eq!("250kbps".parse::<DataRate>().unwrap().bps(), 250e3);
        assert_eq!("9600".parse::<DataRate>().unwrap().bps(), 9600.0);
        assert_eq!("1.5 Gbps".parse::<DataRate>().unwrap().bps(), 1.5e9);
        assert_eq!("2kBps".parse::<DataRate>().unwrap().bps(), 16e3);
        assert!("fast".parse::<DataRate>().is_err());
        assert!("10furlongs".parse::<DataRate>().is_err());
    }

    #[test]
    fn test_transmission_time() {
        let rate = DataRate::from_bps(1e6);
        assert_eq!(rate.transmission_time(1000), Duration::from_millis(8));
        assert_eq!(rate.transmission_secs(125), 0.001);
    }

    #[test]
    fn test_tiny_rate_saturates() {
        let rate = DataRate::from_bps(f64::MIN_POSITIVE);
        assert_eq!(rate.transmission_time(1500), Duration::MAX);
    }
}
