use crate::packet::SimTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type FlowId = u32;

/// Counters for one monitored flow, as accumulated by the flow monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    pub flow_id: FlowId,
    pub tx_packets: u64,
    pub rx_packets: u64,
    /// Packets the counter source saw dropped. `None` when the source does not
    /// track losses itself.
    #[serde(default)]
    pub lost_packets: Option<u64>,
    #[serde(default)]
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    #[serde(default)]
    pub delay_sum: Duration,
    pub time_first_tx_packet: SimTime,
    #[serde(default)]
    pub time_last_tx_packet: SimTime,
    #[serde(default)]
    pub time_first_rx_packet: Option<SimTime>,
    #[serde(default)]
    pub time_last_rx_packet: Option<SimTime>,
}

impl FlowStats {
    pub fn new(flow_id: FlowId) -> Self {
        Self {
            flow_id,
            ..Default::default()
        }
    }

    /// `tx - rx`, signed so duplicate deliveries show up as negative loss.
    pub fn derived_lost_packets(&self) -> i64 {
        self.tx_packets as i64 - self.rx_packets as i64
    }
}

/// Which flows, by 1-based position in table order, contribute to a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowSelection {
    All,
    /// Positions 1, 3, 5, ...: the forward direction of each bidirectional
    /// connection when flows are created in pairs.
    #[default]
    OddPositions,
    EvenPositions,
    /// Only the first `n` positions.
    First(usize),
}

impl FlowSelection {
    pub fn selects(&self, position: usize) -> bool {
        match self {
            FlowSelection::All => true,
            FlowSelection::OddPositions => position % 2 == 1,
            FlowSelection::EvenPositions => position % 2 == 0,
            FlowSelection::First(n) => position <= *n,
        }
    }
}

/// How dropped packets are counted for a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossCounting {
    /// Use `lost_packets`, falling back to `tx - rx` when it is absent.
    #[default]
    Recorded,
    /// Always `tx - rx`.
    Derived,
}

/// Scaling applied to the per-flow throughput term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThroughputScale {
    /// `rx_bytes / (1000 * seconds)`, reported as "kbps".
    #[default]
    Kilo,
    /// `rx_bytes * 8 / seconds`.
    BitsPerSecond,
}

impl ThroughputScale {
    pub fn apply(&self, rx_bytes: u64, interval_secs: f64) -> f64 {
        match self {
            ThroughputScale::Kilo => rx_bytes as f64 / (1000.0 * interval_secs),
            ThroughputScale::BitsPerSecond => rx_bytes as f64 * 8.0 / interval_secs,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ThroughputScale::Kilo => "kbps",
            ThroughputScale::BitsPerSecond => "bits/s",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odd_positions_are_one_based() {
        let sel = FlowSelection::OddPositions;
        let picked: Vec<usize> = (1..=4).filter(|p| sel.selects(*p)).collect();
        assert_eq!(picked, vec![1, 3]);
    }

    #[test]
    fn test_first_n() {
        let sel = FlowSelection::First(1);
        assert!(sel.selects(1));
        assert!(!sel.selects(2));
    }

    #[test]
    fn test_derived_loss_can_go_negative() {
        let stats = FlowStats {
            tx_packets: 3,
            rx_packets: 4,
            ..FlowStats::new(1)
        };
        assert_eq!(stats.derived_lost_packets(), -1);
    }

    #[test]
    fn test_zero_interval_is_not_finite() {
        assert!(ThroughputScale::Kilo.apply(100, 0.0).is_infinite());
        assert!(ThroughputScale::Kilo.apply(0, 0.0).is_nan());
    }
}
