use flowlab_abstract::SimTime;
use serde::Serialize;

/// Link- and transport-level packet counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceCounters {
    pub phy_sent: u64,
    pub phy_received: u64,
    pub phy_dropped: u64,
    pub transport_sent: u64,
    pub transport_received: u64,
    pub received_bytes: u64,
}

/// Ratios here are fractions, not percentages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterSummary {
    pub phy_delivery_ratio: f64,
    pub phy_drop_ratio: f64,
    pub transport_dropped: i64,
    pub transport_drop_ratio: f64,
    pub throughput_bps: f64,
}

impl TraceCounters {
    pub fn record_phy_tx(&mut self) {
        self.phy_sent += 1;
    }

    pub fn record_phy_rx(&mut self) {
        self.phy_received += 1;
    }

    pub fn record_phy_drop(&mut self) {
        self.phy_dropped += 1;
    }

    pub fn record_transport_tx(&mut self) {
        self.transport_sent += 1;
    }

    pub fn record_transport_rx(&mut self, bytes: usize) {
        self.transport_received += 1;
        self.received_bytes += bytes as u64;
    }

    /// Throughput is taken over the whole run time, not the active period.
    pub fn summary(&self, run_time: SimTime) -> CounterSummary {
        let transport_dropped = self.transport_sent as i64 - self.transport_received as i64;
        CounterSummary {
            phy_delivery_ratio: self.phy_received as f64 / self.phy_sent as f64,
            phy_drop_ratio: self.phy_dropped as f64 / self.phy_sent as f64,
            transport_dropped,
            transport_drop_ratio: transport_dropped as f64 / self.transport_sent as f64,
            throughput_bps: self.received_bytes as f64 * 8.0 / run_time.as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_summary_fractions() {
        let mut counters = TraceCounters::default();
        for _ in 0..4 {
            counters.record_phy_tx();
            counters.record_transport_tx();
        }
        for _ in 0..3 {
            counters.record_phy_rx();
            counters.record_transport_rx(1000);
        }
        counters.record_phy_drop();

        let summary = counters.summary(Duration::from_secs(2));
        assert_eq!(summary.phy_delivery_ratio, 0.75);
        assert_eq!(summary.phy_drop_ratio, 0.25);
        assert_eq!(summary.transport_dropped, 1);
        assert_eq!(summary.transport_drop_ratio, 0.25);
        assert_eq!(summary.throughput_bps, 12_000.0);
    }

    #[test]
    fn test_empty_run_is_not_finite() {
        let summary = TraceCounters::default().summary(Duration::ZERO);
        assert!(summary.phy_delivery_ratio.is_nan());
        assert!(summary.throughput_bps.is_nan());
    }
}
