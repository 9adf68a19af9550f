//! Reduction of a finished flow table into summary metrics.
//!
//! Flows are picked by their 1-based position in table order, never by flow
//! id. Per-flow throughput terms are summed, not recomputed from summed
//! bytes. Divisions are plain `f64` divisions: empty flows and empty
//! selections surface as `inf`/`NaN` and it is up to the caller to read those
//! as "no data".

use flowlab_abstract::{FlowSelection, FlowStats, LossCounting, ThroughputScale};
use serde::Serialize;

/// Metrics for one selected flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowReport {
    pub position: usize,
    pub flow_id: u32,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub dropped: i64,
    /// Percent of transmitted packets dropped.
    pub loss_ratio: f64,
    pub delay_sum_secs: f64,
    pub throughput: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub selected_flows: usize,
    pub total_tx_packets: u64,
    pub total_rx_packets: u64,
    pub total_dropped: i64,
    pub total_delay_secs: f64,
    pub throughput_sum: f64,
    pub throughput_unit: &'static str,
    /// Percent, over the selected flows.
    pub delivery_ratio: f64,
    pub drop_ratio: f64,
    pub overall_tx_packets: u64,
    pub overall_rx_packets: u64,
    pub overall_dropped: i64,
    /// Percent, over every flow in the table.
    pub overall_delivery_ratio: f64,
    pub overall_drop_ratio: f64,
    /// `throughput_sum / endpoints`
    pub average_throughput: f64,
    /// `total_delay_secs / total_rx_packets`
    pub mean_delay_per_packet: f64,
    /// `total_delay_secs / endpoints`
    pub mean_delay_per_endpoint: f64,
    pub flows: Vec<FlowReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowMetricsReducer {
    pub loss: LossCounting,
    pub throughput: ThroughputScale,
    /// External divisor for the per-endpoint averages, e.g. the node count.
    pub endpoints: u32,
}

impl FlowMetricsReducer {
    pub fn new(endpoints: u32) -> Self {
        Self {
            loss: LossCounting::default(),
            throughput: ThroughputScale::default(),
            endpoints,
        }
    }

    pub fn with_loss(mut self, loss: LossCounting) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_throughput(mut self, throughput: ThroughputScale) -> Self {
        self.throughput = throughput;
        self
    }

    /// Reduce `table` keeping the flows whose position satisfies `selection`.
    pub fn reduce_with(&self, table: &[FlowStats], selection: FlowSelection) -> Summary {
        self.reduce(table, |position| selection.selects(position))
    }

    pub fn reduce<S>(&self, table: &[FlowStats], selector: S) -> Summary
    where
        S: Fn(usize) -> bool,
    {
        let mut flows = Vec::new();
        let mut total_tx_packets = 0u64;
        let mut total_rx_packets = 0u64;
        let mut total_dropped = 0i64;
        let mut total_delay_secs = 0.0;
        let mut throughput_sum = 0.0;
        let mut overall_tx_packets = 0u64;
        let mut overall_rx_packets = 0u64;
        let mut overall_dropped = 0i64;

        let mut position = 0;
        for flow in table {
            position += 1;
            let dropped = self.dropped(flow);
            overall_tx_packets += flow.tx_packets;
            overall_rx_packets += flow.rx_packets;
            overall_dropped += dropped;

            if !selector(position) {
                continue;
            }

            let delay_secs = flow.delay_sum.as_secs_f64();
            let throughput = self.throughput_term(flow);
            total_tx_packets += flow.tx_packets;
            total_rx_packets += flow.rx_packets;
            total_dropped += dropped;
            total_delay_secs += delay_secs;
            throughput_sum += throughput;

            flows.push(FlowReport {
                position,
                flow_id: flow.flow_id,
                tx_packets: flow.tx_packets,
                rx_packets: flow.rx_packets,
                dropped,
                loss_ratio: dropped as f64 * 100.0 / flow.tx_packets as f64,
                delay_sum_secs: delay_secs,
                throughput,
            });
        }

        let endpoints = self.endpoints as f64;
        Summary {
            selected_flows: flows.len(),
            total_tx_packets,
            total_rx_packets,
            total_dropped,
            total_delay_secs,
            throughput_sum,
            throughput_unit: self.throughput.unit(),
            delivery_ratio: percent(total_rx_packets as f64, total_tx_packets),
            drop_ratio: percent(total_dropped as f64, total_tx_packets),
            overall_tx_packets,
            overall_rx_packets,
            overall_dropped,
            overall_delivery_ratio: percent(overall_rx_packets as f64, overall_tx_packets),
            overall_drop_ratio: percent(overall_dropped as f64, overall_tx_packets),
            average_throughput: throughput_sum / endpoints,
            mean_delay_per_packet: total_delay_secs / total_rx_packets as f64,
            mean_delay_per_endpoint: total_delay_secs / endpoints,
            flows,
        }
    }

    fn dropped(&self, flow: &FlowStats) -> i64 {
        match self.loss {
            LossCounting::Recorded => flow
                .lost_packets
                .map(|lost| lost as i64)
                .unwrap_or_else(|| flow.derived_lost_packets()),
            LossCounting::Derived => flow.derived_lost_packets(),
        }
    }

    /// A flow that never received anything is measured over a zero interval.
    fn throughput_term(&self, flow: &FlowStats) -> f64 {
        let last_rx = flow
            .time_last_rx_packet
            .unwrap_or(flow.time_first_tx_packet);
        let interval = last_rx.as_secs_f64() - flow.time_first_tx_packet.as_secs_f64();
        self.throughput.apply(flow.rx_bytes, interval)
    }
}

fn percent(count: f64, total: u64) -> f64 {
    count * 100.0 / total as f64
}
