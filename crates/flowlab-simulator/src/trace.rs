use flowlab_abstract::{Address, FlowStats, SimConfig};
use flowlab_core::{CounterSummary, TraceCounters};
use serde::Serialize;
use std::collections::HashMap;

use crate::engine::LinkEventSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration_secs: f64,
    /// Per-flow statistics in flow-id order. Serializes to the same shape the
    /// CLI accepts through `--flow-table`.
    pub flows: Vec<FlowStats>,
    pub counters: TraceCounters,
    pub counter_summary: CounterSummary,
    pub sinks: Vec<SinkReport>,
    pub transport_errors: u64,
    pub metrics: HashMap<String, Vec<(f64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SinkReport {
    pub address: Address,
    pub packets: u64,
    pub bytes: u64,
}
