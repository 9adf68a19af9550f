use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Probability that the link drops a packet.
    pub loss_rate: f64,
    /// One-way link latency bounds, in milliseconds.
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub seed: u64,
    /// Global stop time of the run, in seconds.
    pub duration_secs: f64,
    /// Sinks answer every data segment with an ACK on the reverse path.
    pub acknowledge: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            min_latency_ms: 2,
            max_latency_ms: 10,
            seed: 0,
            duration_secs: 20.0,
            acknowledge: true,
        }
    }
}
