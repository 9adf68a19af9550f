use crate::config::SimConfig;
use crate::flow::{FlowSelection, LossCounting, ThroughputScale};
use crate::rate::DataRate;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    pub traffic: TrafficPlan,
    #[serde(default)]
    pub metrics: MetricsPlan,
    #[serde(default)]
    pub actions: Vec<ScenarioAction>,
    #[serde(default)]
    pub assertions: Vec<ScenarioAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub min_latency_ms: Option<u64>,
    pub max_latency_ms: Option<u64>,
    pub seed: Option<u64>,
    pub duration_secs: Option<f64>,
    pub acknowledge: Option<bool>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.min_latency_ms {
            config.min_latency_ms = v;
        }
        if let Some(v) = self.max_latency_ms {
            config.max_latency_ms = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.duration_secs {
            config.duration_secs = v;
        }
        if let Some(v) = self.acknowledge {
            config.acknowledge = v;
        }
    }
}

/// One constant-bitrate source and one sink per flow.
#[derive(Deserialize, Debug, Clone)]
pub struct TrafficPlan {
    pub flows: u32,
    /// Bytes per emitted unit. Takes precedence over `packets_per_sec`.
    pub unit_size: Option<u32>,
    /// Size units as `1e6 / (packets_per_sec * 8)` bytes.
    pub packets_per_sec: Option<u32>,
    pub rate: DataRate,
    #[serde(default = "default_start_secs")]
    pub start_secs: f64,
    /// Defaults to the run duration.
    pub stop_secs: Option<f64>,
    #[serde(default = "default_sink_port")]
    pub sink_port: u16,
}

fn default_start_secs() -> f64 {
    1.0
}

fn default_sink_port() -> u16 {
    8080
}

impl TrafficPlan {
    pub fn resolved_unit_size(&self) -> Option<u32> {
        self.unit_size.or_else(|| {
            self.packets_per_sec
                .map(|pps| (1e6 / (pps as f64 * 8.0)) as u32)
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct MetricsPlan {
    #[serde(default)]
    pub selection: FlowSelection,
    #[serde(default)]
    pub loss: LossCounting,
    #[serde(default)]
    pub throughput: ThroughputScale,
    /// Divisor for the per-endpoint averages. Defaults to the flow count.
    pub endpoints: Option<u32>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAction {
    /// Move the emission deadline shared by all sources at a given time
    SetDeadline { at_secs: f64, deadline_secs: f64 },
    /// Stop one source (1-based, creation order) before its scheduled stop
    StopFlow { flow: usize, at_secs: f64 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAssertion {
    /// Delivery ratio of the selected flows, in percent
    DeliveryRatio { min: f64, max: Option<f64> },
    /// Drop ratio of the selected flows, in percent
    DropRatio { max: f64 },
    /// Number of flows the selection kept
    SelectedFlows { count: usize },
    /// Upper bound on the mean delay per received packet
    MaxMeanDelay { secs: f64 },
    /// Average throughput must be a finite number
    FiniteThroughput,
}
