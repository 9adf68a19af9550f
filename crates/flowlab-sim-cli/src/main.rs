use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use flowlab_abstract::{
    DataRate, FlowSelection, FlowStats, LossCounting, Scenario, ThroughputScale,
};
use flowlab_core::FlowMetricsReducer;
use flowlab_simulator::scenario_runner;

#[derive(Parser, Debug)]
#[command(author, version, about = "Constant-bitrate flow simulator and metrics reducer")]
struct Args {
    /// Load a scenario from disk. Without it the built-in four-flow demo runs.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Reduce a JSON flow table instead of simulating. Accepts a bare array of
    /// flow entries, an object with a "flows" array, or a scenario trace
    /// written by --trace-out (flows under "simulation").
    #[arg(long, conflicts_with = "scenario")]
    flow_table: Option<PathBuf>,

    #[arg(long)]
    flows: Option<u32>,

    /// Bytes per emitted unit.
    #[arg(long)]
    unit_size: Option<u32>,

    /// Derive the unit size as 1e6 / (packets_per_sec * 8) bytes.
    #[arg(long)]
    packets_per_sec: Option<u32>,

    /// Target rate per flow, e.g. "1Mbps" or "250kbps".
    #[arg(long)]
    rate: Option<DataRate>,

    #[arg(long)]
    duration: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    loss_rate: Option<f64>,

    /// Divisor for the averaged metrics. Defaults to the flow count.
    #[arg(long)]
    endpoints: Option<u32>,

    /// Which flow positions to reduce: all, odd, even or first:N.
    #[arg(long, value_parser = parse_selection)]
    selection: Option<FlowSelection>,

    /// Count losses as tx - rx instead of using recorded drops.
    #[arg(long, default_value_t = false)]
    derived_loss: bool,

    /// Report throughput in bits/s instead of rx_bytes / (1000 * interval).
    #[arg(long, default_value_t = false)]
    bits_per_sec: bool,

    /// Write a JSON trace of the finished run.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("flowlab-sim-cli starting…");

    if let Some(path) = &args.flow_table {
        return reduce_flow_table(&args, path);
    }

    let mut scenario = match &args.scenario {
        Some(path) => scenario_runner::load_scenario(path)?,
        None => scenario_runner::demo_scenario(),
    };
    args.apply_to(&mut scenario);

    let report = scenario_runner::run(&scenario)?;

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

impl Args {
    fn apply_to(&self, scenario: &mut Scenario) {
        let traffic = &mut scenario.traffic;
        if let Some(flows) = self.flows {
            traffic.flows = flows;
        }
        if let Some(size) = self.unit_size {
            traffic.unit_size = Some(size);
        }
        if let Some(pps) = self.packets_per_sec {
            // A packet rate given here replaces the file's unit size.
            traffic.packets_per_sec = Some(pps);
            if self.unit_size.is_none() {
                traffic.unit_size = None;
            }
        }
        if let Some(rate) = self.rate {
            traffic.rate = rate;
        }

        let config = &mut scenario.config;
        if let Some(duration) = self.duration {
            config.duration_secs = Some(duration);
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(loss_rate) = self.loss_rate {
            config.loss_rate = Some(loss_rate);
        }

        let metrics = &mut scenario.metrics;
        if let Some(endpoints) = self.endpoints {
            metrics.endpoints = Some(endpoints);
        }
        if let Some(selection) = self.selection {
            metrics.selection = selection;
        }
        if self.derived_loss {
            metrics.loss = LossCounting::Derived;
        }
        if self.bits_per_sec {
            metrics.throughput = ThroughputScale::BitsPerSecond;
        }
    }

    fn reducer(&self, default_endpoints: u32) -> FlowMetricsReducer {
        let loss = if self.derived_loss {
            LossCounting::Derived
        } else {
            LossCounting::Recorded
        };
        let throughput = if self.bits_per_sec {
            ThroughputScale::BitsPerSecond
        } else {
            ThroughputScale::Kilo
        };
        FlowMetricsReducer::new(self.endpoints.unwrap_or(default_endpoints))
            .with_loss(loss)
            .with_throughput(throughput)
    }
}

fn parse_selection(value: &str) -> Result<FlowSelection, String> {
    match value {
        "all" => Ok(FlowSelection::All),
        "odd" => Ok(FlowSelection::OddPositions),
        "even" => Ok(FlowSelection::EvenPositions),
        other => match other.strip_prefix("first:") {
            Some(n) => n
                .parse()
                .map(FlowSelection::First)
                .map_err(|e| format!("invalid flow count {n:?}: {e}")),
            None => Err(format!(
                "unknown selection {other:?}, expected all, odd, even or first:N"
            )),
        },
    }
}

fn load_flow_table(path: &Path) -> Result<Vec<FlowStats>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read flow table {}", path.display()))?;
    let value: Value = serde_json::from_str(&content).context("Failed to parse flow table")?;
    let flows = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => {
            let nested = map
                .get_mut("simulation")
                .and_then(|simulation| simulation.get_mut("flows"))
                .map(Value::take);
            match nested.or_else(|| map.remove("flows")) {
                Some(flows) => flows,
                None => bail!("Flow table object has no \"flows\" or \"simulation.flows\" field"),
            }
        }
        _ => bail!("Flow table must be an array or an object with \"flows\""),
    };
    serde_json::from_value(flows).context("Failed to decode flow entries")
}

fn reduce_flow_table(args: &Args, path: &Path) -> Result<()> {
    let table = load_flow_table(path)?;
    info!("Reducing {} flows from {}", table.len(), path.display());

    let endpoints = u32::try_from(table.len()).context("Flow table is too large")?;
    let summary = args
        .reducer(endpoints)
        .reduce_with(&table, args.selection.unwrap_or_default());
    scenario_runner::log_summary(&summary);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &summary)?;
    }
    Ok(())
}

fn write_trace<T: serde::Serialize>(path: &Path, report: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("flowlab-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn test_scenario_trace_reloads_as_flow_table() {
        let mut scenario = scenario_runner::demo_scenario();
        scenario.config.duration_secs = Some(1.5);
        let report = scenario_runner::run(&scenario).unwrap();

        let path = scratch_path("scenario-trace");
        write_trace(&path, &report).unwrap();
        let table = load_flow_table(&path);
        let _ = fs::remove_file(&path);

        let table = table.unwrap();
        assert!(!table.is_empty());
        assert_eq!(table, report.simulation.flows);
    }

    #[test]
    fn test_bare_flow_array_loads() {
        let flows = vec![FlowStats {
            tx_packets: 10,
            rx_packets: 9,
            rx_bytes: 9000,
            ..FlowStats::new(1)
        }];
        let path = scratch_path("bare-array");
        write_trace(&path, &flows).unwrap();
        let table = load_flow_table(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(table.unwrap(), flows);
    }

    #[test]
    fn test_object_without_flows_is_rejected() {
        let path = scratch_path("no-flows");
        fs::write(&path, br#"{"name": "empty"}"#).unwrap();
        let table = load_flow_table(&path);
        let _ = fs::remove_file(&path);
        assert!(table.is_err());
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("odd"), Ok(FlowSelection::OddPositions));
        assert_eq!(parse_selection("first:3"), Ok(FlowSelection::First(3)));
        assert!(parse_selection("first:x").is_err());
        assert!(parse_selection("middle").is_err());
    }

    #[test]
    fn test_overrides_apply_to_scenario() {
        let args = Args::parse_from([
            "flowlab-sim-cli",
            "--flows",
            "2",
            "--rate",
            "500kbps",
            "--unit-size",
            "512",
            "--seed",
            "9",
            "--selection",
            "all",
            "--derived-loss",
        ]);
        let mut scenario = scenario_runner::demo_scenario();
        args.apply_to(&mut scenario);

        assert_eq!(scenario.traffic.flows, 2);
        assert_eq!(scenario.traffic.rate.bps(), 500_000.0);
        assert_eq!(scenario.traffic.resolved_unit_size(), Some(512));
        assert_eq!(scenario.config.seed, Some(9));
        assert_eq!(scenario.metrics.selection, FlowSelection::All);
        assert_eq!(scenario.metrics.loss, LossCounting::Derived);
    }
}
