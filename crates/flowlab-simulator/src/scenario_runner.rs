use anyhow::{Context, anyhow, bail};
use flowlab_abstract::{
    Address, DataRate, MetricsPlan, NodeId, Scenario, ScenarioAction, ScenarioAssertion,
    SimConfig, SimConfigOverride, TrafficPlan,
};
use flowlab_core::{Deadline, FlowMetricsReducer, Summary, TrafficSource};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::{AppId, Simulator, sim_time};
use crate::trace::SimulationReport;

/// Everything a scenario run produces.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub simulation: SimulationReport,
    pub summary: Summary,
}

pub fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&content)
}

pub fn parse_scenario(content: &str) -> anyhow::Result<Scenario> {
    toml::from_str(content).context("Failed to parse scenario")
}

pub fn run_scenario(scenario_path: &Path) -> anyhow::Result<ScenarioReport> {
    let scenario = load_scenario(scenario_path)?;
    run(&scenario)
}

/// Four flows at 300 packets/s and 1 Mbps each, starting at 1 s, for 20 s.
pub fn demo_scenario() -> Scenario {
    Scenario {
        name: "cbr-demo".to_string(),
        description: "Four constant-bitrate flows over a 2-10 ms link".to_string(),
        config: SimConfigOverride::default(),
        traffic: TrafficPlan {
            flows: 4,
            unit_size: None,
            packets_per_sec: Some(300),
            rate: DataRate::from_bps(1e6),
            start_secs: 1.0,
            stop_secs: None,
            sink_port: 8080,
        },
        metrics: MetricsPlan::default(),
        actions: Vec::new(),
        assertions: Vec::new(),
    }
}

/// Build the topology, run it to completion, reduce the flow table and check
/// the assertions.
pub fn run(scenario: &Scenario) -> anyhow::Result<ScenarioReport> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);

    let traffic = &scenario.traffic;
    let unit_size = traffic
        .resolved_unit_size()
        .context("Scenario needs either traffic.unit_size or traffic.packets_per_sec")?;

    let mut sim = Simulator::new(config);
    let deadline = Deadline::at(sim.stop_time());
    let start = sim_time(traffic.start_secs);
    let stop = traffic.stop_secs.map(sim_time).unwrap_or(sim.stop_time());

    // Sources sit on nodes 0..n, their sinks on nodes n..2n.
    let mut apps: Vec<AppId> = Vec::new();
    for i in 0..traffic.flows {
        let sink = Address::new(NodeId(traffic.flows + i), traffic.sink_port);
        sim.install_sink(sink);
        let socket = sim.create_socket(NodeId(i));
        let mut source = TrafficSource::new(deadline.clone());
        source
            .configure(socket, sink, unit_size, traffic.rate)
            .with_context(|| format!("Failed to configure source for flow {}", i + 1))?;
        apps.push(sim.add_application(Box::new(source), start, stop));
    }

    let mut deadline_changes = Vec::new();
    for action in &scenario.actions {
        match action {
            ScenarioAction::StopFlow { flow, at_secs } => {
                let app = flow
                    .checked_sub(1)
                    .and_then(|idx| apps.get(idx))
                    .ok_or_else(|| anyhow!("stop_flow refers to unknown flow {}", flow))?;
                sim.schedule_app_stop(*app, sim_time(*at_secs));
            }
            ScenarioAction::SetDeadline {
                at_secs,
                deadline_secs,
            } => deadline_changes.push((sim_time(*at_secs), sim_time(*deadline_secs))),
        }
    }
    deadline_changes.sort_by_key(|(at, _)| *at);

    // Deadline changes apply before any event due at or after their time.
    let mut pending = deadline_changes.into_iter().peekable();
    loop {
        let Some(next) = sim.peek_next_event_time() else {
            break;
        };
        while let Some((_, value)) = pending.next_if(|(at, _)| *at <= next) {
            info!("Emission deadline moved to {:.6}s", value.as_secs_f64());
            deadline.set(value);
        }
        if !sim.step() {
            break;
        }
    }
    sim.finish();

    let metrics = &scenario.metrics;
    let reducer = FlowMetricsReducer::new(metrics.endpoints.unwrap_or(traffic.flows))
        .with_loss(metrics.loss)
        .with_throughput(metrics.throughput);
    let summary = reducer.reduce_with(sim.flow_stats(), metrics.selection);
    log_summary(&summary);

    check_assertions(&scenario.assertions, &summary)?;

    info!("Scenario {} complete", scenario.name);
    Ok(ScenarioReport {
        name: scenario.name.clone(),
        simulation: sim.export_report(),
        summary,
    })
}

pub fn log_summary(summary: &Summary) {
    for flow in &summary.flows {
        info!(
            "Flow {} (position {}): tx={} rx={} dropped={} loss={:.2}% delay_sum={:.6}s throughput={:.3} {}",
            flow.flow_id,
            flow.position,
            flow.tx_packets,
            flow.rx_packets,
            flow.dropped,
            flow.loss_ratio,
            flow.delay_sum_secs,
            flow.throughput,
            summary.throughput_unit
        );
    }
    info!(
        "Selected {} flows: tx={} rx={} dropped={}",
        summary.selected_flows,
        summary.total_tx_packets,
        summary.total_rx_packets,
        summary.total_dropped
    );
    info!(
        "Delivery ratio {:.2}%, drop ratio {:.2}% (all flows: {:.2}% / {:.2}%)",
        summary.delivery_ratio,
        summary.drop_ratio,
        summary.overall_delivery_ratio,
        summary.overall_drop_ratio
    );
    info!(
        "Average throughput {:.3} {}, mean delay {:.6}s per packet, {:.6}s per endpoint",
        summary.average_throughput,
        summary.throughput_unit,
        summary.mean_delay_per_packet,
        summary.mean_delay_per_endpoint
    );
}

/// Comparisons are written so that a NaN metric fails the check.
pub fn check_assertions(
    assertions: &[ScenarioAssertion],
    summary: &Summary,
) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            ScenarioAssertion::DeliveryRatio { min, max } => {
                if !(summary.delivery_ratio >= *min) {
                    bail!(
                        "Assertion Failed: delivery ratio {:.2}% below expected min {}%",
                        summary.delivery_ratio,
                        min
                    );
                }
                if let Some(max) = max {
                    if !(summary.delivery_ratio <= *max) {
                        bail!(
                            "Assertion Failed: delivery ratio {:.2}% above expected max {}%",
                            summary.delivery_ratio,
                            max
                        );
                    }
                }
            }
            ScenarioAssertion::DropRatio { max } => {
                if !(summary.drop_ratio <= *max) {
                    bail!(
                        "Assertion Failed: drop ratio {:.2}% above expected max {}%",
                        summary.drop_ratio,
                        max
                    );
                }
            }
            ScenarioAssertion::SelectedFlows { count } => {
                if summary.selected_flows != *count {
                    bail!(
                        "Assertion Failed: {} flows selected, expected {}",
                        summary.selected_flows,
                        count
                    );
                }
            }
            ScenarioAssertion::MaxMeanDelay { secs } => {
                if !(summary.mean_delay_per_packet <= *secs) {
                    bail!(
                        "Assertion Failed: mean delay {:.6}s per packet exceeds {}s",
                        summary.mean_delay_per_packet,
                        secs
                    );
                }
            }
            ScenarioAssertion::FiniteThroughput => {
                if !summary.average_throughput.is_finite() {
                    bail!(
                        "Assertion Failed: average throughput is {}",
                        summary.average_throughput
                    );
                }
            }
        }
    }
    Ok(())
}
