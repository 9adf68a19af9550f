pub mod engine;
pub mod monitor;
pub mod scenario_runner;
pub mod trace;

pub use engine::{AppId, LinkEventSummary, Simulator, sim_time};
pub use monitor::FlowMonitor;
pub use scenario_runner::ScenarioReport;
pub use trace::{SimulationReport, SinkReport};
