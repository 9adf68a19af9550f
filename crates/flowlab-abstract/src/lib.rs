pub mod config;
pub mod flow;
pub mod interface;
pub mod packet;
pub mod rate;
pub mod scenario;

pub use interface::{Application, EventId, SimContext, TransportError};
pub use packet::{Address, NodeId, Packet, SegmentHeader, SimTime, SocketId};
// Re-export flags module from packet so users can access segment flags
pub use packet::flags;

pub use config::SimConfig;
pub use flow::{FlowId, FlowSelection, FlowStats, LossCounting, ThroughputScale};
pub use rate::DataRate;
pub use scenario::{
    MetricsPlan, Scenario, ScenarioAction, ScenarioAssertion, SimConfigOverride, TrafficPlan,
};
