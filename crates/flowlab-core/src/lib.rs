pub mod counters;
pub mod error;
pub mod reducer;
pub mod source;

pub use counters::{CounterSummary, TraceCounters};
pub use error::SourceError;
pub use reducer::{FlowMetricsReducer, FlowReport, Summary};
pub use source::{Deadline, TrafficSource};
