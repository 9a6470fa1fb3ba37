pub mod collector;
pub mod percentiles;
pub mod stream;

pub use collector::{MetricsCollector, MetricsSnapshot};

/// One timed tracker call, pushed by handlers and simulator workers.
#[derive(Debug, Clone)]
pub struct Sample {
    /// e.g. "record", "query_endpoint"
    pub operation: &'static str,
    /// Wall time of the tracker call, store round trips included (μs)
    pub latency_us: u64,
    /// false when the call failed or hit its deadline
    pub success: bool,
}
