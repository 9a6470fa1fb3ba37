//! API call analytics service.
//!
//! Records every call to an `(endpoint, method)` pair in a key-value store
//! and answers all-time and windowed (minute / hour / day) volume queries.
//! The tracker core lives in [`tracker`]; [`store`] holds the Redis and
//! in-memory backends it runs on, and the rest is the HTTP surface.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod simulator;
pub mod store;
pub mod tracker;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tracker::CallTracker;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub tracker: Arc<CallTracker>,

    /// Latency of tracker calls, read by the metrics endpoints.
    pub metrics: Arc<metrics::MetricsCollector>,

    /// Deadline for each tracker call made on behalf of a request.
    pub store_timeout: Duration,

    /// Checked by every simulator worker on each iteration.
    pub sim_running: Arc<AtomicBool>,

    /// Handle to the running simulation so `stop` can await it.
    pub sim_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AppState {
    pub fn new(tracker: Arc<CallTracker>, store_timeout: Duration) -> Self {
        Self {
            tracker,
            metrics: Arc::new(metrics::MetricsCollector::new()),
            store_timeout,
            sim_running: Arc::new(AtomicBool::new(false)),
            sim_handle: tokio::sync::Mutex::new(None),
        }
    }
}
