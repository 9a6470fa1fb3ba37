use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::PercentileSet;
use super::Sample;

// ─── Configuration ───────────────────────────────────────────────

/// Individual calls kept for the live feed
const MAX_RECENT_SAMPLES: usize = 100;

/// 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe latency book-keeping for tracker calls.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleRecord {
    /// Milliseconds since the collector was created or reset
    pub at_ms: u64,
    pub operation: &'static str,
    pub latency_us: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationSnapshot {
    pub calls: u64,
    pub errors: u64,
    pub latency: PercentileSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub total_errors: u64,
    pub calls_per_sec: f64,
    pub elapsed_secs: f64,
    /// All operations together
    pub overall: PercentileSet,
    pub operations: BTreeMap<&'static str, OperationSnapshot>,
    pub recent: Vec<SampleRecord>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    started: Instant,
    overall: Histogram<u64>,
    operations: BTreeMap<&'static str, OperationStats>,
    recent: VecDeque<SampleRecord>,
    total_calls: u64,
    total_errors: u64,
}

struct OperationStats {
    latency: Histogram<u64>,
    calls: u64,
    errors: u64,
}

fn histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("static histogram bounds are valid")
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn record(&self, sample: Sample) {
        self.inner.lock().record(sample);
    }

    /// Drops everything recorded so far, e.g. before a simulation run.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().snapshot()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            overall: histogram(),
            operations: BTreeMap::new(),
            recent: VecDeque::with_capacity(MAX_RECENT_SAMPLES + 1),
            total_calls: 0,
            total_errors: 0,
        }
    }

    fn record(&mut self, sample: Sample) {
        // Values outside the histogram range are clamped, not dropped
        let latency = sample.latency_us.clamp(HIST_LOW, HIST_HIGH);

        self.total_calls += 1;
        if !sample.success {
            self.total_errors += 1;
        }
        let _ = self.overall.record(latency);

        let op = self
            .operations
            .entry(sample.operation)
            .or_insert_with(|| OperationStats {
                latency: histogram(),
                calls: 0,
                errors: 0,
            });
        op.calls += 1;
        if !sample.success {
            op.errors += 1;
        }
        let _ = op.latency.record(latency);

        self.recent.push_back(SampleRecord {
            at_ms: self.started.elapsed().as_millis() as u64,
            operation: sample.operation,
            latency_us: sample.latency_us,
            success: sample.success,
        });
        if self.recent.len() > MAX_RECENT_SAMPLES {
            self.recent.pop_front();
        }
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let elapsed_secs = self.started.elapsed().as_secs_f64();
        let calls_per_sec = if elapsed_secs > 0.0 {
            self.total_calls as f64 / elapsed_secs
        } else {
            0.0
        };

        MetricsSnapshot {
            total_calls: self.total_calls,
            total_errors: self.total_errors,
            calls_per_sec,
            elapsed_secs,
            overall: PercentileSet::from_histogram(&self.overall),
            operations: self
                .operations
                .iter()
                .map(|(name, op)| {
                    (
                        *name,
                        OperationSnapshot {
                            calls: op.calls,
                            errors: op.errors,
                            latency: PercentileSet::from_histogram(&op.latency),
                        },
                    )
                })
                .collect(),
            recent: self.recent.iter().cloned().collect(),
        }
    }
}
