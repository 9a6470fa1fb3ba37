use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::metrics::{MetricsCollector, Sample};
use crate::tracker::CallTracker;

/// Verb mix used by simulated callers, weights out of 100.
const METHOD_WEIGHTS: &[(&str, u8)] = &[("GET", 60), ("POST", 25), ("PUT", 10), ("DELETE", 5)];

/// Endpoints exercised when the caller does not name any.
pub const DEFAULT_ENDPOINTS: &[&str] = &["/users", "/products", "/orders", "/sessions"];

/// Pause between two calls of one worker, in milliseconds.
const PAUSE_MS: std::ops::RangeInclusive<u64> = 5..=50;

#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub concurrency: u32,
    pub duration: Duration,
    pub endpoints: Vec<String>,
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `plan.concurrency` workers that record calls until the deadline
/// or until `running` is cleared.
pub async fn run(
    running: Arc<AtomicBool>,
    tracker: Arc<CallTracker>,
    metrics: Arc<MetricsCollector>,
    plan: SimulationPlan,
) {
    let deadline = Instant::now() + plan.duration;
    let endpoints: Arc<[String]> = plan.endpoints.into();

    tracing::info!(
        workers = plan.concurrency,
        secs = plan.duration.as_secs(),
        endpoints = endpoints.len(),
        "simulation started"
    );

    let mut handles = Vec::with_capacity(plan.concurrency as usize);
    for worker_id in 0..plan.concurrency {
        let running = running.clone();
        let tracker = tracker.clone();
        let metrics = metrics.clone();
        let endpoints = endpoints.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, running, tracker, metrics, endpoints, deadline).await
        }));
    }

    let mut recorded = 0u64;
    for h in handles {
        recorded += h.await.unwrap_or(0);
    }

    running.store(false, Ordering::SeqCst);
    tracing::info!(recorded, "simulation finished");
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    tracker: Arc<CallTracker>,
    metrics: Arc<MetricsCollector>,
    endpoints: Arc<[String]>,
    deadline: Instant,
) -> u64 {
    // Deterministic per worker so runs are comparable
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);
    let mut recorded = 0;

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let endpoint = &endpoints[rng.gen_range(0..endpoints.len())];
        let method = pick_method(rng.gen_range(0..100));

        let t0 = Instant::now();
        let result = tracker.record(endpoint, method).await;
        metrics.record(Sample {
            operation: "record",
            latency_us: t0.elapsed().as_micros() as u64,
            success: result.is_ok(),
        });

        match result {
            Ok(_) => recorded += 1,
            // Instrumentation is best-effort; keep going
            Err(e) => tracing::debug!(worker = id, error = %e, "simulated record failed"),
        }

        tokio::time::sleep(Duration::from_millis(rng.gen_range(PAUSE_MS))).await;
    }

    recorded
}

/// Maps a roll in `0..100` onto `METHOD_WEIGHTS`.
fn pick_method(roll: u8) -> &'static str {
    let mut acc = 0u8;
    for &(method, weight) in METHOD_WEIGHTS {
        acc += weight;
        if roll < acc {
            return method;
        }
    }
    METHOD_WEIGHTS[0].0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tracker::{SystemClock, TrackerSettings};

    #[test]
    fn method_weights_cover_every_roll() {
        assert_eq!(pick_method(0), "GET");
        assert_eq!(pick_method(59), "GET");
        assert_eq!(pick_method(60), "POST");
        assert_eq!(pick_method(85), "PUT");
        assert_eq!(pick_method(99), "DELETE");
        let total: u32 = METHOD_WEIGHTS.iter().map(|(_, w)| *w as u32).sum();
        assert_eq!(total, 100);
    }

    #[tokio::test]
    async fn run_stops_at_deadline_and_records_calls() {
        let tracker = Arc::new(CallTracker::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            TrackerSettings::default(),
        ));
        let metrics = Arc::new(MetricsCollector::new());
        let running = Arc::new(AtomicBool::new(true));

        run(
            running.clone(),
            tracker.clone(),
            metrics.clone(),
            SimulationPlan {
                concurrency: 2,
                duration: Duration::from_millis(200),
                endpoints: vec!["/sim".into()],
            },
        )
        .await;

        assert!(!running.load(Ordering::SeqCst));
        let recorded = metrics.snapshot().total_calls;
        assert!(recorded > 0);

        let all = tracker.query_all().await.unwrap();
        let total: u64 = all["/sim"].values().map(|t| t.total_calls).sum();
        assert_eq!(total, recorded);
    }
}
