use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::simulator::{self, SimulationPlan, DEFAULT_ENDPOINTS};
use crate::AppState;

use super::AppError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationRequest {
    /// Number of concurrent Tokio tasks recording calls
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// How long the simulation runs (seconds)
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Endpoints to spread calls over
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
}

fn default_concurrency() -> u32 {
    4
}
fn default_duration() -> u64 {
    30
}
fn default_endpoints() -> Vec<String> {
    DEFAULT_ENDPOINTS.iter().map(|e| e.to_string()).collect()
}

#[derive(Debug, Serialize)]
pub struct SimulationStatus {
    pub running: bool,
    pub message: String,
}

impl SimulationRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.concurrency == 0 || self.concurrency > 100 {
            return Err(AppError::BadRequest(
                "concurrency must be between 1 and 100".into(),
            ));
        }
        if self.duration_secs == 0 || self.duration_secs > 600 {
            return Err(AppError::BadRequest(
                "duration_secs must be between 1 and 600".into(),
            ));
        }
        if self.endpoints.is_empty() || self.endpoints.iter().any(String::is_empty) {
            return Err(AppError::BadRequest(
                "endpoints must be a non-empty list of non-empty strings".into(),
            ));
        }
        Ok(())
    }
}

// ─── POST /api/simulate/start ────────────────────────────────────

pub async fn start_simulation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SimulationRequest>,
) -> Result<Json<SimulationStatus>, AppError> {
    req.validate()?;

    // Held until the handle is stored so a concurrent stop always finds it
    let mut handle_slot = state.sim_handle.lock().await;

    // Only one run at a time; claim the flag atomically
    if state
        .sim_running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(AppError::AlreadyRunning);
    }

    state.metrics.reset();

    let message = format!(
        "Started: {} workers × {}s over {} endpoints",
        req.concurrency,
        req.duration_secs,
        req.endpoints.len(),
    );

    let plan = SimulationPlan {
        concurrency: req.concurrency,
        duration: Duration::from_secs(req.duration_secs),
        endpoints: req.endpoints,
    };
    let handle = tokio::spawn(simulator::run(
        state.sim_running.clone(),
        state.tracker.clone(),
        state.metrics.clone(),
        plan,
    ));

    *handle_slot = Some(handle);
    drop(handle_slot);

    Ok(Json(SimulationStatus {
        running: true,
        message,
    }))
}

// ─── POST /api/simulate/stop ─────────────────────────────────────

pub async fn stop_simulation(State(state): State<Arc<AppState>>) -> Json<SimulationStatus> {
    // A start in flight finishes storing its handle before we get here,
    // and no new run can start until the old one has been joined
    let mut handle_slot = state.sim_handle.lock().await;
    if !state.sim_running.swap(false, Ordering::SeqCst) {
        return Json(SimulationStatus {
            running: false,
            message: "No simulation is running".into(),
        });
    }

    // Wait for the workers so the response means "stopped"
    if let Some(handle) = handle_slot.take() {
        if let Err(err) = handle.await {
            tracing::warn!(%err, "simulation task failed");
        }
    }
    drop(handle_slot);

    Json(SimulationStatus {
        running: false,
        message: "Simulation stopped".into(),
    })
}

// ─── GET /api/simulate/status ────────────────────────────────────

pub async fn simulation_status(State(state): State<Arc<AppState>>) -> Json<SimulationStatus> {
    let running = state.sim_running.load(Ordering::SeqCst);
    Json(SimulationStatus {
        running,
        message: if running {
            "Simulation in progress".into()
        } else {
            "Idle".into()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tracker::{CallTracker, SystemClock, TrackerSettings};

    fn app_state() -> Arc<AppState> {
        let tracker = Arc::new(CallTracker::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            TrackerSettings::default(),
        ));
        Arc::new(AppState::new(tracker, Duration::from_secs(2)))
    }

    async fn total_calls(state: &AppState) -> u64 {
        state
            .tracker
            .query_all()
            .await
            .unwrap()
            .values()
            .flat_map(|methods| methods.values())
            .map(|m| m.total_calls)
            .sum()
    }

    fn request(concurrency: u32, duration_secs: u64, endpoints: &[&str]) -> SimulationRequest {
        SimulationRequest {
            concurrency,
            duration_secs,
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let req: SimulationRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.concurrency, 4);
        assert_eq!(req.endpoints.len(), DEFAULT_ENDPOINTS.len());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(request(0, 10, &["/a"]).validate().is_err());
        assert!(request(101, 10, &["/a"]).validate().is_err());
        assert!(request(1, 0, &["/a"]).validate().is_err());
        assert!(request(1, 10, &[]).validate().is_err());
        assert!(request(1, 10, &["/a", ""]).validate().is_err());
    }

    #[tokio::test]
    async fn stop_racing_start_leaves_no_workers_behind() {
        for _ in 0..20 {
            let state = app_state();
            let start = start_simulation(
                State(state.clone()),
                Json(request(2, 60, &["/a", "/b"])),
            );
            let stop = stop_simulation(State(state.clone()));
            let (started, _) = tokio::join!(start, stop);
            assert!(started.is_ok());

            // Whichever order they ran in, one more stop must leave nothing running
            stop_simulation(State(state.clone())).await;
            assert!(!state.sim_running.load(Ordering::SeqCst));
            assert!(state.sim_handle.lock().await.is_none());

            let settled = total_calls(&state).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(total_calls(&state).await, settled);
        }
    }

    #[tokio::test]
    async fn stop_right_after_start_joins_the_workers() {
        let state = app_state();
        start_simulation(State(state.clone()), Json(request(4, 60, &["/a"])))
            .await
            .unwrap();
        let Json(status) = stop_simulation(State(state.clone())).await;
        assert!(!status.running);
        assert_eq!(status.message, "Simulation stopped");
        assert!(state.sim_handle.lock().await.is_none());

        let settled = total_calls(&state).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(total_calls(&state).await, settled);
    }
}
