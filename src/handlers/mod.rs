pub mod analytics;
pub mod health;
pub mod simulate;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::future::Future;
use std::time::Instant;

use crate::metrics::Sample;
use crate::tracker::TrackerError;
use crate::AppState;

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    /// The key-value store refused or failed the call.
    Store(String),
    /// The tracker call outlived the request deadline; a write may have
    /// been partially applied.
    Timeout(&'static str),
    AlreadyRunning,
}

impl From<TrackerError> for AppError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::InvalidInput(msg) => Self::BadRequest(msg.into()),
            TrackerError::Store(e) => Self::Store(e.to_string()),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::AlreadyRunning => StatusCode::CONFLICT,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => f.write_str(msg),
            Self::Store(msg) => write!(f, "store: {msg}"),
            Self::Timeout(op) => write!(f, "{op} did not finish before the store deadline"),
            Self::AlreadyRunning => f.write_str("Simulation already running"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "tracker call failed");
        }

        let body = serde_json::json!({
            "error":  self.to_string(),
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

// ─── Deadline + latency sampling around tracker calls ────────────

/// Runs `call` under the configured store deadline and records its latency.
pub(crate) async fn timed<T, F>(
    state: &AppState,
    operation: &'static str,
    call: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, TrackerError>>,
{
    let t0 = Instant::now();
    let result = match tokio::time::timeout(state.store_timeout, call).await {
        Ok(outcome) => outcome.map_err(AppError::from),
        Err(_) => Err(AppError::Timeout(operation)),
    };

    state.metrics.record(Sample {
        operation,
        latency_us: t0.elapsed().as_micros() as u64,
        success: result.is_ok(),
    });

    result
}
