use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppState;

use super::timed;

// ─── GET /health ─────────────────────────────────────────────────

pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match timed(&state, "ping", state.tracker.ping()).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "store": "up" })),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "store":  "down",
                "error":  err.to_string(),
            })),
        ),
    }
}
