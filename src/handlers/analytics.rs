use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::tracker::{CallSnapshot, EndpointStats};
use crate::AppState;

use super::{timed, AppError};

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub endpoint: String,
    pub method: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    pub endpoint: String,
    pub method: String,
    pub total_calls: u64,
}

#[derive(Debug, Serialize)]
pub struct EndpointReport {
    pub endpoint: String,
    pub statistics: EndpointStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub endpoint: String,
    pub keys_deleted: u64,
}

// ─── POST /track ─────────────────────────────────────────────────

pub async fn track(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrackRequest>,
) -> Result<Json<TrackResponse>, AppError> {
    let total_calls = timed(
        &state,
        "record",
        state.tracker.record(&req.endpoint, &req.method),
    )
    .await?;

    Ok(Json(TrackResponse {
        endpoint: req.endpoint,
        method: req.method,
        total_calls,
    }))
}

// ─── GET /analytics/*endpoint ────────────────────────────────────

pub async fn endpoint_stats(
    State(state): State<Arc<AppState>>,
    Path(endpoint): Path<String>,
) -> Result<Json<EndpointReport>, AppError> {
    let statistics = timed(
        &state,
        "query_endpoint",
        state.tracker.query_endpoint(&endpoint),
    )
    .await?;

    Ok(Json(EndpointReport {
        endpoint,
        statistics,
    }))
}

// ─── GET /analytics ──────────────────────────────────────────────

pub async fn all_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CallSnapshot>, AppError> {
    let snapshot = timed(&state, "query_all", state.tracker.query_all()).await?;
    Ok(Json(snapshot))
}

// ─── DELETE /analytics/*endpoint ─────────────────────────────────

pub async fn clear_endpoint(
    State(state): State<Arc<AppState>>,
    Path(endpoint): Path<String>,
) -> Result<Json<ClearResponse>, AppError> {
    let keys_deleted = timed(&state, "clear", state.tracker.clear(&endpoint)).await?;

    Ok(Json(ClearResponse {
        endpoint,
        keys_deleted,
    }))
}
