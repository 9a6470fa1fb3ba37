use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Call analytics ──────────────────────────────────────
        .route("/track", post(handlers::analytics::track))
        .route("/analytics", get(handlers::analytics::all_stats))
        // Wildcard so endpoints may contain (percent-encoded) slashes
        .route(
            "/analytics/*endpoint",
            get(handlers::analytics::endpoint_stats)
                .delete(handlers::analytics::clear_endpoint),
        )
        .route("/health", get(handlers::health::health))
        // ── Traffic simulation ──────────────────────────────────
        .route(
            "/api/simulate/start",
            post(handlers::simulate::start_simulation),
        )
        .route(
            "/api/simulate/stop",
            post(handlers::simulate::stop_simulation),
        )
        .route(
            "/api/simulate/status",
            get(handlers::simulate::simulation_status),
        )
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
