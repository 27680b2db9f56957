//! Processing statistics

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use hms_common::MetricsState;
use serde::Serialize;

use crate::AppState;

/// GET /api/v1/webhooks/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<MetricsState> {
    Json(state.metrics.snapshot())
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: &'static str,
    /// Counters as they were just before the reset
    pub previous: MetricsState,
}

/// POST /api/v1/webhooks/stats/reset
pub async fn reset_stats(State(state): State<AppState>) -> Json<ResetResponse> {
    let previous = state.metrics.snapshot();
    state.metrics.reset();
    tracing::info!(
        total_processed = previous.total_processed,
        total_failed = previous.total_failed,
        "Processing statistics reset"
    );
    Json(ResetResponse {
        status: "reset",
        previous,
    })
}

pub fn stats_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/webhooks/stats", get(get_stats))
        .route("/api/v1/webhooks/stats/reset", post(reset_stats))
}
