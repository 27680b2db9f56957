//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use hms_common::SourceIdentity;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when no source client is registered
    pub status: String,
    /// Module name ("hms-qg")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub sources: Vec<SourceIdentity>,
    pub confidence_threshold: f64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let sources = state.gate.registered_sources();

    Json(HealthResponse {
        status: if sources.is_empty() { "degraded" } else { "ok" }.to_string(),
        module: "hms-qg".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        sources,
        confidence_threshold: state.gate.threshold(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
