//! hms-qg: query gate service
//!
//! Answers queries by asking every registered source, scoring and fusing the
//! evidence, and refusing ("I don't know") when the evidence does not clear
//! the confidence gate. Also prepares prompts for a downstream model and
//! checks the answers it produces.

pub mod api;
pub mod catalog;
pub mod error;
pub mod gate;
pub mod prompt;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use gate::QueryGate;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<QueryGate>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(gate: Arc<QueryGate>) -> Self {
        Self {
            gate,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::query_routes())
        .merge(api::prompt_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
