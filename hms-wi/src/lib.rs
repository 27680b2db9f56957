//! hms-wi: webhook intake service
//!
//! Accepts change notifications from the data sources, answers 202
//! immediately and processes each event in the background with retries:
//! cache invalidation, verification against the origin, index updates.

pub mod api;
pub mod engine;
pub mod error;
pub mod intake;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use hms_common::MetricsRecorder;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use engine::RetryEngine;
use intake::WebhookIntake;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<WebhookIntake>,
    pub engine: Arc<RetryEngine>,
    pub metrics: Arc<MetricsRecorder>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(intake: Arc<WebhookIntake>, engine: Arc<RetryEngine>, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            intake,
            engine,
            metrics,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::webhook_routes())
        .merge(api::stats_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
