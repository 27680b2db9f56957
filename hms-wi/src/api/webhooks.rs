//! Webhook endpoints
//!
//! Each source has its own endpoint and only accepts payloads tagged with
//! that source. Accepted events are answered with 202 before any processing.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use hms_common::{EventType, SourceIdentity};
use serde::Serialize;

use crate::error::ApiResult;
use crate::intake::DryRun;
use crate::AppState;

/// Echo of the accepted event
#[derive(Debug, Serialize)]
pub struct AcceptedDetails {
    pub event_type: EventType,
    pub source: SourceIdentity,
    pub record_id: String,
    pub table_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub details: AcceptedDetails,
}

fn accept(
    state: &AppState,
    expected: SourceIdentity,
    headers: &HeaderMap,
    body: &[u8],
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let event = state.intake.accept(&expected, headers, body)?;

    tracing::info!(
        event_id = %event.event_id,
        origin = %event.origin,
        table_name = %event.collection_name,
        record_id = %event.record_id,
        event_type = %event.event_type,
        "Webhook accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted",
            message: "Webhook payload received and queued for processing",
            details: AcceptedDetails {
                event_type: event.event_type,
                source: event.origin.clone(),
                record_id: event.record_id.clone(),
                table_name: event.collection_name.clone(),
                timestamp: event.timestamp,
            },
        }),
    ))
}

/// POST /api/v1/webhooks/supabase
pub async fn supabase_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    accept(&state, SourceIdentity::Supabase, &headers, &body)
}

/// POST /api/v1/webhooks/notion
pub async fn notion_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    accept(&state, SourceIdentity::Notion, &headers, &body)
}

/// POST /api/v1/webhooks/test
///
/// Validates the envelope and reports what would happen; never queues.
pub async fn test_webhook(State(state): State<AppState>, body: Bytes) -> Json<DryRun> {
    let result = state.intake.validate(&body);
    tracing::debug!(result = ?result, "Webhook dry run");
    Json(result)
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/webhooks/supabase", post(supabase_webhook))
        .route("/api/v1/webhooks/notion", post(notion_webhook))
        .route("/api/v1/webhooks/test", post(test_webhook))
}
