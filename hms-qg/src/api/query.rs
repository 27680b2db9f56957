//! Query and evaluation endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Json, Router,
};
use hms_common::confidence::{FieldConflict, ScoredEvidence, UnknownReason};
use hms_common::{EvidenceRecord, SourceIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::gate::Evaluation;
use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Defaults to every registered source
    #[serde(default)]
    pub sources: Option<Vec<SourceIdentity>>,
    #[serde(default, alias = "additional_context")]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub require_verification: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub query: String,
    pub records: Vec<EvidenceRecord>,
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceQueryRequest {
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
}

/// Gated multi-source answer
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub threshold: f64,
    pub aggregated_confidence: f64,
    pub meets_threshold: bool,
    pub information_not_found: bool,
    pub verified_sources: usize,
    pub answerable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown_reason: Option<UnknownReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown_message: Option<String>,
    pub conflicts: Vec<FieldConflict>,
    pub sources: Vec<ScoredEvidence>,
}

impl QueryResponse {
    pub fn from_evaluation(query: &str, evaluation: &Evaluation) -> Self {
        let decision = &evaluation.decision;
        let unknown_reason = evaluation.verdict.unknown_reason().cloned();
        Self {
            query: query.to_string(),
            threshold: evaluation.threshold,
            aggregated_confidence: decision.aggregated_confidence,
            meets_threshold: decision.meets_threshold,
            information_not_found: decision.information_not_found,
            verified_sources: decision.verified_sources,
            answerable: evaluation.verdict.is_answerable(),
            unknown_message: unknown_reason.as_ref().map(ToString::to_string),
            unknown_reason,
            conflicts: decision.conflicts.clone(),
            sources: decision.evidence.clone(),
        }
    }
}

/// Gather and gate evidence for a query request
pub(crate) async fn run_query(state: &AppState, request: &QueryRequest) -> ApiResult<Evaluation> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    state
        .gate
        .query(
            &request.filters,
            request.sources.as_deref(),
            request.confidence_threshold,
            request.require_verification,
        )
        .await
        .map_err(|e| ApiError::from_query(&request.query, e))
}

/// POST /api/v1/query
pub async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Json(request) = payload?;
    let evaluation = run_query(&state, &request).await?;
    Ok(Json(QueryResponse::from_evaluation(&request.query, &evaluation)))
}

/// POST /api/v1/query/:source
///
/// Single-source query; never subject to `require_verification`.
pub async fn query_source(
    State(state): State<AppState>,
    Path(source): Path<String>,
    payload: Result<Json<SourceQueryRequest>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Json(request) = payload?;
    let source = SourceIdentity::from(source);
    let query = format!("{} lookup", source);
    let evaluation = state
        .gate
        .query(
            &request.filters,
            Some(std::slice::from_ref(&source)),
            request.confidence_threshold,
            false,
        )
        .await
        .map_err(|e| ApiError::from_query(&query, e))?;
    Ok(Json(QueryResponse::from_evaluation(&query, &evaluation)))
}

/// POST /api/v1/evaluate
///
/// Scores, aggregates and gates caller-supplied records.
pub async fn evaluate(
    State(state): State<AppState>,
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Json(request) = payload?;
    let evaluation = state
        .gate
        .evaluate(&request.records, &request.filters, request.confidence_threshold)?;
    Ok(Json(QueryResponse::from_evaluation(&request.query, &evaluation)))
}

pub fn query_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/query", post(query))
        .route("/api/v1/query/:source", post(query_source))
        .route("/api/v1/evaluate", post(evaluate))
}
