//! Prompt preparation and answer checking endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use hms_common::{EvidenceRecord, SourceIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::query::{run_query, QueryRequest};
use crate::error::ApiResult;
use crate::gate::Evaluation;
use crate::prompt::{self, check_answer, AnswerCheck, EvidenceBundle, PreparedPrompt, Strictness};
use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub query: String,
    #[serde(default)]
    pub sources: Option<Vec<SourceIdentity>>,
    #[serde(default, alias = "additional_context")]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    /// Skips detection when set
    #[serde(default)]
    pub strictness: Option<Strictness>,
    /// Evaluate these instead of querying the sources
    #[serde(default)]
    pub records: Option<Vec<EvidenceRecord>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRequest {
    pub query: String,
    pub answer: String,
    #[serde(default)]
    pub sources: Option<Vec<SourceIdentity>>,
    #[serde(default, alias = "additional_context")]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub records: Option<Vec<EvidenceRecord>>,
}

/// Prompt endpoints report refusals instead of failing on them, so
/// verification is never required here
fn as_query(
    query: &str,
    sources: &Option<Vec<SourceIdentity>>,
    filters: &Map<String, Value>,
    confidence_threshold: Option<f64>,
) -> QueryRequest {
    QueryRequest {
        query: query.to_string(),
        sources: sources.clone(),
        filters: filters.clone(),
        confidence_threshold,
        require_verification: false,
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    #[serde(flatten)]
    pub check: AnswerCheck,
    pub aggregated_confidence: f64,
    pub answerable: bool,
}

/// Caller-supplied records when given, otherwise a live query
async fn evidence(state: &AppState, request: &QueryRequest, records: Option<&[EvidenceRecord]>) -> ApiResult<Evaluation> {
    match records {
        Some(records) => Ok(state
            .gate
            .evaluate(records, &request.filters, request.confidence_threshold)?),
        None => run_query(state, request).await,
    }
}

/// POST /api/v1/prompt/generate
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<Json<PreparedPrompt>> {
    let Json(request) = payload?;
    let query = as_query(&request.query, &request.sources, &request.filters, request.confidence_threshold);
    let evaluation = evidence(&state, &query, request.records.as_deref()).await?;
    Ok(Json(prompt::prepare(&query.query, &evaluation, request.strictness)))
}

/// POST /api/v1/prompt/check
pub async fn check(
    State(state): State<AppState>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> ApiResult<Json<CheckResponse>> {
    let Json(request) = payload?;
    let query = as_query(&request.query, &request.sources, &request.filters, request.confidence_threshold);
    let evaluation = evidence(&state, &query, request.records.as_deref()).await?;
    let bundle = EvidenceBundle::from_evaluation(&query.query, &evaluation);
    let check = check_answer(&request.answer, &bundle);

    if !check.is_valid {
        tracing::warn!(
            issues = check.issues.len(),
            answerable = bundle.answerable,
            "Model answer failed checks"
        );
    }

    Ok(Json(CheckResponse {
        check,
        aggregated_confidence: bundle.aggregated_confidence,
        answerable: bundle.answerable,
    }))
}

pub fn prompt_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/prompt/generate", post(generate))
        .route("/api/v1/prompt/check", post(check))
}
