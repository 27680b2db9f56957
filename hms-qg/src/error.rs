//! Error types for hms-qg

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hms_common::confidence::ConfidenceError;
use serde_json::{json, Value};
use thiserror::Error;

use crate::gate::QueryError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Caller broke a pipeline contract, e.g. threshold outside [0, 1] (400)
    #[error("Contract violation: {0}")]
    Contract(#[from] ConfidenceError),

    /// Requested source has no client (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Evidence failed `require_verification` (422)
    #[error("Data validation failed")]
    VerificationFailed { detail: Value },

    /// No source clients configured (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Unreadable or mistyped request bodies get the same error body as every
/// other 400
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    /// Map a query failure; `query` is echoed in verification failures
    pub fn from_query(query: &str, err: QueryError) -> Self {
        match err {
            QueryError::NoSources => ApiError::Unavailable(err.to_string()),
            QueryError::UnknownSource(_) => ApiError::NotFound(err.to_string()),
            QueryError::Confidence(e) => ApiError::Contract(e),
            QueryError::VerificationFailed { issues, evaluation } => {
                let response = crate::api::query::QueryResponse::from_evaluation(query, &evaluation);
                ApiError::VerificationFailed {
                    detail: json!({
                        "message": "Data validation failed",
                        "issues": issues,
                        "response": response,
                    }),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Contract(err) => (StatusCode::BAD_REQUEST, "CONTRACT_VIOLATION", err.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::VerificationFailed { detail } => {
                let body = Json(json!({
                    "error": {
                        "code": "VERIFICATION_FAILED",
                        "message": self.to_string(),
                    },
                    "detail": detail,
                }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg.clone()),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
