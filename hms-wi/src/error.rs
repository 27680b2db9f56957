//! Error types for hms-wi

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::intake::{FieldError, IntakeError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed body or wrong source (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Webhook source does not match the endpoint (400)
    #[error("Expected source '{expected}', received '{received}'")]
    InvalidSource { expected: String, received: String },

    /// Signature missing or wrong (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Field-level validation failure (422)
    #[error("Payload validation failed")]
    Validation(Vec<FieldError>),

    /// Queue full or shutting down (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::MissingSignature | IntakeError::InvalidSignature => ApiError::Unauthorized(err.to_string()),
            IntakeError::Malformed(message) => ApiError::BadRequest(message),
            IntakeError::Schema(errors) => ApiError::Validation(errors),
            IntakeError::SourceMismatch { expected, received } => ApiError::InvalidSource {
                expected: expected.to_string(),
                received: received.to_string(),
            },
            IntakeError::QueueFull | IntakeError::ShuttingDown => ApiError::Unavailable(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::InvalidSource { expected, received } => {
                let body = Json(json!({
                    "error": {
                        "code": "invalid_source",
                        "message": self.to_string(),
                    },
                    "expected": expected,
                    "received": received,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::Validation(errors) => {
                let body = Json(json!({
                    "error": {
                        "code": "VALIDATION_ERROR",
                        "message": self.to_string(),
                    },
                    "detail": errors,
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
