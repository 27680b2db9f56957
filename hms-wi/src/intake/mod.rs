//! Synchronous webhook intake
//!
//! Checks run in a fixed order, each able to reject the request on its own:
//! signature (when enabled), JSON envelope, field schema, expected source.
//! An event passing all of them is handed to the [`RetryEngine`] without
//! waiting for processing.

pub mod envelope;
pub mod signature;

pub use envelope::{parse_envelope, EnvelopeError, FieldError, REQUIRED_FIELDS};
pub use signature::{SignatureCheck, SignatureVerifier, SIGNATURE_HEADER};

use crate::engine::{RetryEngine, SubmitError};
use axum::http::HeaderMap;
use hms_common::{SourceIdentity, WebhookEvent};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("{0}")]
    Malformed(String),

    #[error("Payload validation failed ({} field errors)", .0.len())]
    Schema(Vec<FieldError>),

    #[error("Expected source '{expected}', received '{received}'")]
    SourceMismatch {
        expected: SourceIdentity,
        received: SourceIdentity,
    },

    #[error("Processing queue is full")]
    QueueFull,

    #[error("Service is shutting down")]
    ShuttingDown,
}

impl From<EnvelopeError> for IntakeError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Malformed(message) => IntakeError::Malformed(message),
            EnvelopeError::Invalid(errors) => IntakeError::Schema(errors),
        }
    }
}

impl From<SubmitError> for IntakeError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::QueueFull => IntakeError::QueueFull,
            SubmitError::ShuttingDown => IntakeError::ShuttingDown,
        }
    }
}

/// Result of a dry-run validation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DryRun {
    Valid {
        parsed_payload: Value,
        would_be_processed: bool,
    },
    ValidationFailed {
        missing_fields: Vec<String>,
        errors: Vec<FieldError>,
        would_be_processed: bool,
    },
    Invalid {
        error: String,
        would_be_processed: bool,
    },
}

pub struct WebhookIntake {
    signature: Option<SignatureVerifier>,
    engine: Arc<RetryEngine>,
}

impl WebhookIntake {
    /// `signature` is `None` when verification is disabled
    pub fn new(signature: Option<SignatureVerifier>, engine: Arc<RetryEngine>) -> Self {
        Self { signature, engine }
    }

    pub fn verifies_signatures(&self) -> bool {
        self.signature.is_some()
    }

    /// Validate a request for an endpoint bound to `expected` and queue it
    pub fn accept(
        &self,
        expected: &SourceIdentity,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Arc<WebhookEvent>, IntakeError> {
        let signature = self.check_signature(expected, headers, body)?;

        let mut event = parse_envelope(body)?;
        if &event.origin != expected {
            tracing::warn!(
                expected = %expected,
                received = %event.origin,
                record_id = %event.record_id,
                "Webhook source does not match endpoint"
            );
            return Err(IntakeError::SourceMismatch {
                expected: expected.clone(),
                received: event.origin,
            });
        }
        event.signature = signature;

        Ok(self.engine.submit(event)?)
    }

    /// Parse without queueing; signatures are not checked
    pub fn validate(&self, body: &[u8]) -> DryRun {
        match parse_envelope(body) {
            Ok(event) => DryRun::Valid {
                parsed_payload: serde_json::to_value(&event).unwrap_or(Value::Null),
                would_be_processed: true,
            },
            Err(EnvelopeError::Malformed(error)) => DryRun::Invalid {
                error,
                would_be_processed: false,
            },
            Err(EnvelopeError::Invalid(errors)) => DryRun::ValidationFailed {
                missing_fields: EnvelopeError::Invalid(errors.clone()).missing_fields(),
                errors,
                would_be_processed: false,
            },
        }
    }

    fn check_signature(
        &self,
        expected: &SourceIdentity,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<String>, IntakeError> {
        let Some(verifier) = &self.signature else {
            return Ok(None);
        };

        let Some(provided) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
            tracing::warn!(target: "hms::security", endpoint = %expected, "Webhook rejected: signature header missing");
            return Err(IntakeError::MissingSignature);
        };

        match verifier.check(body, provided) {
            SignatureCheck::Valid => Ok(Some(provided.trim().to_string())),
            check => {
                tracing::warn!(
                    target: "hms::security",
                    endpoint = %expected,
                    check = ?check,
                    body_bytes = body.len(),
                    "Webhook rejected: signature verification failed"
                );
                Err(IntakeError::InvalidSignature)
            }
        }
    }
}
