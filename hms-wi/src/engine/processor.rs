//! Per-attempt change processing
//!
//! Every attempt re-runs the full step sequence for an event:
//! 1. Revalidate the payload structure (failure is permanent)
//! 2. Invalidate cached evidence for `(origin, collection, record_id)`
//! 3. Insert/update: verify the data against the origin when a verifier is set
//! 4. Notion: flatten page properties
//! 5. Signal the index hook (upsert, or removal for deletes)
//!
//! Steps 2 and 5 are "ensure consistent with latest" operations, so repeating
//! an attempt never duplicates side effects.

use async_trait::async_trait;
use hms_common::cache::{CacheKey, EvidenceCache};
use hms_common::hooks::{CollaboratorError, IndexHook, SourceVerifier};
use hms_common::payload::integrity_digest;
use hms_common::{notion, EventType, SourceIdentity, WebhookEvent};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Attempt failure classification
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcessingError {
    /// Worth retrying (collaborator down or slow)
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Retrying cannot help (payload no longer valid)
    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl From<CollaboratorError> for ProcessingError {
    fn from(err: CollaboratorError) -> Self {
        ProcessingError::Transient(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingAction {
    CacheInvalidated,
    DataVerification,
    PropertyExtraction,
    IndexUpdate,
    IndexRemoval,
}

/// Result of comparing event data with the record at its origin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verification {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub expected_digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_digest: Option<String>,
}

/// What one successful attempt did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub actions: Vec<ProcessingAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_properties: Option<Value>,
}

impl ProcessingReport {
    fn new() -> Self {
        Self {
            actions: Vec::new(),
            verification: None,
            extracted_properties: None,
        }
    }
}

/// One processing attempt for one event
#[async_trait]
pub trait AttemptHandler: Send + Sync {
    async fn handle(&self, event: &WebhookEvent, attempt: u32) -> Result<ProcessingReport, ProcessingError>;
}

/// Default handler wiring cache, verifier and index collaborators
pub struct ChangeProcessor {
    cache: Arc<dyn EvidenceCache>,
    verifier: Option<Arc<dyn SourceVerifier>>,
    index: Arc<dyn IndexHook>,
    timeout: Duration,
}

impl ChangeProcessor {
    pub fn new(cache: Arc<dyn EvidenceCache>, index: Arc<dyn IndexHook>, timeout: Duration) -> Self {
        Self {
            cache,
            verifier: None,
            index,
            timeout,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SourceVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Bound a collaborator call; a timeout counts as a transient failure
    async fn bounded<T, F>(&self, collaborator: &str, call: F) -> Result<T, ProcessingError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(ProcessingError::from),
            Err(_) => Err(CollaboratorError::Timeout {
                collaborator: collaborator.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    async fn verify(&self, key: &CacheKey, event: &WebhookEvent) -> Result<Verification, ProcessingError> {
        let expected = comparable(&event.origin, &event.data);
        let expected_digest = integrity_digest(&expected);

        let Some(verifier) = &self.verifier else {
            return Ok(Verification {
                verified: false,
                reason: Some("no verifier configured".to_string()),
                expected_digest,
                actual_digest: None,
            });
        };

        let verification = match self.bounded("source verifier", verifier.fetch(key)).await? {
            Some(actual) => {
                let actual_digest = integrity_digest(&comparable(&event.origin, &actual));
                let verified = actual_digest == expected_digest;
                Verification {
                    verified,
                    reason: (!verified).then(|| "data differs from origin".to_string()),
                    expected_digest,
                    actual_digest: Some(actual_digest),
                }
            }
            None => Verification {
                verified: false,
                reason: Some("record not found at origin".to_string()),
                expected_digest,
                actual_digest: None,
            },
        };
        Ok(verification)
    }
}

/// Notion pages are compared on their flattened properties
fn comparable(origin: &SourceIdentity, data: &Value) -> Value {
    match origin {
        SourceIdentity::Notion => notion::flatten_page(data),
        _ => data.clone(),
    }
}

/// Structural checks repeated on every attempt
pub fn revalidate(event: &WebhookEvent) -> Result<(), ProcessingError> {
    if event.record_id.trim().is_empty() {
        return Err(ProcessingError::Permanent("record_id is required".to_string()));
    }
    if event.collection_name.trim().is_empty() {
        return Err(ProcessingError::Permanent("table_name is required".to_string()));
    }
    let Some(data) = event.data.as_object() else {
        return Err(ProcessingError::Permanent("data must be an object".to_string()));
    };
    if data.is_empty() && event.event_type != EventType::Delete {
        return Err(ProcessingError::Permanent(format!(
            "data is required for {} events",
            event.event_type
        )));
    }
    Ok(())
}

#[async_trait]
impl AttemptHandler for ChangeProcessor {
    async fn handle(&self, event: &WebhookEvent, attempt: u32) -> Result<ProcessingReport, ProcessingError> {
        revalidate(event)?;

        let key = event.cache_key();
        let mut report = ProcessingReport::new();

        self.bounded("evidence cache", self.cache.invalidate(&key)).await?;
        report.actions.push(ProcessingAction::CacheInvalidated);

        match event.event_type {
            EventType::Insert | EventType::Update => {
                let verification = self.verify(&key, event).await?;
                if !verification.verified {
                    tracing::warn!(
                        origin = %event.origin,
                        record_id = %event.record_id,
                        reason = verification.reason.as_deref().unwrap_or(""),
                        "Event data not verified against origin"
                    );
                }
                report.verification = Some(verification);
                report.actions.push(ProcessingAction::DataVerification);

                let indexed = if event.origin == SourceIdentity::Notion {
                    let extracted = notion::flatten_page(&event.data);
                    report.extracted_properties = Some(extracted.clone());
                    report.actions.push(ProcessingAction::PropertyExtraction);
                    extracted
                } else {
                    event.data.clone()
                };

                self.bounded("index hook", self.index.upsert(&key, &indexed)).await?;
                report.actions.push(ProcessingAction::IndexUpdate);
            }
            EventType::Delete => {
                self.bounded("index hook", self.index.remove(&key)).await?;
                report.actions.push(ProcessingAction::IndexRemoval);
            }
        }

        tracing::debug!(
            origin = %event.origin,
            record_id = %event.record_id,
            event_type = %event.event_type,
            attempt,
            actions = ?report.actions,
            "Event processed"
        );
        Ok(report)
    }
}
