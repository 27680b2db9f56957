//! Downstream collaborators signalled by webhook processing
//!
//! - [`SourceVerifier`]: re-fetches a record from its origin
//! - [`IndexHook`]: keeps a search/memory index consistent with the latest state
//!
//! Both are "ensure consistent with latest" operations so reprocessing an event
//! never duplicates side effects.

use crate::cache::CacheKey;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure of an external collaborator call; always treated as transient
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("{collaborator} timed out after {timeout_ms}ms")]
    Timeout { collaborator: String, timeout_ms: u64 },

    #[error("{collaborator} unavailable: {message}")]
    Unavailable { collaborator: String, message: String },
}

impl CollaboratorError {
    pub fn unavailable(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        CollaboratorError::Unavailable {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

/// Round-trip check against the originating system
#[async_trait]
pub trait SourceVerifier: Send + Sync {
    /// Current record at the origin; `Ok(None)` if it no longer exists
    async fn fetch(&self, key: &CacheKey) -> Result<Option<Value>, CollaboratorError>;
}

/// Index/update hook
#[async_trait]
pub trait IndexHook: Send + Sync {
    /// Make the index entry for `key` equal to `data`
    async fn upsert(&self, key: &CacheKey, data: &Value) -> Result<(), CollaboratorError>;

    /// Make sure no index entry exists for `key`
    async fn remove(&self, key: &CacheKey) -> Result<(), CollaboratorError>;
}

/// Index hook that only logs; used when no index backend is configured
#[derive(Debug, Default, Clone)]
pub struct TracingIndexHook;

#[async_trait]
impl IndexHook for TracingIndexHook {
    async fn upsert(&self, key: &CacheKey, data: &Value) -> Result<(), CollaboratorError> {
        let fields = data.as_object().map_or(0, |m| m.len());
        tracing::info!(key = %key, fields, "Index update");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CollaboratorError> {
        tracing::info!(key = %key, "Index removal");
        Ok(())
    }
}
