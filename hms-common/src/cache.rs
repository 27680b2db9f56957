//! Evidence cache contract
//!
//! Cached evidence is keyed per `(origin, collection, record_id)`.
//! Invalidation is "remove", never "set to X", so concurrent invalidations of
//! the same key may interleave in any order.

use crate::evidence::SourceIdentity;
use crate::hooks::CollaboratorError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub origin: SourceIdentity,
    pub collection: String,
    pub record_id: String,
}

impl CacheKey {
    pub fn new(origin: SourceIdentity, collection: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            origin,
            collection: collection.into(),
            record_id: record_id.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.origin, self.collection, self.record_id)
    }
}

/// Cache collaborator
///
/// Implementations must be idempotent and fail fast; callers bound every call
/// with a timeout and treat a timeout as a transient failure.
#[async_trait]
pub trait EvidenceCache: Send + Sync {
    async fn invalidate(&self, key: &CacheKey) -> Result<(), CollaboratorError>;
}

/// Process-local cache, used when no external cache backend is configured
#[derive(Debug, Default)]
pub struct InMemoryEvidenceCache {
    entries: RwLock<HashMap<CacheKey, Value>>,
}

impl InMemoryEvidenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: CacheKey, value: Value) {
        self.entries.write().await.insert(key, value);
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl EvidenceCache for InMemoryEvidenceCache {
    async fn invalidate(&self, key: &CacheKey) -> Result<(), CollaboratorError> {
        let removed = self.entries.write().await.remove(key).is_some();
        tracing::debug!(key = %key, removed, "Cache invalidated");
        Ok(())
    }
}
