//! Source client contract
//!
//! A source client turns query filters into evidence records for one origin.
//! It never fails: no match yields an empty list (or a `missing` record), and
//! query errors are captured as [`EvidenceRecord::query_error`] so the gate
//! applies the same policy whatever the cause.

use crate::evidence::{EvidenceRecord, SourceIdentity};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

#[async_trait]
pub trait SourceClient: Send + Sync {
    fn origin(&self) -> SourceIdentity;

    async fn query(&self, filters: &Map<String, Value>) -> Vec<EvidenceRecord>;
}

/// Fixed record set filtered by exact (normalized) field match.
///
/// Backs local deployments and tests where no live source is reachable.
#[derive(Debug, Clone)]
pub struct StaticSourceClient {
    origin: SourceIdentity,
    collection: String,
    rows: Arc<Vec<(String, Value)>>,
}

impl StaticSourceClient {
    pub fn new(origin: SourceIdentity, collection: impl Into<String>, rows: Vec<(String, Value)>) -> Self {
        Self {
            origin,
            collection: collection.into(),
            rows: Arc::new(rows),
        }
    }
}

#[async_trait]
impl SourceClient for StaticSourceClient {
    fn origin(&self) -> SourceIdentity {
        self.origin.clone()
    }

    async fn query(&self, filters: &Map<String, Value>) -> Vec<EvidenceRecord> {
        let records: Vec<EvidenceRecord> = self
            .rows
            .iter()
            .filter(|(_, row)| crate::payload::filter_match(row, filters) >= 1.0)
            .map(|(id, row)| {
                EvidenceRecord::found(self.origin.clone(), id.clone(), row.clone())
                    .with_collection(self.collection.clone())
            })
            .collect();

        if records.is_empty() {
            vec![EvidenceRecord::missing(self.origin.clone()).with_collection(self.collection.clone())]
        } else {
            records
        }
    }
}
