//! Evidence records and source identities
//!
//! An [`EvidenceRecord`] is one source's answer to one query or event, with the
//! trust metadata the confidence pipeline consumes. Records are immutable once
//! built; constructors enforce the invariant that a record flagged as
//! "information missing" never carries a payload.

use crate::payload::integrity_digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Origin record ids that mark an invalid record
pub const SENTINEL_RECORD_IDS: [&str; 3] = ["none", "unknown", "error"];

/// Origin of a piece of evidence
///
/// Known sources carry fixed default weights; any other name is accepted as
/// [`SourceIdentity::Other`] and scored conservatively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceIdentity {
    /// Supabase (Postgres) tables
    Supabase,
    /// Notion databases
    Notion,
    /// Any other origin, by lowercase name
    Other(String),
}

impl SourceIdentity {
    /// Lowercase wire name
    pub fn as_str(&self) -> &str {
        match self {
            SourceIdentity::Supabase => "supabase",
            SourceIdentity::Notion => "notion",
            SourceIdentity::Other(name) => name,
        }
    }

    /// Default reliability weight in [0, 1]
    pub fn default_reliability(&self) -> f64 {
        match self {
            SourceIdentity::Supabase => 0.95,
            SourceIdentity::Notion => 0.90,
            SourceIdentity::Other(_) => 0.50,
        }
    }

    /// Default weight used when blending several sources
    pub fn default_aggregation_weight(&self) -> f64 {
        match self {
            SourceIdentity::Supabase => 0.55,
            SourceIdentity::Notion => 0.45,
            SourceIdentity::Other(_) => 0.50,
        }
    }
}

impl From<String> for SourceIdentity {
    fn from(raw: String) -> Self {
        let name = raw.trim().to_ascii_lowercase();
        match name.as_str() {
            "supabase" => SourceIdentity::Supabase,
            "notion" => SourceIdentity::Notion,
            _ => SourceIdentity::Other(name),
        }
    }
}

impl From<&str> for SourceIdentity {
    fn from(raw: &str) -> Self {
        SourceIdentity::from(raw.to_string())
    }
}

impl From<SourceIdentity> for String {
    fn from(source: SourceIdentity) -> Self {
        source.as_str().to_string()
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-source weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceWeights {
    /// Reliability factor used by the confidence calculator
    pub reliability: f64,
    /// Weight used by the aggregator
    pub aggregation_weight: f64,
}

/// Source weight table: defaults per [`SourceIdentity`] plus configured overrides
#[derive(Debug, Clone, Default)]
pub struct SourcePolicy {
    overrides: HashMap<SourceIdentity, SourceWeights>,
}

impl SourcePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the weights of one source
    pub fn with_override(mut self, source: SourceIdentity, weights: SourceWeights) -> Self {
        self.overrides.insert(source, weights);
        self
    }

    pub fn weights(&self, source: &SourceIdentity) -> SourceWeights {
        self.overrides.get(source).copied().unwrap_or(SourceWeights {
            reliability: source.default_reliability(),
            aggregation_weight: source.default_aggregation_weight(),
        })
    }

    pub fn reliability(&self, source: &SourceIdentity) -> f64 {
        self.weights(source).reliability
    }

    pub fn aggregation_weight(&self, source: &SourceIdentity) -> f64 {
        self.weights(source).aggregation_weight
    }
}

/// One source's answer to one query or event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EvidenceRecordWire")]
pub struct EvidenceRecord {
    payload: Option<Value>,
    origin: SourceIdentity,
    origin_record_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    collection: Option<String>,
    retrieved_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    integrity_digest: Option<String>,
    information_missing: bool,
    verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

impl EvidenceRecord {
    /// Record for data that was found at the source.
    ///
    /// The integrity digest is computed from `payload` here, at retrieval time.
    pub fn found(origin: SourceIdentity, origin_record_id: impl Into<String>, payload: Value) -> Self {
        let digest = integrity_digest(&payload);
        Self {
            payload: Some(payload),
            origin,
            origin_record_id: origin_record_id.into(),
            collection: None,
            retrieved_at: Utc::now(),
            integrity_digest: Some(digest),
            information_missing: false,
            verified: true,
            note: None,
        }
    }

    /// Record stating that no matching data exists at the source.
    ///
    /// The source answered, so the record counts as verified.
    pub fn missing(origin: SourceIdentity) -> Self {
        Self {
            payload: None,
            origin,
            origin_record_id: "none".to_string(),
            collection: None,
            retrieved_at: Utc::now(),
            integrity_digest: None,
            information_missing: true,
            verified: true,
            note: None,
        }
    }

    /// Record capturing a failed query: no data and not verified
    pub fn query_error(origin: SourceIdentity, note: impl Into<String>) -> Self {
        Self {
            payload: None,
            origin,
            origin_record_id: "error".to_string(),
            collection: None,
            retrieved_at: Utc::now(),
            integrity_digest: None,
            information_missing: true,
            verified: false,
            note: Some(note.into()),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Mark whether the record was cross-checked against its origin
    pub fn with_verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    pub fn with_retrieved_at(mut self, retrieved_at: DateTime<Utc>) -> Self {
        self.retrieved_at = retrieved_at;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn origin(&self) -> &SourceIdentity {
        &self.origin
    }

    pub fn origin_record_id(&self) -> &str {
        &self.origin_record_id
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn retrieved_at(&self) -> DateTime<Utc> {
        self.retrieved_at
    }

    pub fn integrity_digest(&self) -> Option<&str> {
        self.integrity_digest.as_deref()
    }

    pub fn information_missing(&self) -> bool {
        self.information_missing
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// False for empty ids and the sentinel ids `none`, `unknown`, `error`
    pub fn has_valid_origin_id(&self) -> bool {
        let id = self.origin_record_id.trim();
        !id.is_empty() && !SENTINEL_RECORD_IDS.contains(&id.to_ascii_lowercase().as_str())
    }

    /// Recompute the payload digest and compare with the stored one.
    ///
    /// Records without payload verify trivially when they also carry no digest.
    pub fn verify_integrity(&self) -> bool {
        match (&self.payload, &self.integrity_digest) {
            (Some(payload), Some(expected)) => integrity_digest(payload) == *expected,
            (None, None) => true,
            _ => false,
        }
    }
}

/// Wire shape accepted from callers; converted through the same invariants
/// as the constructors.
#[derive(Debug, Deserialize)]
struct EvidenceRecordWire {
    #[serde(default)]
    payload: Option<Value>,
    origin: SourceIdentity,
    #[serde(default)]
    origin_record_id: Option<String>,
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    retrieved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    integrity_digest: Option<String>,
    #[serde(default)]
    information_missing: bool,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    note: Option<String>,
}

impl TryFrom<EvidenceRecordWire> for EvidenceRecord {
    type Error = String;

    fn try_from(wire: EvidenceRecordWire) -> Result<Self, Self::Error> {
        let payload = wire.payload.filter(|p| !p.is_null());
        if wire.information_missing && payload.is_some() {
            return Err("information_missing records must not carry a payload".to_string());
        }
        // A caller-supplied digest is kept so tampering stays detectable
        let integrity_digest = match (&payload, wire.integrity_digest) {
            (Some(p), None) => Some(integrity_digest(p)),
            (_, supplied) => supplied,
        };
        Ok(Self {
            payload,
            origin: wire.origin,
            origin_record_id: wire.origin_record_id.unwrap_or_else(|| "unknown".to_string()),
            collection: wire.collection,
            retrieved_at: wire.retrieved_at.unwrap_or_else(Utc::now),
            integrity_digest,
            information_missing: wire.information_missing,
            verified: wire.verified,
            note: wire.note,
        })
    }
}
