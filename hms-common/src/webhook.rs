//! Webhook event model
//!
//! A [`WebhookEvent`] is built once by intake after validation and never
//! mutated afterwards; retries share it behind an `Arc`.

use crate::evidence::SourceIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Change kind carried by a webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

impl EventType {
    pub const ALL: [EventType; 3] = [EventType::Insert, EventType::Update, EventType::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Insert => "insert",
            EventType::Update => "update",
            EventType::Delete => "delete",
        }
    }

    /// Parse the wire name (case-insensitive)
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "insert" => Some(EventType::Insert),
            "update" => Some(EventType::Update),
            "delete" => Some(EventType::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated inbound change notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEvent {
    /// Local id assigned on receipt
    pub event_id: Uuid,
    pub event_type: EventType,
    pub origin: SourceIdentity,
    pub collection_name: String,
    pub record_id: String,
    pub data: Value,
    /// Change time reported by the source
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl WebhookEvent {
    /// Key under which evidence for this record is cached
    pub fn cache_key(&self) -> crate::cache::CacheKey {
        crate::cache::CacheKey::new(self.origin.clone(), &self.collection_name, &self.record_id)
    }

    /// `(origin, record_id, event_type, timestamp)`; reprocessing the same
    /// tuple must leave the same end state
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.origin,
            self.record_id,
            self.event_type,
            self.timestamp.to_rfc3339()
        )
    }

    /// Events sharing this key are processed one at a time, in arrival order
    pub fn serialization_key(&self) -> (SourceIdentity, String) {
        (self.origin.clone(), self.record_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn event(event_type: EventType) -> WebhookEvent {
        WebhookEvent {
            event_id: Uuid::new_v4(),
            event_type,
            origin: SourceIdentity::Supabase,
            collection_name: "products".to_string(),
            record_id: "42".to_string(),
            data: json!({"price": 10}),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            received_at: Utc::now(),
            metadata: None,
            signature: None,
        }
    }

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(serde_json::to_string(&EventType::Delete).unwrap(), "\"delete\"");
        assert_eq!(EventType::parse(" UPDATE "), Some(EventType::Update));
        assert_eq!(EventType::parse("upsert"), None);
    }

    #[test]
    fn test_idempotency_key_ignores_local_ids() {
        let a = event(EventType::Update);
        let b = event(EventType::Update);
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.idempotency_key(), b.idempotency_key());
        assert_ne!(a.idempotency_key(), event(EventType::Delete).idempotency_key());
    }

    #[test]
    fn test_serialization_key_spans_event_types() {
        assert_eq!(
            event(EventType::Insert).serialization_key(),
            event(EventType::Delete).serialization_key()
        );
    }
}
