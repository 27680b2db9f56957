//! Webhook envelope parsing
//!
//! ```json
//! {"event_type": "update", "source": "supabase", "table_name": "products",
//!  "record_id": "42", "data": {...}, "timestamp": "2025-01-02T03:04:05Z",
//!  "metadata": {...}}
//! ```
//!
//! Every field problem is collected (not just the first) and reported with its
//! location, so callers can fix the payload in one round trip.

use chrono::Utc;
use hms_common::time::parse_timestamp;
use hms_common::{EventType, SourceIdentity, WebhookEvent};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Fields a valid envelope must carry
pub const REQUIRED_FIELDS: [&str; 6] = ["event_type", "source", "table_name", "record_id", "data", "timestamp"];

/// Field-level validation error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    fn new(field: &str, msg: impl Into<String>, kind: &str) -> Self {
        Self {
            loc: vec!["body".to_string(), field.to_string()],
            msg: msg.into(),
            kind: kind.to_string(),
        }
    }

    fn missing(field: &str) -> Self {
        Self::new(field, "Field required", "missing")
    }

    pub fn field(&self) -> Option<&str> {
        self.loc.get(1).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeError {
    /// Body is not JSON at all
    Malformed(String),
    /// JSON, but fields are missing or invalid
    Invalid(Vec<FieldError>),
}

impl EnvelopeError {
    /// Names of required fields absent from the body
    pub fn missing_fields(&self) -> Vec<String> {
        match self {
            EnvelopeError::Invalid(errors) => errors
                .iter()
                .filter(|e| e.kind == "missing")
                .filter_map(|e| e.field().map(str::to_string))
                .collect(),
            EnvelopeError::Malformed(_) => Vec::new(),
        }
    }
}

/// Parse and validate a raw webhook body
pub fn parse_envelope(body: &[u8]) -> Result<WebhookEvent, EnvelopeError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| EnvelopeError::Malformed(format!("Invalid JSON body: {}", e)))?;
    let Value::Object(fields) = value else {
        return Err(EnvelopeError::Invalid(vec![FieldError {
            loc: vec!["body".to_string()],
            msg: "Input should be a valid dictionary".to_string(),
            kind: "dict_type".to_string(),
        }]));
    };

    let mut errors = Vec::new();

    let event_type = match fields.get("event_type") {
        None | Some(Value::Null) => {
            errors.push(FieldError::missing("event_type"));
            None
        }
        Some(raw) => {
            let parsed = raw.as_str().and_then(EventType::parse);
            if parsed.is_none() {
                errors.push(FieldError::new(
                    "event_type",
                    "Input should be 'insert', 'update' or 'delete'",
                    "enum",
                ));
            }
            parsed
        }
    };

    let origin = required_string(&fields, "source", &mut errors).map(SourceIdentity::from);
    let collection_name = required_string(&fields, "table_name", &mut errors);
    let record_id = record_id(&fields, &mut errors);

    let data = match fields.get("data") {
        None | Some(Value::Null) => {
            errors.push(FieldError::missing("data"));
            None
        }
        Some(data @ Value::Object(_)) => Some(data.clone()),
        Some(_) => {
            errors.push(FieldError::new("data", "Input should be a valid dictionary", "dict_type"));
            None
        }
    };

    let timestamp = match fields.get("timestamp") {
        None | Some(Value::Null) => {
            errors.push(FieldError::missing("timestamp"));
            None
        }
        Some(raw) => {
            let parsed = raw.as_str().and_then(parse_timestamp);
            if parsed.is_none() {
                errors.push(FieldError::new(
                    "timestamp",
                    "Input should be a valid ISO-8601 datetime",
                    "datetime_parsing",
                ));
            }
            parsed
        }
    };

    let metadata = match fields.get("metadata") {
        None | Some(Value::Null) => None,
        Some(meta @ Value::Object(_)) => Some(meta.clone()),
        Some(_) => {
            errors.push(FieldError::new("metadata", "Input should be a valid dictionary", "dict_type"));
            None
        }
    };

    match (event_type, origin, collection_name, record_id, data, timestamp) {
        (Some(event_type), Some(origin), Some(collection_name), Some(record_id), Some(data), Some(timestamp))
            if errors.is_empty() =>
        {
            Ok(WebhookEvent {
                event_id: Uuid::new_v4(),
                event_type,
                origin,
                collection_name,
                record_id,
                data,
                timestamp,
                received_at: Utc::now(),
                metadata,
                signature: None,
            })
        }
        _ => Err(EnvelopeError::Invalid(errors)),
    }
}

fn required_string(fields: &Map<String, Value>, name: &str, errors: &mut Vec<FieldError>) -> Option<String> {
    match fields.get(name) {
        None | Some(Value::Null) => {
            errors.push(FieldError::missing(name));
            None
        }
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::String(_)) => {
            errors.push(FieldError::new(name, "String should have at least 1 character", "string_too_short"));
            None
        }
        Some(_) => {
            errors.push(FieldError::new(name, "Input should be a valid string", "string_type"));
            None
        }
    }
}

/// Database triggers often send numeric primary keys; accept and stringify them
fn record_id(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<String> {
    match fields.get("record_id") {
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => required_string(fields, "record_id", errors),
    }
}
