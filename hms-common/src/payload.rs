//! Payload helpers
//!
//! Payloads are opaque `serde_json::Value`s. The confidence pipeline only needs
//! a narrow view of them: which top-level fields carry data, whether a filter
//! key/value is present, and whether two sources agree on a field. Those views
//! live here so scoring code never walks arbitrary JSON itself.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Tolerance used when comparing normalized numbers
const NUMBER_TOLERANCE: f64 = 1e-9;

/// Canonical JSON serialization: object keys sorted recursively, compact form.
///
/// Two payloads that differ only in key order serialize identically.
pub fn canonical_json(value: &Value) -> String {
    // serde_json::Value serializes infallibly to a String
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Hex SHA-256 digest of the canonical serialization of `value`
pub fn integrity_digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

/// True if a value carries data (not null, not an empty/blank string, not an
/// empty array or object)
pub fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Fraction of payload fields that carry data, in [0, 1].
///
/// - object: populated fields / total fields (0.0 for `{}`)
/// - array: populated elements / total elements (0.0 for `[]`)
/// - scalar: 1.0 when it has content, else 0.0
pub fn completeness(payload: &Value) -> f64 {
    let (filled, total) = match payload {
        Value::Object(map) => (map.values().filter(|v| has_content(v)).count(), map.len()),
        Value::Array(items) => (items.iter().filter(|v| has_content(v)).count(), items.len()),
        scalar => return if has_content(scalar) { 1.0 } else { 0.0 },
    };
    if total == 0 {
        0.0
    } else {
        filled as f64 / total as f64
    }
}

/// Fraction of `filters` whose key is present in `payload` with an equal
/// (normalized) value. 1.0 when no filters are supplied.
pub fn filter_match(payload: &Value, filters: &Map<String, Value>) -> f64 {
    if filters.is_empty() {
        return 1.0;
    }
    let Value::Object(fields) = payload else {
        return 0.0;
    };
    let matches = filters
        .iter()
        .filter(|(key, expected)| {
            fields
                .get(key.as_str())
                .is_some_and(|actual| values_agree(actual, expected))
        })
        .count();
    matches as f64 / filters.len() as f64
}

/// Top-level field names of an object payload (empty for non-objects)
pub fn field_names(payload: &Value) -> impl Iterator<Item = &String> {
    payload.as_object().into_iter().flat_map(|map| map.keys())
}

/// Value with type and whitespace noise removed, used for cross-source
/// comparison.
#[derive(Debug, Clone)]
pub enum Normalized {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Normalized>),
    Map(BTreeMap<String, Normalized>),
}

impl Normalized {
    /// Normalize a JSON value.
    ///
    /// Strings are trimmed with inner whitespace collapsed; numeric and
    /// boolean strings become numbers and booleans, so `"42"` agrees with `42`.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Normalized::Null,
            Value::Bool(b) => Normalized::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(Normalized::Null, Normalized::Number),
            Value::String(s) => {
                let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
                if collapsed.is_empty() {
                    return Normalized::Null;
                }
                if let Ok(n) = collapsed.parse::<f64>() {
                    if n.is_finite() {
                        return Normalized::Number(n);
                    }
                }
                match collapsed.to_ascii_lowercase().as_str() {
                    "true" => Normalized::Bool(true),
                    "false" => Normalized::Bool(false),
                    _ => Normalized::Text(collapsed),
                }
            }
            Value::Array(items) => Normalized::List(items.iter().map(Self::from_value).collect()),
            Value::Object(map) => Normalized::Map(
                map.iter()
                    .map(|(k, v)| (k.trim().to_string(), Self::from_value(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Normalized {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Normalized::Null, Normalized::Null) => true,
            (Normalized::Bool(a), Normalized::Bool(b)) => a == b,
            (Normalized::Number(a), Normalized::Number(b)) => {
                (a - b).abs() <= NUMBER_TOLERANCE * a.abs().max(b.abs()).max(1.0)
            }
            (Normalized::Text(a), Normalized::Text(b)) => a == b,
            (Normalized::List(a), Normalized::List(b)) => a == b,
            (Normalized::Map(a), Normalized::Map(b)) => a == b,
            _ => false,
        }
    }
}

/// True if two values agree after normalization
pub fn values_agree(a: &Value, b: &Value) -> bool {
    Normalized::from_value(a) == Normalized::from_value(b)
}
