//! Notion property flattening
//!
//! Notion returns page properties as typed objects
//! (`{"type": "title", "title": [{"plain_text": "..."}]}`). Scoring and
//! conflict detection work on plain values, so pages are flattened first.

use serde_json::{Map, Value};

/// Flatten a Notion `properties` object into `name -> plain value`
pub fn extract_properties(properties: &Map<String, Value>) -> Map<String, Value> {
    properties
        .iter()
        .map(|(name, property)| (name.clone(), extract_property(property)))
        .collect()
}

/// Flatten a page payload if it looks like a Notion page (has a `properties`
/// object); other payloads are returned unchanged.
pub fn flatten_page(data: &Value) -> Value {
    match data.get("properties").and_then(Value::as_object) {
        Some(properties) => Value::Object(extract_properties(properties)),
        None => data.clone(),
    }
}

fn extract_property(property: &Value) -> Value {
    let Some(kind) = property.get("type").and_then(Value::as_str) else {
        return property.clone();
    };
    let body = property.get(kind).unwrap_or(&Value::Null);
    match kind {
        "title" | "rich_text" => first_plain_text(body),
        "number" | "checkbox" | "url" | "email" | "phone_number" => body.clone(),
        "select" | "status" => body.get("name").cloned().unwrap_or(Value::Null),
        "multi_select" => Value::Array(
            body.as_array()
                .map(|items| items.iter().filter_map(|i| i.get("name").cloned()).collect())
                .unwrap_or_default(),
        ),
        "date" => body.get("start").cloned().unwrap_or(Value::Null),
        _ => body.clone(),
    }
}

fn first_plain_text(fragments: &Value) -> Value {
    fragments
        .as_array()
        .and_then(|items| items.first())
        .and_then(|first| first.get("plain_text"))
        .cloned()
        .unwrap_or(Value::Null)
}
