//! Entity description extraction

use serde_json::{Map, Value as JsonValue};

/// Conventional name-like fields, probed in order.
const NAME_FIELDS: &[&str] = &["name", "title", "fileName", "nickname", "userName"];

const UNKNOWN: &str = "Unknown";

/// Build a human-readable summary for an arbitrary entity payload.
///
/// The preferred field wins when present and non-empty; then the
/// conventional name fields; then `ID:<id>`; then `"Unknown"`. A bare
/// non-empty string describes itself. Never panics.
pub fn describe_entity(value: &JsonValue, preferred: Option<&str>) -> String {
    if let JsonValue::String(text) = value {
        if !text.trim().is_empty() {
            return text.clone();
        }
    }

    let Some(object) = value.as_object() else {
        return UNKNOWN.to_string();
    };

    if let Some(text) = preferred.and_then(|field| field_text(object, field)) {
        return text;
    }

    for field in NAME_FIELDS {
        if let Some(text) = field_text(object, field) {
            return text;
        }
    }

    if let Some(id) = object.get("id").filter(|id| !id.is_null()) {
        return format!("ID:{}", scalar_text(id));
    }

    UNKNOWN.to_string()
}

fn field_text(object: &Map<String, JsonValue>, field: &str) -> Option<String> {
    match object.get(field)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
