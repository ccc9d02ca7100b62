//! Resolution of the generic SAVE classification
//!
//! One "save" action conventionally serves both create and update. The
//! presence of a primary key is the only usable signal, so resolution is
//! payload inspection, never a database round-trip.

use serde_json::Value as JsonValue;

use super::models::OperationType;

/// Body/response field conventionally carrying the primary key.
const ID_FIELD: &str = "id";

/// Field some handlers report after an insert.
const INSERT_ID_FIELD: &str = "insertId";

/// Resolve a possibly-SAVE operation into something persistable.
///
/// Order: non-SAVE passes through; a positive path id means UPDATE; then
/// an `id`/`insertId` field in the body or response decides; then a known
/// "before" snapshot means UPDATE; the default is ADD. The default can
/// misclassify an update whose payload omits its id — accepted limitation.
pub fn resolve_operation(
    operation: OperationType,
    path_id: Option<i64>,
    body: Option<&JsonValue>,
    response: Option<&JsonValue>,
    before: Option<&JsonValue>,
) -> OperationType {
    if operation != OperationType::Save {
        return operation;
    }

    if path_id.is_some_and(|id| id > 0) {
        return OperationType::Update;
    }

    for payload in [body, response].into_iter().flatten() {
        if positive_int_field(payload, ID_FIELD).is_some() {
            return OperationType::Update;
        }
        if payload.get(INSERT_ID_FIELD).is_some_and(|v| !v.is_null()) {
            return OperationType::Add;
        }
    }

    if before.is_some_and(|snapshot| !snapshot.is_null()) {
        return OperationType::Update;
    }

    OperationType::Add
}

/// A positive integer field, accepting JSON numbers and digit strings.
pub(crate) fn positive_int_field(value: &JsonValue, field: &str) -> Option<i64> {
    match value.get(field)? {
        JsonValue::Number(n) => n.as_i64().filter(|id| *id > 0),
        JsonValue::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse().ok().filter(|id: &i64| *id > 0)
        },
        _ => None,
    }
}
