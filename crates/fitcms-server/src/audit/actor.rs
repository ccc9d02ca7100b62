//! Actor resolution
//!
//! Pure function of the request; always yields a non-empty identifier.

use http::HeaderMap;
use serde_json::Value as JsonValue;
use std::net::IpAddr;

/// Header set by the gateway when the request carries an authenticated
/// user id.
pub const ACTOR_ID_HEADER: &str = "x-user-id";

/// Legacy body field some older clients still send.
const LEGACY_USER_FIELD: &str = "userId";

/// Prefix marking actors identified only by their network address.
const IP_MARKER: &str = "ip:";

/// Authenticated session attached to the request by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: i64,
}

/// Resolve who performed the request, first hit wins: session user id,
/// actor header, numeric legacy body field, then the caller's address.
pub fn resolve_actor(
    session: Option<&AuthSession>,
    headers: &HeaderMap,
    body: Option<&JsonValue>,
    remote_addr: Option<IpAddr>,
) -> String {
    if let Some(session) = session {
        return session.user_id.to_string();
    }

    if let Some(header_id) = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return header_id.to_string();
    }

    if let Some(legacy_id) = body.and_then(numeric_user_field) {
        return legacy_id;
    }

    match remote_addr {
        Some(addr) => format!("{IP_MARKER}{addr}"),
        None => format!("{IP_MARKER}unknown"),
    }
}

/// The legacy field counts only when purely numeric.
fn numeric_user_field(body: &JsonValue) -> Option<String> {
    match body.get(LEGACY_USER_FIELD)? {
        JsonValue::Number(n) => n.as_i64().map(|id| id.to_string()),
        JsonValue::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            Some(s.clone())
        },
        _ => None,
    }
}
