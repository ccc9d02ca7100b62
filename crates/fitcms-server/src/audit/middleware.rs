//! Audit interception middleware
//!
//! Wraps the whole router and, for qualifying mutating requests, derives
//! an audit record from nothing but (method, path, body, response):
//! - only configured mutating methods are considered; excluded path
//!   fragments and read-style routes never record
//! - the handler runs unmodified and the client gets its response first
//! - classification -> disambiguation -> actor/description -> recording
//!   happens on a detached task that can never delay or fail the response

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request},
    http::{HeaderMap, Method},
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::{
    future::Future,
    net::{IpAddr, SocketAddr},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use super::actor::{resolve_actor, AuthSession};
use super::cache::{ClassificationCache, DEFAULT_CACHE_CAPACITY};
use super::classifier::PathClassifier;
use super::describe::describe_entity;
use super::disambiguate::{positive_int_field, resolve_operation};
use super::models::{Classification, NewAuditRecord, OperationType};
use super::recorder::AuditRecorder;

/// Header a reverse proxy uses to carry the unrewritten URL.
pub const ORIGINAL_URI_HEADER: &str = "x-original-uri";

/// Path fragments that never produce audit records: health checks, the
/// audit trail's own read routes, auth endpoints and reference data.
pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &[
    "/health",
    "/auditRecord",
    "/login",
    "/logout",
    "/captcha",
    "/dict",
    "/enums",
];

/// Routes ending in these return data, they do not mutate it.
const READ_SUFFIXES: &[&str] = &["page", "detail", "list"];

/// Field handlers use to report what a delete actually removed.
const DELETED_FIELD: &str = "deleted";

/// Batch-delete id list in request bodies.
const ID_LIST_FIELD: &str = "idList";

/// Which requests the middleware intercepts. Both the excluded fragments
/// and the mutating method set can be overridden at construction.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub excluded_paths: Vec<String>,
    pub mutating_methods: Vec<Method>,
    pub cache_capacity: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            excluded_paths: DEFAULT_EXCLUDED_PATHS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mutating_methods: vec![Method::POST, Method::PUT, Method::DELETE, Method::PATCH],
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Audit interception layer
///
/// Wraps services to derive and record audit entries for mutating
/// requests without any endpoint registering itself.
#[derive(Clone)]
pub struct AuditLayer {
    recorder: AuditRecorder,
    classifier: Arc<PathClassifier>,
    settings: Arc<AuditSettings>,
}

impl AuditLayer {
    /// Layer with default settings, recording through the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self::with_settings(AuditRecorder::with_pool(pool), AuditSettings::default())
    }

    pub fn with_settings(recorder: AuditRecorder, settings: AuditSettings) -> Self {
        let cache = Arc::new(ClassificationCache::new(settings.cache_capacity));
        Self {
            recorder,
            classifier: Arc::new(PathClassifier::new(cache)),
            settings: Arc::new(settings),
        }
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditMiddleware {
            inner,
            recorder: self.recorder.clone(),
            classifier: self.classifier.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// Audit middleware service
#[derive(Clone)]
pub struct AuditMiddleware<S> {
    inner: S,
    recorder: AuditRecorder,
    classifier: Arc<PathClassifier>,
    settings: Arc<AuditSettings>,
}

impl<S> Service<Request> for AuditMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Display,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let recorder = self.recorder.clone();
        let classifier = self.classifier.clone();
        let settings = self.settings.clone();

        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_string();

            if !qualifies(&method, &path, &settings) {
                return inner.call(request).await;
            }

            // Proxies may rewrite the routing path; the original URL wins
            // for classification when the gateway forwards it.
            let classify_path = request
                .headers()
                .get(ORIGINAL_URI_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| path.clone());

            let headers = request.headers().clone();
            let session = request.extensions().get::<AuthSession>().copied();
            let remote_addr = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip());

            // Buffer the request body; the handler sees it untouched.
            let (parts, body) = request.into_parts();
            let body_bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!(
                        method = %method,
                        path = %path,
                        error = %e,
                        "Failed to buffer request body"
                    );
                    Bytes::new()
                },
            };
            let request = Request::from_parts(parts, Body::from(body_bytes.clone()));

            let response = inner.call(request).await?;

            if !response.status().is_success() {
                debug!(
                    method = %method,
                    path = %path,
                    status = %response.status(),
                    "Mutation did not succeed, nothing to record"
                );
                return Ok(response);
            }

            // A classification miss is a valid "nothing to record".
            let Some(classification) = classifier.classify(&method, &classify_path) else {
                return Ok(response);
            };

            // The delete rule needs the handler's payload, so the response
            // body is buffered and rebuilt before it leaves.
            let (parts, body) = response.into_parts();
            let response_bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!(
                        method = %method,
                        path = %path,
                        error = %e,
                        "Failed to buffer response body"
                    );
                    Bytes::new()
                },
            };
            let response = Response::from_parts(parts, Body::from(response_bytes.clone()));

            // Recording is fire and forget: the client gets its response
            // now, and the detached task cannot surface anything.
            tokio::spawn(record_request(
                recorder,
                classification,
                headers,
                session,
                remote_addr,
                body_bytes,
                response_bytes,
            ));

            Ok(response)
        })
    }
}

/// Eligibility gate: mutating method, no excluded fragment, no read-style
/// suffix, and the read heuristic agrees.
fn qualifies(method: &Method, path: &str, settings: &AuditSettings) -> bool {
    if !settings.mutating_methods.contains(method) {
        return false;
    }
    if settings
        .excluded_paths
        .iter()
        .any(|fragment| path.contains(fragment.as_str()))
    {
        return false;
    }
    let trimmed = path.trim_end_matches('/');
    if READ_SUFFIXES
        .iter()
        .any(|suffix| trimmed.ends_with(suffix))
    {
        return false;
    }
    !is_read_request(method, trimmed)
}

/// Redundant safety net kept from the original design: even if the method
/// set is overridden to include GET, detail-style GETs stay reads.
fn is_read_request(method: &Method, path: &str) -> bool {
    if *method != Method::GET {
        return false;
    }
    let last = path.rsplit('/').next().unwrap_or("");
    (!last.is_empty() && last.bytes().all(|b| b.is_ascii_digit()))
        || READ_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// The detached recording task. Every failure path here ends in a log
/// line; nothing reaches the HTTP caller.
async fn record_request(
    recorder: AuditRecorder,
    classification: Classification,
    headers: HeaderMap,
    session: Option<AuthSession>,
    remote_addr: Option<IpAddr>,
    body_bytes: Bytes,
    response_bytes: Bytes,
) {
    let body = parse_json(&body_bytes);
    let response = parse_json(&response_bytes);

    let Classification {
        biz_type,
        operation_type,
        data_id: path_id,
    } = classification;

    // Only the handler knows what a delete actually removed; its reported
    // payload beats anything in the request body.
    let deleted = (operation_type == OperationType::Delete)
        .then(|| response.as_ref().and_then(reported_deleted))
        .flatten();

    // The response payload feeds disambiguation only for deletes.
    let response_for_resolution = if operation_type == OperationType::Delete {
        response.as_ref()
    } else {
        None
    };
    let operation_type = resolve_operation(
        operation_type,
        path_id,
        body.as_ref(),
        response_for_resolution,
        deleted.as_ref(),
    );

    let data_id = path_id
        .or_else(|| body.as_ref().and_then(|b| positive_int_field(b, "id")))
        .or_else(|| deleted.as_ref().and_then(|d| positive_int_field(d, "id")))
        .or_else(|| response.as_ref().and_then(|r| positive_int_field(r, "id")))
        .or_else(|| response.as_ref().and_then(|r| positive_int_field(r, "insertId")))
        .unwrap_or(0);

    let data_info = match (&deleted, operation_type) {
        (Some(snapshot), _) => describe_entity(snapshot, None),
        (None, OperationType::Delete) => delete_fallback_info(body.as_ref()),
        _ => body
            .as_ref()
            .map(|b| describe_entity(b, None))
            .unwrap_or_else(|| "Unknown".to_string()),
    };

    let operation_user = resolve_actor(session.as_ref(), &headers, body.as_ref(), remote_addr);

    let data_after = match operation_type {
        OperationType::Delete => None,
        _ => body.clone(),
    };

    let record = NewAuditRecord {
        biz_type: biz_type.clone(),
        data_id,
        data_info,
        operation_type,
        data_before: deleted,
        data_after,
        operation_user,
    };

    let outcome = recorder.record(record).await;
    if outcome.success {
        info!(
            biz_type = %biz_type,
            operation = %operation_type,
            data_id,
            "Audit record created"
        );
    } else {
        warn!(
            biz_type = %biz_type,
            reason = ?outcome.reason,
            "Audit recording failed"
        );
    }
}

fn parse_json(bytes: &Bytes) -> Option<JsonValue> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes).ok()
}

/// Handlers report removals as a `deleted` payload; for batch deletes the
/// first item stands in for the set.
fn reported_deleted(response: &JsonValue) -> Option<JsonValue> {
    match response.get(DELETED_FIELD)? {
        JsonValue::Array(items) => items.first().cloned(),
        JsonValue::Null => None,
        value => Some(value.clone()),
    }
}

/// Request-body hints for deletes whose handler reported nothing.
fn delete_fallback_info(body: Option<&JsonValue>) -> String {
    let Some(body) = body else {
        return "Unknown".to_string();
    };
    if let Some(name) = body
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
    {
        return name.to_string();
    }
    if let Some(list) = body.get(ID_LIST_FIELD).and_then(|v| v.as_array()) {
        return format!("{} records deleted", list.len());
    }
    describe_entity(body, None)
}
