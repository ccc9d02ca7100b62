//! Audit derivation and recording engine
//!
//! Given only a generic HTTP request (method + path + body) against an
//! ever-growing set of CRUD endpoints, this module infers which business
//! entity was affected and what kind of mutation happened, then persists
//! the inference asynchronously. No endpoint registers with it; no HTTP
//! response is ever delayed or failed by it.
//!
//! # Architecture
//!
//! - **Classifier**: (method, path) -> {biz_type, operation_type, data_id}
//!   through ordered convention tables, backed by a bounded cache
//! - **Disambiguator**: resolves the generic SAVE into ADD/UPDATE from
//!   payload heuristics
//! - **Actor/Description helpers**: pure extraction functions
//! - **Recorder**: validates and writes one row, never throws
//! - **Middleware**: the entry point; classifies after the handler has
//!   produced its response and records on a detached task
//! - **Reporter**: explicit per-operation recording for handlers that do
//!   not want inference
//!
//! # Usage
//!
//! ```no_run
//! use axum::Router;
//! use fitcms_server::audit::AuditLayer;
//! use sqlx::PgPool;
//!
//! # fn example(pool: PgPool) {
//! let app: Router = Router::new().layer(AuditLayer::new(pool));
//! # }
//! ```
//!
//! # Example: direct recording
//!
//! ```no_run
//! use fitcms_server::audit::{AuditRecorder, AuditReporter};
//! use serde_json::json;
//! use sqlx::PgPool;
//!
//! # fn example(pool: PgPool) {
//! let reporter = AuditReporter::new(AuditRecorder::with_pool(pool));
//! reporter.report_add("biz_sound", &json!({"name": "Welcome"}), "7");
//! # }
//! ```

mod actor;
mod cache;
mod classifier;
mod describe;
mod disambiguate;
mod helpers;
mod middleware;
mod models;
mod recorder;

#[cfg(test)]
mod middleware_tests;

pub use actor::{resolve_actor, AuthSession, ACTOR_ID_HEADER};
pub use cache::{CachedOutcome, ClassificationCache, DEFAULT_CACHE_CAPACITY};
pub use classifier::PathClassifier;
pub use describe::describe_entity;
pub use disambiguate::resolve_operation;
pub use helpers::AuditReporter;
pub use middleware::{
    AuditLayer, AuditMiddleware, AuditSettings, DEFAULT_EXCLUDED_PATHS, ORIGINAL_URI_HEADER,
};
pub use models::{
    AuditRecord, Classification, NewAuditRecord, NewAuditRecordBuilder, OperationType,
};
pub use recorder::{AuditRecorder, AuditRow, AuditStore, PgAuditStore, RecordOutcome};
