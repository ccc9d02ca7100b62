//! Audit persistence
//!
//! The recorder validates and writes exactly one row per call and reports
//! the outcome as a value. Nothing in here throws past its boundary:
//! instrumentation failures must stay distinguishable from, and never be
//! conflated with, business-logic failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, warn};

use super::models::NewAuditRecord;
use crate::error::ServerResult;

/// One row as handed to the store, snapshots already serialized.
#[derive(Debug, Clone)]
pub struct AuditRow {
    pub biz_type: String,
    pub data_id: i64,
    pub data_info: String,
    pub operation_type: &'static str,
    pub data_before: Option<String>,
    pub data_after: Option<String>,
    pub operation_user: String,
    pub operation_time: DateTime<Utc>,
}

/// Write capability for audit rows.
///
/// Production binds a `PgPool`; tests plug in an in-memory store so the
/// whole pipeline runs without a database.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, row: AuditRow) -> ServerResult<()>;
}

/// Postgres-backed store issuing the single INSERT.
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn insert(&self, row: AuditRow) -> ServerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_record (
                biz_type, data_id, data_info, operation_type,
                data_before, data_after, operation_user, operation_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&row.biz_type)
        .bind(row.data_id)
        .bind(&row.data_info)
        .bind(row.operation_type)
        .bind(&row.data_before)
        .bind(&row.data_after)
        .bind(&row.operation_user)
        .bind(row.operation_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Outcome of one recording attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub success: bool,
    pub reason: Option<String>,
}

impl RecordOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// Validates and persists audit records; cheap to clone.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self::new(Arc::new(PgAuditStore::new(pool)))
    }

    /// Record one audit entry. Failures are logged and returned as a
    /// failed outcome, never raised.
    pub async fn record(&self, record: NewAuditRecord) -> RecordOutcome {
        if let Err(reason) = validate(&record) {
            warn!(
                biz_type = %record.biz_type,
                operation = %record.operation_type,
                reason,
                "Rejected audit record"
            );
            return RecordOutcome::failed(reason);
        }

        let row = AuditRow {
            biz_type: record.biz_type,
            data_id: record.data_id,
            data_info: record.data_info,
            operation_type: record.operation_type.as_str(),
            data_before: snapshot_text(record.data_before),
            data_after: snapshot_text(record.data_after),
            operation_user: record.operation_user,
            operation_time: Utc::now(),
        };

        match self.store.insert(row).await {
            Ok(()) => {
                debug!("Audit record written");
                RecordOutcome::ok()
            },
            Err(e) => {
                warn!(error = %e, "Failed to write audit record");
                RecordOutcome::failed(e.to_string())
            },
        }
    }
}

fn validate(record: &NewAuditRecord) -> Result<(), String> {
    if record.biz_type.trim().is_empty() {
        return Err("missing biz_type".to_string());
    }
    if record.data_id < 0 {
        return Err("negative data_id".to_string());
    }
    if !record.operation_type.is_persistable() {
        return Err(format!(
            "operation type {} must be resolved before recording",
            record.operation_type
        ));
    }
    if record.operation_user.trim().is_empty() {
        return Err("missing operation_user".to_string());
    }
    Ok(())
}

/// Serialize a snapshot to text. Strings pass through, JSON null stays
/// SQL NULL, everything else becomes its JSON text.
fn snapshot_text(snapshot: Option<JsonValue>) -> Option<String> {
    match snapshot? {
        JsonValue::Null => None,
        JsonValue::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// In-memory store for exercising the pipeline without a database.
    #[derive(Default)]
    pub(crate) struct MemoryAuditStore {
        rows: Mutex<Vec<AuditRow>>,
        failing: bool,
    }

    impl MemoryAuditStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// A store whose every insert fails, for failure-isolation tests.
        pub(crate) fn failing() -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
                failing: true,
            }
        }

        pub(crate) fn rows(&self) -> Vec<AuditRow> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuditStore for MemoryAuditStore {
        async fn insert(&self, row: AuditRow) -> ServerResult<()> {
            if self.failing {
                return Err(AppError::Internal("audit store unavailable".to_string()));
            }
            self.rows.lock().unwrap().push(row);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryAuditStore;
    use super::*;
    use crate::audit::models::OperationType;
    use serde_json::json;

    fn record() -> NewAuditRecord {
        NewAuditRecord::builder()
            .biz_type("biz_sound")
            .data_id(42)
            .data_info("Welcome")
            .operation_type(OperationType::Update)
            .data_before(json!({"id": 42, "name": "Welcome"}))
            .data_after(json!({"id": 42, "name": "Welcome v2"}))
            .operation_user("7")
            .build()
    }

    #[tokio::test]
    async fn test_record_success() {
        let store = Arc::new(MemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone());

        let outcome = recorder.record(record()).await;
        assert!(outcome.success);

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].biz_type, "biz_sound");
        assert_eq!(rows[0].operation_type, "UPDATE");
        assert_eq!(
            rows[0].data_after.as_deref(),
            Some(r#"{"id":42,"name":"Welcome v2"}"#)
        );
    }

    #[tokio::test]
    async fn test_save_is_rejected() {
        let store = Arc::new(MemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone());

        let mut unresolved = record();
        unresolved.operation_type = OperationType::Save;

        let outcome = recorder.record(unresolved).await;
        assert!(!outcome.success);
        assert!(outcome.reason.unwrap().contains("SAVE"));
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_missing_actor_is_rejected() {
        let store = Arc::new(MemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone());

        let mut anonymous = record();
        anonymous.operation_user = "  ".to_string();

        let outcome = recorder.record(anonymous).await;
        assert!(!outcome.success);
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_missing_biz_type_is_rejected() {
        let store = Arc::new(MemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone());

        let mut blank = record();
        blank.biz_type = String::new();

        assert!(!recorder.record(blank).await.success);
    }

    #[tokio::test]
    async fn test_storage_failure_is_swallowed() {
        let store = Arc::new(MemoryAuditStore::failing());
        let recorder = AuditRecorder::new(store);

        let outcome = recorder.record(record()).await;
        assert!(!outcome.success);
        assert!(outcome.reason.is_some());
    }

    #[test]
    fn test_snapshot_text_coercions() {
        assert_eq!(snapshot_text(None), None);
        assert_eq!(snapshot_text(Some(json!(null))), None);
        assert_eq!(snapshot_text(Some(json!("already text"))), Some("already text".to_string()));
        assert_eq!(snapshot_text(Some(json!(42))), Some("42".to_string()));
        assert_eq!(
            snapshot_text(Some(json!({"a": 1}))),
            Some(r#"{"a":1}"#.to_string())
        );
    }
}
