//! Direct recording helpers
//!
//! Handlers that know exactly what changed can report it themselves
//! instead of relying on middleware inference. Same contract either way:
//! every call is fire and forget, and a failed write is a log line, never
//! an error.

use serde_json::Value as JsonValue;
use tracing::warn;

use super::describe::describe_entity;
use super::disambiguate::{positive_int_field, resolve_operation};
use super::models::{NewAuditRecord, OperationType};
use super::recorder::AuditRecorder;

/// Explicit reporting handle; cheap to clone into handler state.
#[derive(Clone)]
pub struct AuditReporter {
    recorder: AuditRecorder,
}

impl AuditReporter {
    pub fn new(recorder: AuditRecorder) -> Self {
        Self { recorder }
    }

    /// Report a created entity.
    pub fn report_add(
        &self,
        biz_type: impl Into<String>,
        entity: &JsonValue,
        user: impl Into<String>,
    ) {
        self.dispatch(NewAuditRecord {
            biz_type: biz_type.into(),
            data_id: positive_int_field(entity, "id").unwrap_or(0),
            data_info: describe_entity(entity, None),
            operation_type: OperationType::Add,
            data_before: None,
            data_after: Some(entity.clone()),
            operation_user: user.into(),
        });
    }

    /// Report an updated entity with optional before snapshot.
    pub fn report_update(
        &self,
        biz_type: impl Into<String>,
        data_id: i64,
        before: Option<&JsonValue>,
        after: &JsonValue,
        user: impl Into<String>,
    ) {
        self.dispatch(NewAuditRecord {
            biz_type: biz_type.into(),
            data_id,
            data_info: describe_entity(after, None),
            operation_type: OperationType::Update,
            data_before: before.cloned(),
            data_after: Some(after.clone()),
            operation_user: user.into(),
        });
    }

    /// Report a deletion; the deleted entity is the before snapshot.
    pub fn report_delete(
        &self,
        biz_type: impl Into<String>,
        deleted: &JsonValue,
        user: impl Into<String>,
    ) {
        self.dispatch(NewAuditRecord {
            biz_type: biz_type.into(),
            data_id: positive_int_field(deleted, "id").unwrap_or(0),
            data_info: describe_entity(deleted, None),
            operation_type: OperationType::Delete,
            data_before: Some(deleted.clone()),
            data_after: None,
            operation_user: user.into(),
        });
    }

    pub fn report_enable(
        &self,
        biz_type: impl Into<String>,
        data_id: i64,
        data_info: impl Into<String>,
        user: impl Into<String>,
    ) {
        self.report_toggle(OperationType::Enable, biz_type, data_id, data_info, user);
    }

    pub fn report_disable(
        &self,
        biz_type: impl Into<String>,
        data_id: i64,
        data_info: impl Into<String>,
        user: impl Into<String>,
    ) {
        self.report_toggle(OperationType::Disable, biz_type, data_id, data_info, user);
    }

    /// Report a save, letting the disambiguator decide ADD vs UPDATE from
    /// the entity payload and before snapshot.
    pub fn report_save(
        &self,
        biz_type: impl Into<String>,
        entity: &JsonValue,
        before: Option<&JsonValue>,
        user: impl Into<String>,
    ) {
        let data_id = positive_int_field(entity, "id").unwrap_or(0);
        let operation_type = resolve_operation(
            OperationType::Save,
            (data_id > 0).then_some(data_id),
            Some(entity),
            None,
            before,
        );
        self.dispatch(NewAuditRecord {
            biz_type: biz_type.into(),
            data_id,
            data_info: describe_entity(entity, None),
            operation_type,
            data_before: before.cloned(),
            data_after: Some(entity.clone()),
            operation_user: user.into(),
        });
    }

    /// Report one of the named custom operations (UPLOAD, GENERATE, ...).
    /// The recorder still rejects non-persistable types.
    pub fn report_custom(
        &self,
        operation_type: OperationType,
        biz_type: impl Into<String>,
        data_id: i64,
        data_info: impl Into<String>,
        user: impl Into<String>,
    ) {
        self.dispatch(NewAuditRecord {
            biz_type: biz_type.into(),
            data_id,
            data_info: data_info.into(),
            operation_type,
            data_before: None,
            data_after: None,
            operation_user: user.into(),
        });
    }

    fn report_toggle(
        &self,
        operation_type: OperationType,
        biz_type: impl Into<String>,
        data_id: i64,
        data_info: impl Into<String>,
        user: impl Into<String>,
    ) {
        self.dispatch(NewAuditRecord {
            biz_type: biz_type.into(),
            data_id,
            data_info: data_info.into(),
            operation_type,
            data_before: None,
            data_after: None,
            operation_user: user.into(),
        });
    }

    fn dispatch(&self, record: NewAuditRecord) {
        let recorder = self.recorder.clone();
        tokio::spawn(async move {
            let outcome = recorder.record(record).await;
            if !outcome.success {
                warn!(reason = ?outcome.reason, "Direct audit report failed");
            }
        });
    }
}
