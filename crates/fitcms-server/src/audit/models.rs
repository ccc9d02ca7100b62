//! Audit data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Kind of mutation an audit record describes.
///
/// `Save` is a classification placeholder: path grammars expose a generic
/// "save" action serving both create and update, and the disambiguator
/// resolves it to `Add` or `Update` before anything is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Save,
    Add,
    Update,
    Delete,
    Enable,
    Disable,
    Upload,
    Generate,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Save => "SAVE",
            Self::Add => "ADD",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Enable => "ENABLE",
            Self::Disable => "DISABLE",
            Self::Upload => "UPLOAD",
            Self::Generate => "GENERATE",
        }
    }

    /// Whether this operation type may reach the store. `SAVE` may not.
    pub fn is_persistable(&self) -> bool {
        !matches!(self, Self::Save)
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the path classifier derived from (method, path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Domain tag for the affected resource, e.g. "biz_sound"
    pub biz_type: String,
    /// Mutation kind, possibly the transient `Save`
    pub operation_type: OperationType,
    /// Primary key, set only when the path itself encoded a numeric id
    pub data_id: Option<i64>,
}

/// Audit record as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditRecord {
    pub id: i64,
    /// Domain tag for the affected resource
    pub biz_type: String,
    /// Primary key of the affected record, 0 when unknown
    pub data_id: i64,
    /// Human-readable summary of the affected entity
    pub data_info: String,
    /// Mutation kind
    pub operation_type: String,
    /// Serialized snapshot before the mutation
    pub data_before: Option<String>,
    /// Serialized snapshot after the mutation
    pub data_after: Option<String>,
    /// Who performed the mutation
    pub operation_user: String,
    /// When the mutation occurred
    pub operation_time: DateTime<Utc>,
}

/// Input for recording one audit entry
///
/// Snapshots stay as JSON values until the recorder serializes them.
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub biz_type: String,
    pub data_id: i64,
    pub data_info: String,
    pub operation_type: OperationType,
    pub data_before: Option<JsonValue>,
    pub data_after: Option<JsonValue>,
    pub operation_user: String,
}

impl NewAuditRecord {
    /// Create a builder for constructing audit records
    pub fn builder() -> NewAuditRecordBuilder {
        NewAuditRecordBuilder::default()
    }
}

/// Builder for creating audit records
#[derive(Debug, Clone, Default)]
pub struct NewAuditRecordBuilder {
    biz_type: Option<String>,
    data_id: i64,
    data_info: Option<String>,
    operation_type: Option<OperationType>,
    data_before: Option<JsonValue>,
    data_after: Option<JsonValue>,
    operation_user: Option<String>,
}

impl NewAuditRecordBuilder {
    pub fn biz_type(mut self, biz_type: impl Into<String>) -> Self {
        self.biz_type = Some(biz_type.into());
        self
    }

    pub fn data_id(mut self, data_id: i64) -> Self {
        self.data_id = data_id;
        self
    }

    pub fn data_info(mut self, data_info: impl Into<String>) -> Self {
        self.data_info = Some(data_info.into());
        self
    }

    pub fn operation_type(mut self, operation_type: OperationType) -> Self {
        self.operation_type = Some(operation_type);
        self
    }

    pub fn data_before(mut self, snapshot: JsonValue) -> Self {
        self.data_before = Some(snapshot);
        self
    }

    pub fn data_after(mut self, snapshot: JsonValue) -> Self {
        self.data_after = Some(snapshot);
        self
    }

    pub fn operation_user(mut self, user: impl Into<String>) -> Self {
        self.operation_user = Some(user.into());
        self
    }

    /// Build the NewAuditRecord
    ///
    /// # Panics
    /// Panics if biz_type, operation_type or operation_user are not set.
    /// Use `try_build()` for fallible construction.
    pub fn build(self) -> NewAuditRecord {
        self.try_build()
            .expect("NewAuditRecordBuilder: biz_type, operation_type and operation_user are required")
    }

    /// Try to build the NewAuditRecord, returning an error if required fields are missing
    pub fn try_build(self) -> Result<NewAuditRecord, &'static str> {
        let biz_type = self.biz_type.ok_or("biz_type is required")?;
        let operation_type = self.operation_type.ok_or("operation_type is required")?;
        let operation_user = self.operation_user.ok_or("operation_user is required")?;

        Ok(NewAuditRecord {
            biz_type,
            data_id: self.data_id,
            data_info: self.data_info.unwrap_or_default(),
            operation_type,
            data_before: self.data_before,
            data_after: self.data_after,
            operation_user,
        })
    }
}
