use crate::value::FieldKind;

/// Raised while building a [`crate::ModelSchema`]; a model type that fails
/// here cannot be used at all.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum SchemaError {
    #[error("invalid table name `{0}`")]
    InvalidTableName(String),
    #[error("invalid column name `{0}`")]
    InvalidColumnName(String),
    #[error("invalid database name `{0}`")]
    InvalidDatabaseName(String),
    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),
    #[error("schema version must be at least 1")]
    InvalidVersion,
    #[error("field `{column}` is tagged with version {version}, outside 1..={schema_version}")]
    InvalidFieldVersion { column: String, version: u32, schema_version: u32 },
    #[error("identity column `_id` must be int64, found {0}")]
    InvalidIdentityKind(FieldKind),
    #[error("identity column `_id` cannot be unique or version-tagged")]
    InvalidIdentityAttributes,
}

/// Malformed external data met while inflating or projecting a model.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum TranscribeError {
    #[error("row is missing or has an unreadable column `{column}`: {reason}")]
    RowShape { column: String, reason: String },
    #[error("payload field `{field}` is invalid: {reason}")]
    Payload { field: String, reason: String },
    #[error("model `{model}` has no field `{field}`")]
    UnknownField { model: String, field: String },
    #[error("parameter `{field}` cannot be used as a value: {reason}")]
    InvalidParam { field: String, reason: String },
    #[error("field `{field}` expects {expected}, got {found}")]
    KindMismatch { field: String, expected: FieldKind, found: FieldKind },    #[error("model returned no value for declared field `{field}`")]
    MissingAccessor { field: String },
}

impl TranscribeError {
    pub(crate) fn row_shape(column: &str, reason: impl Into<String>) -> Self {
        Self::RowShape { column: column.to_string(), reason: reason.into() }
    }

    pub(crate) fn payload(field: &str, reason: impl Into<String>) -> Self {
        Self::Payload { field: field.to_string(), reason: reason.into() }
    }

    pub(crate) fn invalid_param(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParam { field: field.to_string(), reason: reason.into() }
    }
}
