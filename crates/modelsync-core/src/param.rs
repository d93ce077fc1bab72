use std::fmt::{Display, Formatter};

use serde_json::Value;

use crate::error::TranscribeError;
use crate::value::{FieldValue, StoredValue};

/// An equality predicate `key = value`, reused as a query-string pair and a
/// seed value when inflating a model from predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    key: String,
    value: FieldValue,
    primary: bool,
}

impl Param {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self { key: key.into(), value: value.into(), primary: false }
    }

    /// A predicate on the remote resource's primary key. Remote lookups
    /// address it as `{url}/{value}` instead of a query-string pair.
    #[must_use]
    pub fn primary(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self { key: key.into(), value: value.into(), primary: true }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    #[must_use]
    pub fn literal(&self) -> String {
        self.value.sql_literal()
    }

    #[must_use]
    pub fn sql_argument(&self) -> StoredValue {
        self.value.to_stored()
    }

    #[must_use]
    pub fn wire_value(&self) -> String {
        self.value.wire_string()
    }

    #[must_use]
    pub fn form_field(&self) -> (String, String) {
        (self.key.clone(), self.wire_value())
    }

    /// # Errors
    /// Returns [`TranscribeError::Payload`] for non-finite floats.
    pub fn json_value(&self) -> Result<Value, TranscribeError> {
        Ok(self.value.to_json(&self.key)?.unwrap_or(Value::Null))
    }

    /// `key = ?`
    #[must_use]
    pub fn sql_fragment(&self) -> String {
        format!("{} = ?", self.key)
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.key, self.literal())
    }
}

/// Placeholder WHERE body, `a = ? AND b = ?`; empty for no params.
#[must_use]
pub fn where_clause(params: &[Param]) -> String {
    params.iter().map(Param::sql_fragment).collect::<Vec<_>>().join(" AND ")
}

/// WHERE body with literals inlined, for logs only.
#[must_use]
pub fn debug_clause(params: &[Param]) -> String {
    params
        .iter()
        .map(|param| format!("{} = {}", param.key, param.literal()))
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[must_use]
pub fn sql_arguments(params: &[Param]) -> Vec<StoredValue> {
    params.iter().map(Param::sql_argument).collect()
}
