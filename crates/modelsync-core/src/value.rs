use std::fmt::{Display, Formatter};
use std::str::FromStr;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::TranscribeError;

/// The six primitive kinds a persisted field may have.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Int32,
    Int64,
    Float32,
    Bool,
    String,
    Bytes,
}

impl FieldKind {
    /// Column type used in `CREATE TABLE` and `ALTER TABLE ADD COLUMN`.
    #[must_use]
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Int32 | Self::Int64 | Self::Bool => "integer",
            Self::Float32 => "float",
            Self::String => "text",
            Self::Bytes => "blob",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }

    /// Value a freshly constructed model holds for a field of this kind.
    #[must_use]
    pub fn default_value(self) -> FieldValue {
        match self {
            Self::Int32 => FieldValue::Int32(0),
            Self::Int64 => FieldValue::Int64(0),
            Self::Float32 => FieldValue::Float32(0.0),
            Self::Bool => FieldValue::Bool(false),
            Self::String => FieldValue::Text(None),
            Self::Bytes => FieldValue::Bytes(None),
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value as the relational store holds it, one variant per SQLite storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl StoredValue {
    #[must_use]
    pub fn storage_class(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

/// An in-memory field value. `Text(None)` and `Bytes(None)` are the unset
/// state: NULL in a row, absent from JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Bool(bool),
    Text(Option<String>),
    Bytes(Option<Vec<u8>>),
}

impl FieldValue {
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Int32(_) => FieldKind::Int32,
            Self::Int64(_) => FieldKind::Int64,
            Self::Float32(_) => FieldKind::Float32,
            Self::Bool(_) => FieldKind::Bool,
            Self::Text(_) => FieldKind::String,
            Self::Bytes(_) => FieldKind::Bytes,
        }
    }

    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Text(None) | Self::Bytes(None))
    }

    /// # Errors
    /// Returns [`TranscribeError::KindMismatch`] when the value is not an `Int32`.
    pub fn into_i32(self, field: &str) -> Result<i32, TranscribeError> {
        match self {
            Self::Int32(value) => Ok(value),
            other => Err(other.mismatch(field, FieldKind::Int32)),
        }
    }

    /// # Errors
    /// Returns [`TranscribeError::KindMismatch`] when the value is not an `Int64`.
    pub fn into_i64(self, field: &str) -> Result<i64, TranscribeError> {
        match self {
            Self::Int64(value) => Ok(value),
            other => Err(other.mismatch(field, FieldKind::Int64)),
        }
    }

    /// # Errors
    /// Returns [`TranscribeError::KindMismatch`] when the value is not a `Float32`.
    pub fn into_f32(self, field: &str) -> Result<f32, TranscribeError> {
        match self {
            Self::Float32(value) => Ok(value),
            other => Err(other.mismatch(field, FieldKind::Float32)),
        }
    }

    /// # Errors
    /// Returns [`TranscribeError::KindMismatch`] when the value is not a `Bool`.
    pub fn into_bool(self, field: &str) -> Result<bool, TranscribeError> {
        match self {
            Self::Bool(value) => Ok(value),
            other => Err(other.mismatch(field, FieldKind::Bool)),
        }
    }

    /// # Errors
    /// Returns [`TranscribeError::KindMismatch`] when the value is not `Text`.
    pub fn into_text(self, field: &str) -> Result<Option<String>, TranscribeError> {
        match self {
            Self::Text(value) => Ok(value),
            other => Err(other.mismatch(field, FieldKind::String)),
        }
    }

    /// # Errors
    /// Returns [`TranscribeError::KindMismatch`] when the value is not `Bytes`.
    pub fn into_bytes(self, field: &str) -> Result<Option<Vec<u8>>, TranscribeError> {
        match self {
            Self::Bytes(value) => Ok(value),
            other => Err(other.mismatch(field, FieldKind::Bytes)),
        }
    }

    fn mismatch(&self, field: &str, expected: FieldKind) -> TranscribeError {
        TranscribeError::KindMismatch { field: field.to_string(), expected, found: self.kind() }
    }

    #[must_use]
    pub fn to_stored(&self) -> StoredValue {
        match self {
            Self::Int32(value) => StoredValue::Integer(i64::from(*value)),
            Self::Int64(value) => StoredValue::Integer(*value),
            Self::Float32(value) => StoredValue::Real(f64::from(*value)),
            Self::Bool(value) => StoredValue::Integer(i64::from(*value)),
            Self::Text(Some(value)) => StoredValue::Text(value.clone()),
            Self::Bytes(Some(value)) => StoredValue::Blob(value.clone()),
            Self::Text(None) | Self::Bytes(None) => StoredValue::Null,
        }
    }

    /// Read a stored column back as `kind`. NULL reads as the kind's default,
    /// which is what columns added by a migration hold for older rows.
    ///
    /// # Errors
    /// Returns [`TranscribeError::RowShape`] when the storage class cannot
    /// represent `kind` or an integer overflows an `Int32` field.
    pub fn from_stored(
        kind: FieldKind,
        column: &str,
        stored: &StoredValue,
    ) -> Result<Self, TranscribeError> {
        match (kind, stored) {
            (_, StoredValue::Null) => Ok(kind.default_value()),
            (FieldKind::Int32, StoredValue::Integer(value)) => {
                i32::try_from(*value).map(Self::Int32).map_err(|_| {
                    TranscribeError::row_shape(column, format!("{value} does not fit in int32"))
                })
            }
            (FieldKind::Int64, StoredValue::Integer(value)) => Ok(Self::Int64(*value)),
            (FieldKind::Float32, StoredValue::Real(value)) => Ok(Self::Float32(narrow(*value))),
            (FieldKind::Float32, StoredValue::Integer(value)) => {
                Ok(Self::Float32(integer_to_f32(*value)))
            }
            (FieldKind::Bool, StoredValue::Integer(value)) => Ok(Self::Bool(*value == 1)),
            (FieldKind::String, StoredValue::Text(value)) => Ok(Self::Text(Some(value.clone()))),
            (FieldKind::String, StoredValue::Integer(value)) => {
                Ok(Self::Text(Some(value.to_string())))
            }
            (FieldKind::String, StoredValue::Real(value)) => {
                Ok(Self::Text(Some(value.to_string())))
            }
            (FieldKind::Bytes, StoredValue::Blob(value)) => Ok(Self::Bytes(Some(value.clone()))),
            (FieldKind::Bytes, StoredValue::Text(value)) => {
                Ok(Self::Bytes(Some(value.clone().into_bytes())))
            }
            (kind, other) => Err(TranscribeError::row_shape(
                column,
                format!("cannot read {} storage as {kind}", other.storage_class()),
            )),
        }
    }

    /// JSON rendering; `None` means the field is left out of the object.
    ///
    /// # Errors
    /// Returns [`TranscribeError::Payload`] for floats JSON cannot carry (NaN, infinities).
    pub fn to_json(&self, field: &str) -> Result<Option<Value>, TranscribeError> {
        let value = match self {
            Self::Int32(value) => Some(Value::from(*value)),
            Self::Int64(value) => Some(Value::from(*value)),
            Self::Float32(value) => {
                let number = Number::from_f64(f64::from(*value)).ok_or_else(|| {
                    TranscribeError::payload(field, format!("{value} is not representable in JSON"))
                })?;
                Some(Value::Number(number))
            }
            Self::Bool(value) => Some(Value::Bool(*value)),
            Self::Text(value) => value.clone().map(Value::String),
            Self::Bytes(value) => value.as_deref().map(|bytes| Value::String(encode_base64(bytes))),
        };
        Ok(value)
    }

    /// Read a non-null JSON value as `kind`. Numeric strings and
    /// `"true"`/`"false"` strings are accepted for numeric and bool fields.
    ///
    /// # Errors
    /// Returns [`TranscribeError::Payload`] on a type mismatch or bad base64.
    pub fn from_json(kind: FieldKind, field: &str, value: &Value) -> Result<Self, TranscribeError> {
        let mismatch =
            || TranscribeError::payload(field, format!("expected {kind}, got {}", json_type(value)));

        match kind {
            FieldKind::Int32 => {
                let wide = json_i64(value).ok_or_else(mismatch)?;
                i32::try_from(wide).map(Self::Int32).map_err(|_| {
                    TranscribeError::payload(field, format!("{wide} does not fit in int32"))
                })
            }
            FieldKind::Int64 => json_i64(value).map(Self::Int64).ok_or_else(mismatch),
            FieldKind::Float32 => {
                json_f64(value).map(|wide| Self::Float32(narrow(wide))).ok_or_else(mismatch)
            }
            FieldKind::Bool => json_bool(value).map(Self::Bool).ok_or_else(mismatch),
            FieldKind::String => match value {
                Value::String(text) => Ok(Self::Text(Some(text.clone()))),
                Value::Number(number) => Ok(Self::Text(Some(number.to_string()))),
                Value::Bool(flag) => Ok(Self::Text(Some(flag.to_string()))),
                _ => Err(mismatch()),
            },
            FieldKind::Bytes => match value {
                Value::String(text) => decode_base64(text)
                    .map(|bytes| Self::Bytes(Some(bytes)))
                    .map_err(|err| TranscribeError::payload(field, format!("invalid base64: {err}"))),
                _ => Err(mismatch()),
            },
        }
    }

    /// The unformatted text form used for query strings and parameter inflation.
    #[must_use]
    pub fn wire_string(&self) -> String {
        match self {
            Self::Int32(value) => value.to_string(),
            Self::Int64(value) => value.to_string(),
            Self::Float32(value) => value.to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Text(value) => value.clone().unwrap_or_default(),
            Self::Bytes(value) => value.as_deref().map(encode_base64).unwrap_or_default(),
        }
    }

    /// SQL-literal form, used only for debug rendering of predicates.
    #[must_use]
    pub fn sql_literal(&self) -> String {
        match self {
            Self::Text(Some(value)) => format!("'{value}'"),
            Self::Text(None) | Self::Bytes(None) => "NULL".to_string(),
            Self::Bool(value) => if *value { "1" } else { "0" }.to_string(),
            other => other.wire_string(),
        }
    }

    /// Convert a predicate value into a field of `kind`. Values of the right
    /// kind pass through; anything else goes through its unformatted text.
    ///
    /// # Errors
    /// Returns [`TranscribeError::InvalidParam`] when the text does not parse as `kind`.
    pub fn from_param(kind: FieldKind, field: &str, value: &Self) -> Result<Self, TranscribeError> {
        if value.kind() == kind {
            return Ok(value.clone());
        }

        match kind {
            FieldKind::Int32 => parse_number::<i32>(field, value).map(Self::Int32),
            FieldKind::Int64 => parse_number::<i64>(field, value).map(Self::Int64),
            FieldKind::Float32 => parse_number::<f32>(field, value).map(Self::Float32),
            FieldKind::Bool => Ok(Self::Bool(value.wire_string().eq_ignore_ascii_case("true"))),
            FieldKind::String => {
                Ok(Self::Text(if value.is_unset() { None } else { Some(value.wire_string()) }))
            }
            FieldKind::Bytes => {
                if value.is_unset() {
                    return Ok(Self::Bytes(None));
                }
                decode_base64(&value.wire_string())
                    .map(|bytes| Self::Bytes(Some(bytes)))
                    .map_err(|err| TranscribeError::invalid_param(field, format!("invalid base64: {err}")))
            }
        }
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::Float32(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(Some(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(Some(value))
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Some(value))
    }
}

impl From<&[u8]> for FieldValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(Some(value.to_vec()))
    }
}

impl From<Option<Vec<u8>>> for FieldValue {
    fn from(value: Option<Vec<u8>>) -> Self {
        Self::Bytes(value)
    }
}

pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Line-wrapped base64 (as some servers emit) is accepted.
pub(crate) fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    general_purpose::STANDARD.decode(compact)
}

fn parse_number<T>(field: &str, value: &FieldValue) -> Result<T, TranscribeError>
where
    T: FromStr,
    T::Err: Display,
{
    let text = match value {
        FieldValue::Bool(flag) => if *flag { "1" } else { "0" }.to_string(),
        other => other.wire_string(),
    };
    text.trim()
        .parse::<T>()
        .map_err(|err| TranscribeError::invalid_param(field, format!("`{text}`: {err}")))
}

#[allow(clippy::cast_possible_truncation)]
fn narrow(value: f64) -> f32 {
    value as f32
}

#[allow(clippy::cast_precision_loss)]
fn integer_to_f32(value: i64) -> f32 {
    value as f32
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn truncate_to_i64(value: f64) -> Option<i64> {
    if value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Some(value.trunc() as i64)
    } else {
        None
    }
}

fn json_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => {
            number.as_i64().or_else(|| number.as_f64().and_then(truncate_to_i64))
        }
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(truncate_to_i64))
        }
        _ => None,
    }
}

fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|parsed| parsed.is_finite()),
        _ => None,
    }
}

fn json_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) if text.eq_ignore_ascii_case("true") => Some(true),
        Value::String(text) if text.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
