use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::error::RemoteError;

pub type ServerFuture = BoxFuture<'static, Result<JsonResult, RemoteError>>;

/// Transport to the remote resource. A non-2xx response is an error.
pub trait Server: Send + Sync {
    /// `GET url?k=v&...`
    fn get(&self, url: &str, params: &[(String, String)]) -> ServerFuture;

    fn post(&self, url: &str, body: Value) -> ServerFuture;

    fn put(&self, url: &str, body: Value) -> ServerFuture;

    fn delete(&self, url: &str) -> ServerFuture;
}

/// Raw response body, parsed on demand as an object or an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonResult {
    body: String,
}

impl JsonResult {
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn is_object(&self) -> bool {
        self.body.trim_start().starts_with('{')
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.body.trim_start().starts_with('[')
    }

    /// # Errors
    /// [`RemoteError::Payload`] when the body is not valid JSON.
    pub fn as_value(&self) -> Result<Value, RemoteError> {
        serde_json::from_str(&self.body)
            .map_err(|err| RemoteError::Payload(format!("invalid JSON response: {err}")))
    }

    /// # Errors
    /// [`RemoteError::Payload`] when the body is not a JSON object.
    pub fn as_object(&self) -> Result<Map<String, Value>, RemoteError> {
        match self.as_value()? {
            Value::Object(object) => Ok(object),
            other => Err(RemoteError::Payload(format!("expected a JSON object, got {}", kind(&other)))),
        }
    }

    /// # Errors
    /// [`RemoteError::Payload`] when the body is not a JSON array.
    pub fn as_array(&self) -> Result<Vec<Value>, RemoteError> {
        match self.as_value()? {
            Value::Array(items) => Ok(items),
            other => Err(RemoteError::Payload(format!("expected a JSON array, got {}", kind(&other)))),
        }
    }

    /// An array as its elements, an object as a one-element list.
    ///
    /// # Errors
    /// [`RemoteError::Payload`] for any other body.
    pub fn items(&self) -> Result<Vec<Value>, RemoteError> {
        match self.as_value()? {
            Value::Array(items) => Ok(items),
            object @ Value::Object(_) => Ok(vec![object]),
            other => Err(RemoteError::Payload(format!(
                "expected a JSON object or array, got {}",
                kind(&other)
            ))),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
