use thiserror::Error;

/// Errors raised while building core values from untyped JSON.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StateSyncError {
    /// A state or partial update must be a JSON object.
    #[error("expected a JSON object for {what}, found {found}")]
    NotAnObject {
        what: &'static str,
        found: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, StateSyncError>;

pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
