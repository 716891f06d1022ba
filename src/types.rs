//! Core types shared by the normalizers and the validator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorEntry;

/// Key written into cycle sentinels, holding the path of the original node.
pub const CIRCULAR_REF_KEY: &str = "_circularRef";

/// Schema extension surfaced verbatim as [`ValidationResult::custom_message`].
pub const VALIDATION_MESSAGE_KEY: &str = "x-validation-message";

/// Path-item keys that name operations.
pub const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Direction of an operation schema.
///
/// Requests drop `readOnly` properties, responses drop `writeOnly` ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    /// Suffix appended to the operation name before it is turned into an identifier.
    pub fn name_suffix(&self) -> &'static str {
        match self {
            Direction::Request => "request-body",
            Direction::Response => "response-body",
        }
    }

    /// Directory name used when emitting artifacts for this direction.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Response => "response",
        }
    }

    /// Property criteria that are hidden in this direction.
    pub fn hidden_criteria(&self) -> Map<String, Value> {
        let key = match self {
            Direction::Request => "readOnly",
            Direction::Response => "writeOnly",
        };
        let mut criteria = Map::new();
        criteria.insert(key.to_string(), Value::Bool(true));
        criteria
    }
}

/// A cycle found and removed by [`crate::resolve_cycles`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularRefInfo {
    /// Path where the already-visited node was met again.
    pub reference: String,
    /// Path where the node was first visited (an ancestor of `reference`).
    pub original: String,
}

impl CircularRefInfo {
    /// The `{ "type": "object", "_circularRef": original }` placeholder.
    pub fn sentinel(&self) -> Value {
        let mut node = Map::new();
        node.insert("type".to_string(), Value::String("object".to_string()));
        node.insert(
            CIRCULAR_REF_KEY.to_string(),
            Value::String(self.original.clone()),
        );
        Value::Object(node)
    }
}

/// Outcome of [`crate::SchemaValidator::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    /// `None` when the instance is valid.
    pub errors: Option<Vec<ErrorEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_message: Option<String>,
}

impl ValidationResult {
    /// Errors as a slice, empty when valid.
    pub fn errors(&self) -> &[ErrorEntry] {
        self.errors.as_deref().unwrap_or(&[])
    }
}
