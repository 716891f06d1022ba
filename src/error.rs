//! Error types for document loading, normalization, and validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors while loading or dereferencing a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    /// Content is neither JSON nor YAML. The message always starts with
    /// [`crate::loader::FORMAT_ERROR_PREFIX`].
    #[error("file format must be one of json|yaml")]
    UnsupportedFormat,

    #[error("fragment not found: {fragment}")]
    FragmentNotFound { fragment: String },

    #[error("unresolved reference {reference}: {message}")]
    UnresolvedReference { reference: String, message: String },
}

impl DocumentError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            DocumentError::FileNotFound { .. } | DocumentError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            DocumentError::NetworkError { .. } => 3,
            _ => 2,
        }
    }

    /// True when the input could not be parsed as JSON or YAML at all.
    pub fn is_format_error(&self) -> bool {
        matches!(self, DocumentError::UnsupportedFormat)
    }
}

/// A cycle was reached while materializing a schema graph into a tree.
#[derive(Debug, Error)]
#[error("found circular reference at {path}; circular references cannot be validated, remove them to replace each cycle with a generic object schema")]
pub struct CircularReferenceError {
    /// Root-to-node path where the cycle closes.
    pub path: String,
}

/// Errors while compiling a schema into a validator.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
}

/// Single validation error with schema and instance context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    /// JSON Pointer (RFC 6901) to the invalid value.
    pub instance_path: String,
    /// `#`-prefixed JSON Pointer to the failing keyword.
    pub schema_path: String,
    /// The keyword that failed (`type`, `required`, `oneOf`, ...).
    pub keyword: String,
    /// Human-readable error message.
    pub message: String,
    /// Keyword-specific details.
    pub params: Value,
}

impl std::fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.schema_path, self.message)
    }
}

/// Raised by strict sanitization when the object is still invalid after
/// additional properties were removed.
#[derive(Debug, Clone, Error)]
#[error("object is invalid after removing additional properties ({} error(s))", validation_errors.len())]
pub struct RemoveAdditionalPropsError {
    pub validation_errors: Vec<ErrorEntry>,
    /// Copy of the schema the object was checked against.
    pub schema: Value,
}

/// Errors during `scrub`.
#[derive(Debug, Error)]
pub enum ScrubError {
    #[error("cannot serialize input: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    RemoveAdditional(#[from] RemoveAdditionalPropsError),
}

/// Errors while writing a generated artifact.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that stop generation for a whole document.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Circular(#[from] CircularReferenceError),

    #[error("no schemas found at JSON path '{path}'")]
    NoSchemas { path: String },

    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl GenerateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            GenerateError::Document(e) => e.exit_code(),
            GenerateError::Emit(_) => 3,
            GenerateError::NoSchemas { .. } => 1,
            GenerateError::Circular(_) => 2,
        }
    }
}
