//! Document loading from various sources.
//!
//! Handles loading OpenAPI and JSON Schema documents from files, strings,
//! and HTTP URLs. Content is parsed as JSON first, then as YAML.

use std::path::Path;

use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::DocumentError;
use crate::graph::unescape_pointer;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Start of the message carried by [`DocumentError::UnsupportedFormat`].
pub const FORMAT_ERROR_PREFIX: &str = "file format must be one of";

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a document from a file path.
///
/// # Errors
///
/// Returns `DocumentError::FileNotFound` if the file doesn't exist,
/// or `DocumentError::UnsupportedFormat` if it is neither JSON nor YAML.
pub fn load_document(path: &Path) -> Result<Value, DocumentError> {
    let content = read_file(path)?;
    parse_document(&content)
}

fn read_file(path: &Path) -> Result<String, DocumentError> {
    if !path.exists() {
        return Err(DocumentError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|source| DocumentError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse document text as JSON, falling back to YAML.
///
/// Only objects and arrays are accepted as documents.
///
/// # Errors
///
/// Returns `DocumentError::UnsupportedFormat` if neither parser produces one.
pub fn parse_document(content: &str) -> Result<Value, DocumentError> {
    match parse_value(content) {
        Some(value) if value.is_object() || value.is_array() => Ok(value),
        _ => Err(DocumentError::UnsupportedFormat),
    }
}

/// Load an instance to validate from a file path.
///
/// Unlike [`load_document`], any JSON or YAML value is accepted, scalars and
/// `null` included.
pub fn load_payload(path: &Path) -> Result<Value, DocumentError> {
    let content = read_file(path)?;
    parse_payload(&content)
}

/// Parse instance text as JSON, falling back to YAML. Any value is accepted.
pub fn parse_payload(content: &str) -> Result<Value, DocumentError> {
    parse_value(content).ok_or(DocumentError::UnsupportedFormat)
}

fn parse_value(content: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        return Some(value);
    }
    let yaml = serde_yaml::from_str::<serde_yaml::Value>(content).ok()?;
    debug!("parsed content as YAML");
    yaml_to_json(yaml)
}

/// Load a document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `DocumentError::NetworkError` if the request fails,
/// or `DocumentError::UnsupportedFormat` if the body can't be parsed.
#[cfg(feature = "remote")]
pub fn load_document_url(url: &str) -> Result<Value, DocumentError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| DocumentError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .map_err(|source| DocumentError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    // Check for HTTP errors before parsing
    let response = response
        .error_for_status()
        .map_err(|source| DocumentError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let body = response
        .text()
        .map_err(|source| DocumentError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    parse_document(&body)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a document from a file path or URL.
///
/// URL loading requires the `remote` feature.
pub fn load_document_auto(source: &str) -> Result<Value, DocumentError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_document_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(DocumentError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_document(Path::new(source))
    }
}

/// Navigate a JSON Pointer fragment (e.g., "#/definitions/Pet").
///
/// Returns a copy of the value at the given path.
pub fn navigate_fragment(document: &Value, fragment: &str) -> Result<Value, DocumentError> {
    fragment_target(document, fragment)
        .cloned()
        .ok_or_else(|| DocumentError::FragmentNotFound {
            fragment: fragment.to_string(),
        })
}

/// Borrowing form of [`navigate_fragment`].
pub(crate) fn fragment_target<'a>(document: &'a Value, fragment: &str) -> Option<&'a Value> {
    let path = fragment.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Some(document);
    }

    let mut current = document;
    for part in path.split('/') {
        let key = unescape_pointer(part);
        current = match current {
            Value::Object(map) => map.get(&key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Convert YAML into JSON, stringifying scalar mapping keys such as `200:`.
fn yaml_to_json(value: serde_yaml::Value) -> Option<Value> {
    use serde_yaml::Value as Yaml;

    Some(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                Number::from_f64(n.as_f64()?).map(Value::Number)?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => {
            Value::Array(items.into_iter().filter_map(yaml_to_json).collect())
        }
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    _ => continue,
                };
                if let Some(value) = yaml_to_json(value) {
                    map.insert(key, value);
                }
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}
