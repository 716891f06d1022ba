//! Schema compilation and schema-path navigation.
//!
//! Schema paths are JSON Pointers into the root schema as reported by the
//! engine. A `$ref` segment means "continue inside the referenced schema",
//! so navigation resolves local references as it goes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use jsonschema::Validator;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::EngineOptions;
use crate::error::CompileError;
use crate::graph::{escape_pointer, unescape_pointer};
use crate::loader::fragment_target;

/// Limit on chained `$ref` hops and nested combinator expansion.
pub(crate) const MAX_DEPTH: usize = 64;

/// URI the root schema is registered under when compiling branch validators.
const ROOT_URI: &str = "urn:schema-dto:root";

/// Compile a schema with the given engine options.
pub fn compile(schema: &Value, options: &EngineOptions) -> Result<Validator, CompileError> {
    jsonschema::options()
        .with_draft(options.draft.to_engine())
        .should_validate_formats(options.validate_formats)
        .build(schema)
        .map_err(|e| CompileError::InvalidSchema {
            message: e.to_string(),
        })
}

/// The schema value at `path` (`#/...` or `/...`), following `$ref` segments.
pub(crate) fn schema_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim_start_matches('#');
    let mut current = root;
    for part in path.split('/').filter(|p| !p.is_empty()) {
        let key = unescape_pointer(part);
        if key == "$ref" {
            if let Some(reference) = current.get("$ref").and_then(Value::as_str) {
                current = local_ref(root, reference)?;
                continue;
            }
        }
        current = match current {
            Value::Object(map) => map.get(&key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Plain JSON Pointer into `root` for a schema path, with `$ref` segments
/// replaced by the pointer of their target.
pub(crate) fn canonical_pointer(root: &Value, path: &str) -> Option<String> {
    let path = path.trim_start_matches('#');
    let mut current = root;
    let mut pointer = String::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        let key = unescape_pointer(part);
        if key == "$ref" {
            if let Some(reference) = current.get("$ref").and_then(Value::as_str) {
                current = local_ref(root, reference)?;
                pointer = reference.trim_start_matches('#').to_string();
                continue;
            }
        }
        current = match current {
            Value::Object(map) => map.get(&key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
        pointer.push('/');
        pointer.push_str(part);
    }
    Some(pointer)
}

/// Target of a local (`#...`) reference.
pub(crate) fn local_ref<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    if !reference.starts_with('#') {
        return None;
    }
    fragment_target(root, reference)
}

/// Follow a chain of local `$ref`s starting at `schema`.
pub(crate) fn resolve_refs<'a>(root: &'a Value, schema: &'a Value) -> &'a Value {
    let mut current = schema;
    for _ in 0..MAX_DEPTH {
        match current
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| local_ref(root, r))
        {
            Some(target) => current = target,
            None => break,
        }
    }
    current
}

/// Append a pointer segment to a schema path.
pub(crate) fn join(path: &str, segment: &str) -> String {
    format!("{}/{}", path, escape_pointer(segment))
}

/// Last segment of a schema path.
pub(crate) fn last_segment(path: &str) -> String {
    path.rsplit('/').next().map(unescape_pointer).unwrap_or_default()
}

/// Schema path with its last segment removed.
pub(crate) fn parent_path(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

/// Validators for individual combinator branches, compiled on first use.
///
/// Keyed by the branch's schema path (`/oneOf/1`, `/properties/a/$ref/anyOf/0`).
pub(crate) struct BranchValidators {
    root: Arc<Value>,
    options: EngineOptions,
    cache: Mutex<HashMap<String, Option<Arc<Validator>>>>,
}

impl BranchValidators {
    pub(crate) fn new(root: Arc<Value>, options: EngineOptions) -> Self {
        Self {
            root,
            options,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn root(&self) -> &Value {
        &self.root
    }

    /// Validator for the branch at `path`, or `None` if it can't be compiled.
    pub(crate) fn get(&self, path: &str) -> Option<Arc<Validator>> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = cache.get(path) {
            return entry.clone();
        }

        let compiled = canonical_pointer(&self.root, path).and_then(|pointer| {
            match compile_branch(&self.root, &pointer, &self.options) {
                Ok(validator) => Some(Arc::new(validator)),
                Err(e) => {
                    debug!(%path, error = %e, "branch schema did not compile");
                    None
                }
            }
        });
        cache.insert(path.to_string(), compiled.clone());
        compiled
    }

    /// Whether `instance` passes the branch at `path`. Unknown branches never pass.
    pub(crate) fn is_valid(&self, path: &str, instance: &Value) -> bool {
        self.get(path)
            .map(|validator| validator.is_valid(instance))
            .unwrap_or(false)
    }

    /// Number of engine errors `instance` raises against the branch at `path`.
    pub(crate) fn error_count(&self, path: &str, instance: &Value) -> Option<usize> {
        self.get(path)
            .map(|validator| validator.iter_errors(instance).count())
    }
}

/// Compile the subschema at `pointer`, resolving references against the whole root.
fn compile_branch(root: &Value, pointer: &str, options: &EngineOptions) -> Result<Validator, CompileError> {
    let draft = options.draft.to_engine();
    let wrapper = json!({ "$ref": format!("{}#{}", ROOT_URI, encode_fragment(pointer)) });
    jsonschema::options()
        .with_draft(draft)
        .should_validate_formats(options.validate_formats)
        .with_resource(ROOT_URI, draft.create_resource(root.clone()))
        .build(&wrapper)
        .map_err(|e| CompileError::InvalidSchema {
            message: e.to_string(),
        })
}

/// Percent-encode the characters a URI fragment can't carry as is.
fn encode_fragment(pointer: &str) -> String {
    let mut encoded = String::with_capacity(pointer.len());
    for byte in pointer.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => encoded.push(byte as char),
            b'-' | b'.' | b'_' | b'~' | b'/' | b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*'
            | b'+' | b',' | b';' | b'=' | b':' | b'@' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root() -> Value {
        json!({
            "properties": {
                "pet": { "$ref": "#/definitions/Pet" }
            },
            "definitions": {
                "Pet": {
                    "oneOf": [{ "type": "null" }, { "$ref": "#/definitions/Cat" }]
                },
                "Cat": { "properties": { "meow": { "type": "boolean" } } }
            }
        })
    }

    #[test]
    fn schema_at_follows_ref_segments() {
        let root = root();
        assert_eq!(
            schema_at(&root, "#/properties/pet/$ref/oneOf/0/type"),
            Some(&json!("null"))
        );
        assert_eq!(
            schema_at(&root, "/properties/pet/$ref/oneOf/1/$ref/properties/meow/type"),
            Some(&json!("boolean"))
        );
        assert_eq!(schema_at(&root, "#"), Some(&root));
        assert_eq!(schema_at(&root, "/properties/missing"), None);
    }

    #[test]
    fn resolve_refs_follows_chains() {
        let root = json!({
            "definitions": {
                "A": { "$ref": "#/definitions/B" },
                "B": { "type": "string" }
            }
        });
        let start = json!({ "$ref": "#/definitions/A" });
        assert_eq!(resolve_refs(&root, &start), &json!({ "type": "string" }));
    }

    #[test]
    fn path_helpers() {
        assert_eq!(join("/properties", "a/b"), "/properties/a~1b");
        assert_eq!(last_segment("/properties/a~1b"), "a/b");
        assert_eq!(parent_path("/properties/pet/oneOf"), "/properties/pet");
        assert_eq!(parent_path("/oneOf"), "");
    }

    #[test]
    fn branch_validators_resolve_root_definitions() {
        let branches = BranchValidators::new(Arc::new(root()), EngineOptions::default());
        let path = "/properties/pet/$ref/oneOf/1";
        assert!(branches.is_valid(path, &json!({ "meow": true })));
        assert!(!branches.is_valid(path, &json!({ "meow": "loud" })));
        assert!(!branches.is_valid("/nowhere", &json!({})));
    }

    #[test]
    fn branch_refs_resolve_anywhere_in_root() {
        let root = json!({
            "oneOf": [{ "$ref": "#/x-models/Cat" }],
            "x-models": {
                "Cat": { "properties": { "lives": { "$ref": "#/x-models/Lives" } } },
                "Lives": { "type": "integer" }
            }
        });
        let branches = BranchValidators::new(Arc::new(root), EngineOptions::default());
        assert!(branches.is_valid("/oneOf/0", &json!({ "lives": 9 })));
        assert!(!branches.is_valid("/oneOf/0", &json!({ "lives": "nine" })));
        assert_eq!(branches.error_count("/oneOf/0", &json!({ "lives": "nine" })), Some(1));
    }

    #[test]
    fn canonical_pointer_replaces_ref_segments() {
        let root = root();
        assert_eq!(
            canonical_pointer(&root, "/properties/pet/$ref/oneOf/1").as_deref(),
            Some("/definitions/Pet/oneOf/1")
        );
        assert_eq!(canonical_pointer(&root, "/properties/missing"), None);
        assert_eq!(encode_fragment("/properties/a b%"), "/properties/a%20b%25");
    }

    #[test]
    fn compile_rejects_invalid_schema() {
        let result = compile(&json!({ "type": 12 }), &EngineOptions::default());
        assert!(matches!(result, Err(CompileError::InvalidSchema { .. })));
    }
}
