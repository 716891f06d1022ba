//! Per-operation request and response schemas from an OpenAPI document.
//!
//! Works on a dereferenced document. Both OpenAPI 3.x (`requestBody`,
//! `content`) and Swagger 2.0 (`in: body` parameters, response `schema`)
//! shapes are recognized.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::identifier::make_code_identifier;
use crate::types::{Direction, HTTP_METHODS};
use crate::visibility::filter_properties;

/// Schemas keyed by generated identifier, in document order.
pub type OperationSchemas = IndexMap<String, Value>;

/// Response codes checked for a response body, in priority order.
const SUCCESS_CODES: &[&str] = &["200", "201"];

/// Request body schemas, with `readOnly` properties removed.
pub fn extract_request_schemas(document: &Value) -> OperationSchemas {
    extract(document, Direction::Request)
}

/// Response body schemas for 200/201, with `writeOnly` properties removed.
pub fn extract_response_schemas(document: &Value) -> OperationSchemas {
    extract(document, Direction::Response)
}

/// Identifier for an operation: `operationId`, else `method-path`, plus the direction suffix.
pub fn operation_name(operation: &Value, method: &str, path: &str, direction: Direction) -> String {
    let base = operation
        .get("operationId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}", method, path));

    make_code_identifier(&format!("{}-{}", base, direction.name_suffix()))
}

/// True for `application/json` and `+json` media types, ignoring parameters.
pub fn is_json_media_type(media_type: &str) -> bool {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

// --- Internal implementation ---

fn extract(document: &Value, direction: Direction) -> OperationSchemas {
    let mut schemas = OperationSchemas::new();
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return schemas;
    };
    let criteria = direction.hidden_criteria();

    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        for (method, operation) in item {
            if !HTTP_METHODS.contains(&method.to_ascii_lowercase().as_str()) {
                continue;
            }
            let schema = match direction {
                Direction::Request => request_body_schema(operation),
                Direction::Response => response_body_schema(operation),
            };
            let Some(schema) = schema else {
                debug!(%method, %path, ?direction, "no JSON body schema, skipping");
                continue;
            };

            let name = operation_name(operation, method, path, direction);
            let filtered = filter_properties(schema, &criteria);
            if schemas.insert(name.clone(), filtered).is_some() {
                warn!(%name, %method, %path, "duplicate operation schema name, keeping the later one");
            }
        }
    }

    schemas
}

fn request_body_schema(operation: &Value) -> Option<&Value> {
    if let Some(content) = operation.get("requestBody").and_then(|b| b.get("content")) {
        return json_content_schema(content);
    }
    operation
        .get("parameters")?
        .as_array()?
        .iter()
        .find(|p| p.get("in").and_then(Value::as_str) == Some("body"))
        .and_then(|p| p.get("schema"))
}

fn response_body_schema(operation: &Value) -> Option<&Value> {
    let responses = operation.get("responses")?;
    SUCCESS_CODES.iter().find_map(|code| {
        let response = responses.get(*code)?;
        match response.get("content") {
            Some(content) => json_content_schema(content),
            None => response.get("schema"),
        }
    })
}

fn json_content_schema(content: &Value) -> Option<&Value> {
    content
        .as_object()?
        .iter()
        .find(|(media_type, _)| is_json_media_type(media_type))
        .and_then(|(_, media)| media.get("schema"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "openapi": "3.0.3",
            "paths": {
                "/test": {
                    "parameters": [],
                    "put": {
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "id": { "type": "string", "readOnly": true },
                                            "secret": { "type": "string", "writeOnly": true }
                                        }
                                    }
                                }
                            }
                        },
                        "responses": {
                            "201": {
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "object",
                                            "properties": {
                                                "id": { "type": "string", "readOnly": true },
                                                "secret": { "type": "string", "writeOnly": true }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "operationId": "my-test-operation",
                        "requestBody": {
                            "content": {
                                "text/plain": { "schema": { "type": "string" } },
                                "application/json; charset=utf-8": { "schema": { "type": "object" } }
                            }
                        },
                        "responses": { "204": { "description": "nothing" } }
                    }
                }
            }
        })
    }

    #[test]
    fn names_from_operation_id_and_method_path() {
        let requests = extract_request_schemas(&document());
        let names: Vec<&str> = requests.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["PutTestRequestBody", "MyTestOperationRequestBody"]);
    }

    #[test]
    fn request_drops_read_only() {
        let requests = extract_request_schemas(&document());
        let props = &requests["PutTestRequestBody"]["properties"];
        assert!(props.get("id").is_none());
        assert!(props.get("secret").is_some());
    }

    #[test]
    fn response_drops_write_only_and_skips_missing() {
        let responses = extract_response_schemas(&document());
        assert_eq!(responses.len(), 1);
        let props = &responses["PutTestResponseBody"]["properties"];
        assert!(props.get("id").is_some());
        assert!(props.get("secret").is_none());
    }

    #[test]
    fn response_prefers_200_over_201() {
        let doc = json!({
            "paths": { "/a": { "get": { "responses": {
                "201": { "content": { "application/json": { "schema": { "title": "created" } } } },
                "200": { "content": { "application/json": { "schema": { "title": "ok" } } } }
            } } } }
        });
        let responses = extract_response_schemas(&doc);
        assert_eq!(responses["GetAResponseBody"]["title"], "ok");
    }

    #[test]
    fn swagger_two_shapes() {
        let doc = json!({
            "swagger": "2.0",
            "paths": { "/pets": { "post": {
                "operationId": "addPet",
                "parameters": [
                    { "in": "query", "name": "dry" },
                    { "in": "body", "name": "body", "schema": { "title": "Pet" } }
                ],
                "responses": { "200": { "schema": { "title": "Pet" } } }
            } } }
        });
        assert_eq!(extract_request_schemas(&doc)["AddPetRequestBody"]["title"], "Pet");
        assert_eq!(extract_response_schemas(&doc)["AddPetResponseBody"]["title"], "Pet");
    }

    #[test]
    fn no_paths_yields_nothing() {
        assert!(extract_request_schemas(&json!({ "openapi": "3.0.0" })).is_empty());
    }

    #[test]
    fn json_media_types() {
        assert!(is_json_media_type("application/json"));
        assert!(is_json_media_type("application/merge-patch+json"));
        assert!(is_json_media_type("Application/JSON; charset=utf-8"));
        assert!(!is_json_media_type("text/plain"));
    }
}
