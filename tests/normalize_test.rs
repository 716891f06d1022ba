//! Integration tests for schema normalization.

use schema_dto::{
    extract_request_schemas, extract_response_schemas, filter_properties, replace_nullables,
    resolve_cycles, CircularRefInfo, Direction, SchemaGraph,
};
use serde_json::{json, Value};

fn info(original: &str, reference: &str) -> CircularRefInfo {
    CircularRefInfo {
        original: original.into(),
        reference: reference.into(),
    }
}

fn sentinel(original: &str) -> Value {
    json!({ "type": "object", "_circularRef": original })
}

// === Cycle Resolution Tests ===

mod cycles {
    use super::*;

    #[test]
    fn acyclic_tree_is_unchanged() {
        let value = json!({
            "type": "object",
            "properties": {
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        });
        let mut graph = SchemaGraph::from_value(&value);
        let root = graph.root();

        assert!(resolve_cycles(&mut graph, root).is_empty());
        assert_eq!(graph.to_value(root).unwrap(), value);
    }

    #[test]
    fn independent_sibling_cycles() {
        let mut graph = SchemaGraph::from_value(&json!({ "a": 1, "ref1": { "b": 2 }, "ref2": { "c": 3 } }));
        let root = graph.root();
        let ref1 = graph.child(root, "ref1").unwrap();
        let ref2 = graph.child(root, "ref2").unwrap();
        graph.link(ref1, "x", ref1);
        graph.link(ref2, "x", ref2);

        let found = resolve_cycles(&mut graph, root);

        assert_eq!(
            found,
            vec![info("./ref1", "./ref1/x"), info("./ref2", "./ref2/x")]
        );
        assert_eq!(
            graph.to_value(root).unwrap(),
            json!({
                "a": 1,
                "ref1": { "b": 2, "x": sentinel("./ref1") },
                "ref2": { "c": 3, "x": sentinel("./ref2") }
            })
        );
    }

    #[test]
    fn cross_referencing_cycle_is_recorded_once() {
        let mut graph = SchemaGraph::from_value(&json!({ "a": 1, "ref1": { "b": 2 }, "ref2": { "c": 3 } }));
        let root = graph.root();
        let ref1 = graph.child(root, "ref1").unwrap();
        let ref2 = graph.child(root, "ref2").unwrap();
        graph.link(ref1, "x", ref2);
        graph.link(ref2, "x", ref1);
        graph.link(root, "y", ref2);

        let found = resolve_cycles(&mut graph, root);

        assert_eq!(found, vec![info("./ref1", "./ref1/x/x")]);
        assert_eq!(
            graph.to_value(root).unwrap(),
            json!({
                "a": 1,
                "ref1": { "b": 2, "x": { "c": 3, "x": sentinel("./ref1") } },
                "ref2": { "c": 3, "x": sentinel("./ref1") },
                "y": { "c": 3, "x": sentinel("./ref1") }
            })
        );
    }

    #[test]
    fn dereferenced_recursive_schema() {
        let mut graph = SchemaGraph::from_value(&json!({
            "definitions": {
                "Tree": {
                    "type": "object",
                    "properties": {
                        "children": {
                            "type": "array",
                            "items": { "$ref": "#/definitions/Tree" }
                        }
                    }
                }
            }
        }));
        graph.dereference().unwrap();
        let definitions = graph.lookup("#/definitions").unwrap();

        let found = resolve_cycles(&mut graph, definitions);

        assert_eq!(found, vec![info("./Tree", "./Tree/properties/children/items")]);
        let tree = graph.to_value(graph.lookup("#/definitions/Tree").unwrap()).unwrap();
        assert_eq!(tree["properties"]["children"]["items"], sentinel("./Tree"));
    }
}

// === Nullable Rewrite Tests ===

mod nullables {
    use super::*;

    fn nested_input() -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "string", "nullable": true, "format": "date" },
                "b": {
                    "type": "object",
                    "nullable": true,
                    "properties": {
                        "x": {
                            "oneOf": [
                                { "nullable": true, "type": "string", "maxLength": 4 },
                                { "nullable": true, "type": "number", "minimum": 100 }
                            ]
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn nested_levels() {
        assert_eq!(
            replace_nullables(&nested_input()),
            json!({
                "type": "object",
                "properties": {
                    "a": { "oneOf": [{ "type": "null" }, { "type": "string", "format": "date" }] },
                    "b": {
                        "oneOf": [
                            { "type": "null" },
                            {
                                "type": "object",
                                "properties": {
                                    "x": {
                                        "oneOf": [
                                            { "oneOf": [{ "type": "null" }, { "type": "string", "maxLength": 4 }] },
                                            { "oneOf": [{ "type": "null" }, { "type": "number", "minimum": 100 }] }
                                        ]
                                    }
                                }
                            }
                        ]
                    }
                }
            })
        );
    }

    #[test]
    fn non_true_markers_are_kept() {
        for marker in [json!(false), Value::Null, json!("true"), json!(1)] {
            let input = json!({ "type": "string", "nullable": marker });
            assert_eq!(replace_nullables(&input), input);
        }
        let absent = json!({ "type": "string" });
        assert_eq!(replace_nullables(&absent), absent);
    }

    #[test]
    fn property_named_nullable() {
        let input = json!({
            "type": "object",
            "properties": { "nullable": { "type": "boolean" } }
        });
        assert_eq!(replace_nullables(&input), input);
    }

    #[test]
    fn idempotent() {
        let once = replace_nullables(&nested_input());
        assert_eq!(replace_nullables(&once), once);
        assert!(!once.to_string().contains("\"nullable\":true"));
    }
}

// === Operation Extraction Tests ===

mod operations {
    use super::*;

    fn document() -> Value {
        json!({
            "openapi": "3.0.3",
            "paths": {
                "/test": {
                    "put": {
                        "requestBody": { "content": { "application/json": {
                            "schema": { "type": "object", "properties": { "id": { "readOnly": true }, "v": {} } }
                        } } },
                        "responses": { "200": { "content": { "application/json": {
                            "schema": { "type": "object", "properties": { "pw": { "writeOnly": true }, "v": {} } }
                        } } } }
                    },
                    "post": {
                        "operationId": "my-test-operation",
                        "requestBody": { "content": { "application/vnd.api+json": {
                            "schema": { "type": "object" }
                        } } }
                    }
                }
            }
        })
    }

    #[test]
    fn request_names() {
        let requests = extract_request_schemas(&document());
        assert!(requests.contains_key("PutTestRequestBody"));
        assert!(requests.contains_key("MyTestOperationRequestBody"));
        assert!(requests["PutTestRequestBody"]["properties"].get("id").is_none());
    }

    #[test]
    fn response_names() {
        let responses = extract_response_schemas(&document());
        assert_eq!(responses.len(), 1);
        assert!(responses["PutTestResponseBody"]["properties"].get("pw").is_none());
        assert!(responses["PutTestResponseBody"]["properties"].get("v").is_some());
    }

    #[test]
    fn visibility_filter_by_direction() {
        let schema = json!({
            "type": "object",
            "required": ["id", "password"],
            "properties": {
                "id": { "type": "string", "readOnly": true },
                "password": { "type": "string", "writeOnly": true }
            }
        });
        let request = filter_properties(&schema, &Direction::Request.hidden_criteria());
        assert_eq!(request["required"], json!(["password"]));
        let response = filter_properties(&schema, &Direction::Response.hidden_criteria());
        assert_eq!(response["required"], json!(["id"]));
    }
}
