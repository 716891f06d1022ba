//! Rewrite of OpenAPI 3.0 `nullable: true` into `oneOf` nullability.

use serde_json::{json, Map, Value};

/// Replace every `nullable: true` schema with `{ "oneOf": [{ "type": "null" }, <schema> ] }`.
///
/// The marker is removed from the wrapped schema. Only the boolean `true`
/// triggers the rewrite. A `nullable` key directly inside a `properties` map
/// names a property and is left alone. Returns a new value; when the root
/// itself is nullable the wrapper becomes the new root.
pub fn replace_nullables(schema: &Value) -> Value {
    rewrite(schema, "")
}

fn rewrite(value: &Value, parent_key: &str) -> Value {
    match value {
        Value::Object(map) => rewrite_object(map, parent_key),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| rewrite(item, &i.to_string()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn rewrite_object(map: &Map<String, Value>, parent_key: &str) -> Value {
    let mut result = Map::new();
    let mut nullable = false;

    for (key, child) in map {
        if child.is_object() || child.is_array() {
            result.insert(key.clone(), rewrite(child, key));
        } else if key == "nullable" && *child == Value::Bool(true) && parent_key != "properties" {
            nullable = true;
        } else {
            result.insert(key.clone(), child.clone());
        }
    }

    if nullable {
        json!({ "oneOf": [{ "type": "null" }, Value::Object(result)] })
    } else {
        Value::Object(result)
    }
}
