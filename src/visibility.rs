//! Property filtering by schema annotations.
//!
//! Used to derive write shapes for request bodies (drop `readOnly`) and read
//! shapes for response bodies (drop `writeOnly`).

use serde_json::{Map, Value};

/// Remove every property whose schema matches all `criteria` pairs.
///
/// Property schemas that declare their own `properties` are never matched
/// directly; they are kept and filtered recursively instead. Filtering
/// reaches nested objects through `properties`, `items`, and the
/// `allOf`/`anyOf`/`oneOf` branches. Removed names are also dropped from the
/// owning `required` array. Returns a filtered copy.
pub fn filter_properties(schema: &Value, criteria: &Map<String, Value>) -> Value {
    if criteria.is_empty() {
        return schema.clone();
    }
    filter_value(schema, criteria)
}

/// True when `schema` carries every criteria key with an equal value.
pub fn matches_criteria(schema: &Value, criteria: &Map<String, Value>) -> bool {
    let Some(map) = schema.as_object() else {
        return false;
    };
    criteria
        .iter()
        .all(|(key, expected)| map.get(key) == Some(expected))
}

// --- Internal implementation ---

fn filter_value(value: &Value, criteria: &Map<String, Value>) -> Value {
    match value {
        Value::Object(map) => filter_object(map, criteria),
        other => other.clone(),
    }
}

fn filter_object(map: &Map<String, Value>, criteria: &Map<String, Value>) -> Value {
    let mut result = Map::new();
    let mut removed: Vec<String> = Vec::new();

    for (key, value) in map {
        match key.as_str() {
            "properties" => {
                let filtered = filter_props(value, criteria, &mut removed);
                result.insert(key.clone(), filtered);
            }
            "items" => {
                // Single schema or tuple form
                let filtered = match value {
                    Value::Array(arr) => {
                        Value::Array(arr.iter().map(|v| filter_value(v, criteria)).collect())
                    }
                    other => filter_value(other, criteria),
                };
                result.insert(key.clone(), filtered);
            }
            "allOf" | "anyOf" | "oneOf" => {
                let filtered = match value {
                    Value::Array(arr) => {
                        Value::Array(arr.iter().map(|v| filter_value(v, criteria)).collect())
                    }
                    other => other.clone(),
                };
                result.insert(key.clone(), filtered);
            }
            _ => {
                result.insert(key.clone(), value.clone());
            }
        }
    }

    if !removed.is_empty() {
        if let Some(Value::Array(required)) = result.get_mut("required") {
            required.retain(|r| !r.as_str().is_some_and(|name| removed.iter().any(|n| n == name)));
        }
    }

    Value::Object(result)
}

fn filter_props(value: &Value, criteria: &Map<String, Value>, removed: &mut Vec<String>) -> Value {
    let Some(props) = value.as_object() else {
        return value.clone();
    };

    let mut result = Map::new();
    for (name, prop) in props {
        if prop.get("properties").is_some() {
            result.insert(name.clone(), filter_value(prop, criteria));
        } else if matches_criteria(prop, criteria) {
            removed.push(name.clone());
        } else {
            result.insert(name.clone(), filter_value(prop, criteria));
        }
    }

    Value::Object(result)
}
