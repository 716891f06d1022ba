//! OpenAPI `discriminator` branch selection for `oneOf`.

use serde_json::Value;

use crate::compile::resolve_refs;

/// The tag property named by `schema.discriminator.propertyName`.
pub(crate) fn property_name(schema: &Value) -> Option<&str> {
    schema
        .get("discriminator")?
        .get("propertyName")?
        .as_str()
}

/// Index of the `oneOf` branch selected by `tag_value`.
///
/// An explicit `mapping` entry wins and is matched against each branch's
/// `$ref`. Otherwise a branch is selected when its `properties.<tag>` has a
/// matching `const` or `enum`, or when its `$ref` names a schema called
/// `tag_value`.
pub(crate) fn select_branch(
    root: &Value,
    schema: &Value,
    branches: &[Value],
    tag: &str,
    tag_value: &str,
) -> Option<usize> {
    let mapped = schema
        .get("discriminator")
        .and_then(|d| d.get("mapping"))
        .and_then(|m| m.get(tag_value))
        .and_then(Value::as_str);
    if let Some(target) = mapped {
        return branches
            .iter()
            .position(|branch| branch.get("$ref").and_then(Value::as_str) == Some(target));
    }

    branches
        .iter()
        .position(|branch| declares_tag(root, branch, tag, tag_value))
        .or_else(|| {
            branches.iter().position(|branch| {
                branch
                    .get("$ref")
                    .and_then(Value::as_str)
                    .and_then(|r| r.rsplit('/').next())
                    == Some(tag_value)
            })
        })
}

fn declares_tag(root: &Value, branch: &Value, tag: &str, tag_value: &str) -> bool {
    let branch = resolve_refs(root, branch);
    let Some(property) = branch.get("properties").and_then(|p| p.get(tag)) else {
        return false;
    };
    let property = resolve_refs(root, property);

    if property.get("const").and_then(Value::as_str) == Some(tag_value) {
        return true;
    }
    property
        .get("enum")
        .and_then(Value::as_array)
        .is_some_and(|values| values.iter().any(|v| v.as_str() == Some(tag_value)))
}
