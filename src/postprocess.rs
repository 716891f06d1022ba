//! Error post-processing.
//!
//! Turns raw engine errors into [`ErrorEntry`] lists: one entry per missing
//! or unexpected property, branch errors ahead of a failing `oneOf`/`anyOf`,
//! discriminator-aware reporting, and optional null-sibling omission.

use std::cell::Cell;
use std::collections::HashSet;

use jsonschema::Validator;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::compile::{join, last_segment, parent_path, schema_at, BranchValidators, MAX_DEPTH};
use crate::discriminator::{property_name, select_branch};
use crate::error::ErrorEntry;

/// Drop uninformative `type: null` branch errors of nullable combinators.
///
/// An error is dropped when its keyword is `type` with `params.type == "null"`
/// and its schema path is a recorded `oneOf`/`anyOf` path followed by
/// `/<index>/type`. The combinator error at that path and instance is dropped
/// with it. Everything else keeps its order.
pub fn omit_null_sibling_errors(errors: Vec<ErrorEntry>) -> Vec<ErrorEntry> {
    let combinators: Vec<(&str, &str)> = errors
        .iter()
        .filter(|e| is_combinator(&e.keyword))
        .map(|e| (e.schema_path.as_str(), e.instance_path.as_str()))
        .collect();

    let mut dropped = vec![false; errors.len()];
    let mut silenced: HashSet<(String, String)> = HashSet::new();
    for (index, error) in errors.iter().enumerate() {
        if error.keyword != "type" || error.params.get("type").and_then(Value::as_str) != Some("null") {
            continue;
        }
        for (path, instance) in &combinators {
            if *instance == error.instance_path && is_branch_type_path(&error.schema_path, path) {
                dropped[index] = true;
                silenced.insert((path.to_string(), instance.to_string()));
            }
        }
    }

    errors
        .into_iter()
        .zip(dropped)
        .filter(|(error, dropped)| {
            !dropped
                && !(is_combinator(&error.keyword)
                    && silenced.contains(&(error.schema_path.clone(), error.instance_path.clone())))
        })
        .map(|(error, _)| error)
        .collect()
}

/// Collects post-processed errors for one root schema.
pub(crate) struct ErrorCollector<'a> {
    branches: &'a BranchValidators,
    /// Set when a discriminator selected a branch the instance passes.
    discriminated: Cell<bool>,
}

impl<'a> ErrorCollector<'a> {
    pub(crate) fn new(branches: &'a BranchValidators) -> Self {
        Self {
            branches,
            discriminated: Cell::new(false),
        }
    }

    /// Errors for `instance`, empty when the instance is accepted.
    ///
    /// An engine rejection only comes back empty when a discriminator
    /// accepted the instance. Otherwise the raw engine errors are reported.
    pub(crate) fn collect(&self, validator: &Validator, instance: &Value) -> Vec<ErrorEntry> {
        if validator.is_valid(instance) {
            return Vec::new();
        }
        self.discriminated.set(false);
        let entries = self.collect_at(validator, instance, "", "", 0);
        if entries.is_empty() && !self.discriminated.get() {
            debug!("no post-processed errors for a rejected instance, reporting engine errors");
            return self.raw_errors(validator, instance);
        }
        entries
    }

    fn raw_errors(&self, validator: &Validator, instance: &Value) -> Vec<ErrorEntry> {
        validator
            .iter_errors(instance)
            .map(|error| {
                let schema_path = error.schema_path.to_string();
                let keyword = last_segment(&schema_path);
                let params = keyword_params(&keyword, schema_at(self.root(), &schema_path));
                entry(&error.instance_path.to_string(), &schema_path, &keyword, error.to_string(), params)
            })
            .collect()
    }

    fn root(&self) -> &Value {
        self.branches.root()
    }

    fn collect_at(
        &self,
        validator: &Validator,
        instance: &Value,
        schema_base: &str,
        instance_base: &str,
        depth: usize,
    ) -> Vec<ErrorEntry> {
        let mut entries = Vec::new();
        let mut split: HashSet<(String, String)> = HashSet::new();

        for error in validator.iter_errors(instance) {
            let schema_path = if schema_base.is_empty() {
                error.schema_path.to_string()
            } else {
                // Branch validators wrap the branch in a single `$ref`.
                let relative = error.schema_path.to_string();
                format!("{}{}", schema_base, relative.strip_prefix("/$ref").unwrap_or(&relative))
            };
            let instance_path = format!("{}{}", instance_base, error.instance_path);
            let keyword = last_segment(&schema_path);
            let target: &Value = &error.instance;
            let message = error.to_string();

            match keyword.as_str() {
                "oneOf" | "anyOf" => {
                    self.expand_combinator(
                        &keyword,
                        &schema_path,
                        &instance_path,
                        target,
                        message,
                        depth,
                        &mut entries,
                    );
                }
                "required" => {
                    if !split.insert((schema_path.clone(), instance_path.clone())) {
                        continue;
                    }
                    let missing = self.missing_properties(&schema_path, target);
                    if missing.is_empty() {
                        entries.push(entry(&instance_path, &schema_path, &keyword, message, json!({})));
                    }
                    for name in missing {
                        entries.push(entry(
                            &instance_path,
                            &schema_path,
                            &keyword,
                            format!("\"{}\" is a required property", name),
                            json!({ "missingProperty": name }),
                        ));
                    }
                }
                "additionalProperties" if schema_at(self.root(), &schema_path) == Some(&Value::Bool(false)) => {
                    if !split.insert((schema_path.clone(), instance_path.clone())) {
                        continue;
                    }
                    let unexpected = self.unexpected_properties(&schema_path, target);
                    if unexpected.is_empty() {
                        entries.push(entry(&instance_path, &schema_path, &keyword, message, json!({})));
                    }
                    for name in unexpected {
                        entries.push(entry(
                            &instance_path,
                            &schema_path,
                            &keyword,
                            format!("Additional properties are not allowed ('{}' was unexpected)", name),
                            json!({ "additionalProperty": name }),
                        ));
                    }
                }
                _ => {
                    let params = keyword_params(&keyword, schema_at(self.root(), &schema_path));
                    entries.push(entry(&instance_path, &schema_path, &keyword, message, params));
                }
            }
        }

        entries
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_combinator(
        &self,
        keyword: &str,
        schema_path: &str,
        instance_path: &str,
        target: &Value,
        message: String,
        depth: usize,
        entries: &mut Vec<ErrorEntry>,
    ) {
        let Some(branches) = schema_at(self.root(), schema_path).and_then(Value::as_array) else {
            entries.push(entry(instance_path, schema_path, keyword, message, json!({})));
            return;
        };

        if keyword == "oneOf" {
            let holder_path = parent_path(schema_path);
            if let Some(holder) = schema_at(self.root(), holder_path) {
                if let Some(tag) = property_name(holder) {
                    self.discriminate(
                        holder,
                        holder_path,
                        tag,
                        branches,
                        schema_path,
                        instance_path,
                        target,
                        message,
                        depth,
                        entries,
                    );
                    return;
                }
            }
        }

        for index in 0..branches.len() {
            let branch_path = join(schema_path, &index.to_string());
            entries.extend(self.branch_errors(&branch_path, target, instance_path, depth).unwrap_or_default());
        }

        let params = if keyword == "oneOf" {
            let passing: Vec<usize> = (0..branches.len())
                .filter(|index| {
                    self.branches
                        .is_valid(&join(schema_path, &index.to_string()), target)
                })
                .collect();
            if passing.len() > 1 {
                json!({ "passingSchemas": passing })
            } else {
                json!({ "passingSchemas": null })
            }
        } else {
            json!({})
        };
        entries.push(entry(instance_path, schema_path, keyword, message, params));
    }

    #[allow(clippy::too_many_arguments)]
    fn discriminate(
        &self,
        holder: &Value,
        holder_path: &str,
        tag: &str,
        branches: &[Value],
        schema_path: &str,
        instance_path: &str,
        target: &Value,
        message: String,
        depth: usize,
        entries: &mut Vec<ErrorEntry>,
    ) {
        let discriminator_path = format!("{}/discriminator", holder_path);
        let Some(tag_value) = target.get(tag).and_then(Value::as_str) else {
            entries.push(entry(
                instance_path,
                &discriminator_path,
                "discriminator",
                format!("tag \"{}\" must be string", tag),
                json!({ "error": "tag", "tag": tag, "tagValue": target.get(tag) }),
            ));
            return;
        };

        match select_branch(self.root(), holder, branches, tag, tag_value) {
            Some(index) => {
                debug!(%tag, %tag_value, index, "discriminator selected branch");
                let branch_path = join(schema_path, &index.to_string());
                match self.branch_errors(&branch_path, target, instance_path, depth) {
                    Some(errors) if errors.is_empty() => self.discriminated.set(true),
                    Some(errors) => entries.extend(errors),
                    None => entries.push(entry(instance_path, schema_path, "oneOf", message, json!({}))),
                }
            }
            None => entries.push(entry(
                instance_path,
                &discriminator_path,
                "discriminator",
                format!("value of tag \"{}\" must be in oneOf", tag),
                json!({ "error": "mapping", "tag": tag, "tagValue": tag_value }),
            )),
        }
    }

    /// Errors of one branch, or `None` when the branch can't be evaluated.
    fn branch_errors(
        &self,
        branch_path: &str,
        target: &Value,
        instance_path: &str,
        depth: usize,
    ) -> Option<Vec<ErrorEntry>> {
        if depth >= MAX_DEPTH {
            debug!(path = %branch_path, "combinator depth limit reached");
            return None;
        }
        let validator = self.branches.get(branch_path)?;
        Some(self.collect_at(&validator, target, branch_path, instance_path, depth + 1))
    }

    fn missing_properties(&self, schema_path: &str, target: &Value) -> Vec<String> {
        schema_at(self.root(), schema_path)
            .and_then(Value::as_array)
            .map(|required| {
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|name| target.get(*name).is_none())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn unexpected_properties(&self, schema_path: &str, target: &Value) -> Vec<String> {
        let Some(object) = target.as_object() else {
            return Vec::new();
        };
        let owner = schema_at(self.root(), parent_path(schema_path));
        let declared = owner.and_then(|s| s.get("properties")).and_then(Value::as_object);
        let patterns: Vec<Regex> = owner
            .and_then(|s| s.get("patternProperties"))
            .and_then(Value::as_object)
            .map(|p| p.keys().filter_map(|k| Regex::new(k).ok()).collect())
            .unwrap_or_default();

        object
            .keys()
            .filter(|key| !declared.is_some_and(|d| d.contains_key(*key)))
            .filter(|key| !patterns.iter().any(|re| re.is_match(key)))
            .cloned()
            .collect()
    }
}

// --- Internal implementation ---

fn entry(instance_path: &str, schema_path: &str, keyword: &str, message: String, params: Value) -> ErrorEntry {
    ErrorEntry {
        instance_path: instance_path.to_string(),
        schema_path: format!("#{}", schema_path),
        keyword: keyword.to_string(),
        message,
        params,
    }
}

fn keyword_params(keyword: &str, value: Option<&Value>) -> Value {
    let Some(value) = value else {
        return json!({});
    };
    match keyword {
        "type" => json!({ "type": value }),
        "format" => json!({ "format": value }),
        "enum" => json!({ "allowedValues": value }),
        "const" => json!({ "allowedValue": value }),
        "pattern" => json!({ "pattern": value }),
        "multipleOf" => json!({ "multipleOf": value }),
        "minimum" => json!({ "comparison": ">=", "limit": value }),
        "maximum" => json!({ "comparison": "<=", "limit": value }),
        "exclusiveMinimum" => json!({ "comparison": ">", "limit": value }),
        "exclusiveMaximum" => json!({ "comparison": "<", "limit": value }),
        "minLength" | "maxLength" | "minItems" | "maxItems" | "minProperties"
        | "maxProperties" => json!({ "limit": value }),
        _ => json!({}),
    }
}

fn is_combinator(keyword: &str) -> bool {
    keyword == "oneOf" || keyword == "anyOf"
}

/// True for `<combinator>/<digits>/type`.
fn is_branch_type_path(path: &str, combinator: &str) -> bool {
    path.strip_prefix(combinator)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|rest| rest.strip_suffix("/type"))
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::config::EngineOptions;
    use std::sync::Arc;

    fn errors_for(schema: Value, instance: Value) -> Vec<ErrorEntry> {
        let options = EngineOptions::default();
        let validator = compile(&schema, &options).unwrap();
        let branches = BranchValidators::new(Arc::new(schema), options);
        ErrorCollector::new(&branches).collect(&validator, &instance)
    }

    fn paths(errors: &[ErrorEntry]) -> Vec<&str> {
        errors.iter().map(|e| e.schema_path.as_str()).collect()
    }

    fn nullable_schema() -> Value {
        json!({
            "oneOf": [
                { "type": "null" },
                { "required": ["a"], "properties": { "a": { "type": "string" } } }
            ]
        })
    }

    #[test]
    fn valid_instance_has_no_errors() {
        assert!(errors_for(json!({ "type": "string" }), json!("x")).is_empty());
    }

    #[test]
    fn required_reports_each_missing_property() {
        let errors = errors_for(json!({ "required": ["a", "b"] }), json!({ "b": 1, "c": 2 }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "required");
        assert_eq!(errors[0].params, json!({ "missingProperty": "a" }));
        assert_eq!(errors[0].message, "\"a\" is a required property");

        let errors = errors_for(json!({ "required": ["a", "b"] }), json!({}));
        let missing: Vec<&Value> = errors.iter().map(|e| &e.params["missingProperty"]).collect();
        assert_eq!(missing, vec![&json!("a"), &json!("b")]);
    }

    #[test]
    fn additional_properties_reports_each_key() {
        let schema = json!({
            "additionalProperties": false,
            "properties": { "a": {} },
            "patternProperties": { "^x-": {} }
        });
        let errors = errors_for(schema, json!({ "a": 1, "x-ok": 1, "b": 1, "c": 1 }));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].params, json!({ "additionalProperty": "b" }));
        assert_eq!(
            errors[1].message,
            "Additional properties are not allowed ('c' was unexpected)"
        );
        assert!(errors.iter().all(|e| e.schema_path == "#/additionalProperties"));
    }

    #[test]
    fn keyword_and_params_from_schema_path() {
        let schema = json!({
            "properties": {
                "n": { "type": "integer", "minimum": 3 },
                "s": { "enum": ["x", "y"] }
            }
        });
        let errors = errors_for(schema, json!({ "n": 1, "s": "z" }));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].keyword, "minimum");
        assert_eq!(errors[0].instance_path, "/n");
        assert_eq!(errors[0].params, json!({ "comparison": ">=", "limit": 3 }));
        assert_eq!(errors[1].keyword, "enum");
        assert_eq!(errors[1].params, json!({ "allowedValues": ["x", "y"] }));
    }

    #[test]
    fn combinator_errors_follow_their_branches() {
        let errors = errors_for(nullable_schema(), json!({ "a": 1 }));
        assert_eq!(
            paths(&errors),
            vec!["#/oneOf/0/type", "#/oneOf/1/properties/a/type", "#/oneOf"]
        );
        assert_eq!(errors[1].instance_path, "/a");
        assert_eq!(errors[2].params, json!({ "passingSchemas": null }));
    }

    #[test]
    fn null_siblings_are_omitted() {
        let errors = omit_null_sibling_errors(errors_for(nullable_schema(), json!({ "a": 1 })));
        assert_eq!(paths(&errors), vec!["#/oneOf/1/properties/a/type"]);
    }

    #[test]
    fn omission_keeps_non_null_combinators() {
        let schema = json!({ "anyOf": [{ "type": "string" }, { "type": "integer" }] });
        let errors = errors_for(schema, json!(1.5));
        let kept = omit_null_sibling_errors(errors.clone());
        assert_eq!(kept, errors);
        assert_eq!(kept.last().map(|e| e.keyword.as_str()), Some("anyOf"));
    }

    #[test]
    fn branch_type_paths() {
        assert!(is_branch_type_path("#/oneOf/0/type", "#/oneOf"));
        assert!(is_branch_type_path("#/a/anyOf/12/type", "#/a/anyOf"));
        assert!(!is_branch_type_path("#/oneOf/0/items/type", "#/oneOf"));
        assert!(!is_branch_type_path("#/oneOf/x/type", "#/oneOf"));
    }

    fn pet_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "pet": {
                    "oneOf": [
                        { "$ref": "#/definitions/Cat" },
                        { "$ref": "#/definitions/Dog" }
                    ],
                    "discriminator": { "propertyName": "kind" }
                }
            },
            "definitions": {
                "Cat": {
                    "type": "object",
                    "required": ["kind", "lives"],
                    "properties": {
                        "kind": { "const": "cat" },
                        "lives": { "type": "integer" }
                    }
                },
                "Dog": {
                    "type": "object",
                    "required": ["kind", "bark"],
                    "properties": {
                        "kind": { "const": "dog" },
                        "bark": { "type": "string" }
                    }
                }
            }
        })
    }

    #[test]
    fn discriminator_reports_selected_branch_only() {
        let errors = errors_for(pet_schema(), json!({ "pet": { "kind": "dog", "bark": 3 } }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "type");
        assert_eq!(errors[0].instance_path, "/pet/bark");
        assert!(errors[0].schema_path.starts_with("#/properties/pet/oneOf/1/"));
    }

    #[test]
    fn discriminator_branches_outside_definitions() {
        let schema = json!({
            "oneOf": [{ "$ref": "#/x-models/Cat" }, { "$ref": "#/x-models/Dog" }],
            "discriminator": { "propertyName": "kind" },
            "x-models": {
                "Cat": {
                    "type": "object",
                    "properties": { "kind": { "const": "cat" }, "lives": { "type": "integer" } }
                },
                "Dog": {
                    "type": "object",
                    "properties": { "kind": { "const": "dog" }, "bark": { "type": "string" } }
                }
            }
        });
        let errors = errors_for(schema, json!({ "kind": "cat", "lives": "nine" }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "type");
        assert_eq!(errors[0].instance_path, "/lives");
        assert_eq!(errors[0].schema_path, "#/oneOf/0/$ref/properties/lives/type");
    }

    #[test]
    fn mapped_branch_errors_are_reported() {
        let schema = json!({
            "oneOf": [{ "$ref": "#/definitions/Cat" }, { "type": "integer" }],
            "discriminator": {
                "propertyName": "kind",
                "mapping": { "cat": "#/definitions/Cat" }
            },
            "definitions": { "Cat": { "type": "object", "required": ["lives"] } }
        });
        let errors = errors_for(schema, json!({ "kind": "cat" }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].params, json!({ "missingProperty": "lives" }));
        assert_eq!(errors[0].schema_path, "#/oneOf/0/$ref/required");
    }

    #[test]
    fn raw_errors_carry_keyword_and_params() {
        let schema = json!({ "properties": { "n": { "maximum": 2 } } });
        let options = EngineOptions::default();
        let validator = compile(&schema, &options).unwrap();
        let branches = BranchValidators::new(Arc::new(schema), options);

        let errors = ErrorCollector::new(&branches).raw_errors(&validator, &json!({ "n": 5 }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].schema_path, "#/properties/n/maximum");
        assert_eq!(errors[0].params, json!({ "comparison": "<=", "limit": 2 }));
    }

    #[test]
    fn discriminator_missing_tag() {
        let errors = errors_for(pet_schema(), json!({ "pet": { "bark": "woof" } }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "discriminator");
        assert_eq!(errors[0].schema_path, "#/properties/pet/discriminator");
        assert_eq!(errors[0].params["error"], "tag");
        assert_eq!(errors[0].params["tag"], "kind");
    }

    #[test]
    fn discriminator_unknown_tag() {
        let errors = errors_for(pet_schema(), json!({ "pet": { "kind": "fish" } }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "value of tag \"kind\" must be in oneOf");
        assert_eq!(
            errors[0].params,
            json!({ "error": "mapping", "tag": "kind", "tagValue": "fish" })
        );
    }
}
