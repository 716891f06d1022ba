//! Removal of undeclared properties.
//!
//! Walks schema and instance together. Wherever an object schema says
//! `additionalProperties: false`, instance keys it does not declare are
//! deleted. `oneOf`/`anyOf` only sanitize through the branch that the
//! discriminator selects, or else the first branch the sanitized instance
//! passes. When no branch passes, the type-compatible branch that leaves the
//! fewest errors is used.

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::compile::{join, local_ref, resolve_refs, BranchValidators, MAX_DEPTH};
use crate::discriminator::{property_name, select_branch};
use crate::types::json_type_name;

pub(crate) struct Sanitizer<'a> {
    branches: &'a BranchValidators,
}

impl<'a> Sanitizer<'a> {
    pub(crate) fn new(branches: &'a BranchValidators) -> Self {
        Self { branches }
    }

    /// Strip undeclared properties from `instance` in place.
    pub(crate) fn sanitize(&self, instance: &mut Value) {
        let root = self.branches.root();
        self.walk(root, "", instance, 0);
    }

    fn walk(&self, schema: &Value, path: &str, instance: &mut Value, depth: usize) {
        if depth >= MAX_DEPTH {
            debug!(%path, "sanitizer depth limit reached");
            return;
        }
        let Some(schema_map) = schema.as_object() else {
            return;
        };
        let root = self.branches.root();

        if let Some(target) = schema_map
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| local_ref(root, r))
        {
            self.walk(target, &join(path, "$ref"), instance, depth + 1);
        }

        if let Some(Value::Array(all_of)) = schema_map.get("allOf") {
            let all_of_path = join(path, "allOf");
            for (index, branch) in all_of.iter().enumerate() {
                self.walk(branch, &join(&all_of_path, &index.to_string()), instance, depth + 1);
            }
        }

        for keyword in ["oneOf", "anyOf"] {
            if let Some(Value::Array(branches)) = schema_map.get(keyword) {
                self.walk_combinator(schema, keyword, branches, &join(path, keyword), instance, depth);
            }
        }

        match instance {
            Value::Object(object) => self.walk_object(schema_map, path, object, depth),
            Value::Array(items) => self.walk_array(schema_map, path, items, depth),
            _ => {}
        }
    }

    fn walk_combinator(
        &self,
        holder: &Value,
        keyword: &str,
        branches: &[Value],
        path: &str,
        instance: &mut Value,
        depth: usize,
    ) {
        if keyword == "oneOf" {
            if let Some(tag) = property_name(holder) {
                let selected = instance
                    .get(tag)
                    .and_then(Value::as_str)
                    .and_then(|value| select_branch(self.branches.root(), holder, branches, tag, value));
                if let Some(index) = selected {
                    self.walk(&branches[index], &join(path, &index.to_string()), instance, depth + 1);
                    return;
                }
            }
        }

        for (index, branch) in branches.iter().enumerate() {
            let branch_path = join(path, &index.to_string());
            let mut candidate = instance.clone();
            self.walk(branch, &branch_path, &mut candidate, depth + 1);
            if self.branches.is_valid(&branch_path, &candidate) {
                trace!(path = %branch_path, "sanitized through branch");
                *instance = candidate;
                return;
            }
        }

        // Nothing passes: sanitize through the type-compatible branch with the
        // fewest remaining errors, so the other violations still get reported.
        let root = self.branches.root();
        let mut best: Option<(usize, Value)> = None;
        for (index, branch) in branches.iter().enumerate() {
            if !accepts_type(resolve_refs(root, branch), instance) {
                continue;
            }
            let branch_path = join(path, &index.to_string());
            let mut candidate = instance.clone();
            self.walk(branch, &branch_path, &mut candidate, depth + 1);
            let Some(count) = self.branches.error_count(&branch_path, &candidate) else {
                continue;
            };
            if best.as_ref().map_or(true, |(fewest, _)| count < *fewest) {
                best = Some((count, candidate));
            }
        }
        match best {
            Some((_, candidate)) => *instance = candidate,
            None => debug!(%path, "no branch accepts the instance type, leaving it untouched"),
        }
    }

    fn walk_object(
        &self,
        schema: &Map<String, Value>,
        path: &str,
        object: &mut Map<String, Value>,
        depth: usize,
    ) {
        let declared = schema.get("properties").and_then(Value::as_object);
        let patterns = pattern_properties(schema);

        if let Some(declared) = declared {
            let properties_path = join(path, "properties");
            for (name, property_schema) in declared {
                if let Some(child) = object.get_mut(name) {
                    self.walk(property_schema, &join(&properties_path, name), child, depth + 1);
                }
            }
        }

        let is_declared = |key: &str| declared.is_some_and(|d| d.contains_key(key));

        if !patterns.is_empty() {
            let patterns_path = join(path, "patternProperties");
            for (key, child) in object.iter_mut() {
                if is_declared(key) {
                    continue;
                }
                for (source, regex, pattern_schema) in &patterns {
                    if regex.is_match(key) {
                        self.walk(pattern_schema, &join(&patterns_path, source), child, depth + 1);
                    }
                }
            }
        }

        let matches_pattern = |key: &str| patterns.iter().any(|(_, regex, _)| regex.is_match(key));

        match schema.get("additionalProperties") {
            Some(Value::Bool(false)) => {
                object.retain(|key, _| {
                    let keep = is_declared(key) || matches_pattern(key);
                    if !keep {
                        trace!(%key, %path, "removing additional property");
                    }
                    keep
                });
            }
            Some(additional @ Value::Object(_)) => {
                let additional_path = join(path, "additionalProperties");
                for (key, child) in object.iter_mut() {
                    if !is_declared(key) && !matches_pattern(key) {
                        self.walk(additional, &additional_path, child, depth + 1);
                    }
                }
            }
            _ => {}
        }
    }

    fn walk_array(&self, schema: &Map<String, Value>, path: &str, items: &mut [Value], depth: usize) {
        let mut offset = 0;
        if let Some(Value::Array(prefix)) = schema.get("prefixItems") {
            let prefix_path = join(path, "prefixItems");
            for (index, (item, item_schema)) in items.iter_mut().zip(prefix).enumerate() {
                self.walk(item_schema, &join(&prefix_path, &index.to_string()), item, depth + 1);
            }
            offset = prefix.len();
        }

        match schema.get("items") {
            Some(Value::Array(tuple)) => {
                let items_path = join(path, "items");
                for (index, (item, item_schema)) in items.iter_mut().zip(tuple).enumerate() {
                    self.walk(item_schema, &join(&items_path, &index.to_string()), item, depth + 1);
                }
            }
            Some(item_schema @ Value::Object(_)) => {
                let items_path = join(path, "items");
                for item in items.iter_mut().skip(offset) {
                    self.walk(item_schema, &items_path, item, depth + 1);
                }
            }
            _ => {}
        }
    }
}

/// Whether the branch's `type` (if any) admits the instance's JSON type.
fn accepts_type(branch: &Value, instance: &Value) -> bool {
    let admits = |name: &str| match name {
        "integer" => instance.as_f64().is_some_and(|n| n.fract() == 0.0),
        other => other == json_type_name(instance),
    };
    match branch.get("type") {
        Some(Value::String(name)) => admits(name.as_str()),
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).any(admits),
        _ => true,
    }
}

fn pattern_properties(schema: &Map<String, Value>) -> Vec<(&str, Regex, &Value)> {
    let Some(patterns) = schema.get("patternProperties").and_then(Value::as_object) else {
        return Vec::new();
    };
    patterns
        .iter()
        .filter_map(|(source, pattern_schema)| match Regex::new(source) {
            Ok(regex) => Some((source.as_str(), regex, pattern_schema)),
            Err(e) => {
                debug!(pattern = %source, error = %e, "skipping unsupported patternProperties regex");
                None
            }
        })
        .collect()
}
