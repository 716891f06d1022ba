//! Arena representation of a schema document.
//!
//! A parsed document is a tree, but dereferencing `$ref` pointers turns it
//! into a graph: several parents can share one node, and a node can become
//! its own ancestor. Nodes live in a flat arena and are addressed by
//! [`NodeId`], so "is this node already on the active path" is an index
//! check instead of an identity comparison.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{CircularReferenceError, DocumentError};

/// Index of a node inside a [`SchemaGraph`].
pub type NodeId = usize;

/// One node of the arena. Composite nodes refer to their children by id.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// null, boolean, number, or string.
    Scalar(Value),
    Array(Vec<NodeId>),
    Object(IndexMap<String, NodeId>),
}

impl Node {
    pub fn is_composite(&self) -> bool {
        !matches!(self, Node::Scalar(_))
    }
}

/// A schema document whose nodes may be shared or cyclic.
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    nodes: Vec<Node>,
    root: NodeId,
}

impl SchemaGraph {
    /// Build a graph from a JSON value. The result is a plain tree.
    pub fn from_value(value: &Value) -> Self {
        let mut graph = SchemaGraph {
            nodes: Vec::new(),
            root: 0,
        };
        graph.root = graph.add_value(value);
        graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn is_composite(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(Node::is_composite)
    }

    /// Copy a JSON value into the arena and return the id of its top node.
    pub fn add_value(&mut self, value: &Value) -> NodeId {
        let node = match value {
            Value::Array(items) => Node::Array(items.iter().map(|v| self.add_value(v)).collect()),
            Value::Object(map) => Node::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.add_value(v)))
                    .collect(),
            ),
            other => Node::Scalar(other.clone()),
        };
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Child of `parent` under `key` (an object key or a decimal array index).
    pub fn child(&self, parent: NodeId, key: &str) -> Option<NodeId> {
        match self.nodes.get(parent)? {
            Node::Object(map) => map.get(key).copied(),
            Node::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i).copied()),
            Node::Scalar(_) => None,
        }
    }

    /// Children of a node in definition order, keyed like [`SchemaGraph::child`].
    pub fn children(&self, id: NodeId) -> Vec<(String, NodeId)> {
        match self.nodes.get(id) {
            Some(Node::Object(map)) => map.iter().map(|(k, c)| (k.clone(), *c)).collect(),
            Some(Node::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, c)| (i.to_string(), *c))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Point the slot `key` of `parent` at `child`.
    ///
    /// Object slots are replaced in place or appended; array slots may be
    /// replaced or appended at the end. Returns false when the slot cannot exist.
    pub fn link(&mut self, parent: NodeId, key: &str, child: NodeId) -> bool {
        if child >= self.nodes.len() {
            return false;
        }
        match self.nodes.get_mut(parent) {
            Some(Node::Object(map)) => {
                map.insert(key.to_string(), child);
                true
            }
            Some(Node::Array(items)) => match key.parse::<usize>() {
                Ok(i) if i < items.len() => {
                    items[i] = child;
                    true
                }
                Ok(i) if i == items.len() => {
                    items.push(child);
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Find the node at a JSON-pointer fragment such as `#/components/schemas`.
    pub fn lookup(&self, fragment: &str) -> Option<NodeId> {
        let path = fragment.trim_start_matches('#').trim_start_matches('/');
        let mut current = self.root;
        if path.is_empty() {
            return Some(current);
        }
        for part in path.split('/') {
            current = self.child(current, &unescape_pointer(part))?;
        }
        Some(current)
    }

    /// Replace every internal `{"$ref": "#/..."}` node with its target.
    ///
    /// Each slot holding a reference is repointed at the target node, so
    /// targets become shared and recursive definitions become cycles.
    /// External references are left untouched. Returns the number of
    /// reference nodes that were resolved.
    pub fn dereference(&mut self) -> Result<usize, DocumentError> {
        let mut resolved: HashMap<NodeId, NodeId> = HashMap::new();
        let mut external = 0usize;

        for id in 0..self.nodes.len() {
            if self.local_ref(id).is_some() {
                let mut pending = HashSet::new();
                self.resolve_ref_node(id, &mut resolved, &mut pending)?;
            } else if self.external_ref(id).is_some() {
                external += 1;
            }
        }

        if external > 0 {
            warn!(count = external, "external $ref pointers are not followed");
        }

        for node in &mut self.nodes {
            match node {
                Node::Array(items) => {
                    for slot in items.iter_mut() {
                        if let Some(target) = resolved.get(slot) {
                            *slot = *target;
                        }
                    }
                }
                Node::Object(map) => {
                    for slot in map.values_mut() {
                        if let Some(target) = resolved.get(slot) {
                            *slot = *target;
                        }
                    }
                }
                Node::Scalar(_) => {}
            }
        }
        if let Some(target) = resolved.get(&self.root) {
            self.root = *target;
        }

        debug!(count = resolved.len(), "dereferenced local $ref pointers");
        Ok(resolved.len())
    }

    /// Materialize the subtree under `id` as a JSON value.
    ///
    /// Shared nodes are copied once per occurrence. Fails on the first cycle
    /// reached, naming the path where it closes.
    pub fn to_value(&self, id: NodeId) -> Result<Value, CircularReferenceError> {
        let mut on_path = vec![false; self.nodes.len()];
        let mut path = vec![".".to_string()];
        self.materialize(id, &mut on_path, &mut path)
    }

    fn materialize(
        &self,
        id: NodeId,
        on_path: &mut [bool],
        path: &mut Vec<String>,
    ) -> Result<Value, CircularReferenceError> {
        let Some(node) = self.nodes.get(id) else {
            return Ok(Value::Null);
        };
        if on_path[id] {
            return Err(CircularReferenceError {
                path: path.join("/"),
            });
        }

        on_path[id] = true;
        let value = match node {
            Node::Scalar(v) => v.clone(),
            Node::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.iter().enumerate() {
                    path.push(i.to_string());
                    out.push(self.materialize(*child, on_path, path)?);
                    path.pop();
                }
                Value::Array(out)
            }
            Node::Object(map) => {
                let mut out = Map::new();
                for (key, child) in map {
                    path.push(key.clone());
                    out.insert(key.clone(), self.materialize(*child, on_path, path)?);
                    path.pop();
                }
                Value::Object(out)
            }
        };
        on_path[id] = false;
        Ok(value)
    }

    fn ref_string(&self, id: NodeId) -> Option<&str> {
        let Some(Node::Object(map)) = self.nodes.get(id) else {
            return None;
        };
        match self.nodes.get(*map.get("$ref")?)? {
            Node::Scalar(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn local_ref(&self, id: NodeId) -> Option<&str> {
        self.ref_string(id).filter(|r| r.starts_with('#'))
    }

    fn external_ref(&self, id: NodeId) -> Option<&str> {
        self.ref_string(id).filter(|r| !r.starts_with('#'))
    }

    /// Follow a reference node to the first node that is not a reference.
    fn resolve_ref_node(
        &self,
        id: NodeId,
        resolved: &mut HashMap<NodeId, NodeId>,
        pending: &mut HashSet<NodeId>,
    ) -> Result<NodeId, DocumentError> {
        if let Some(target) = resolved.get(&id) {
            return Ok(*target);
        }
        let Some(reference) = self.local_ref(id).map(str::to_string) else {
            return Ok(id);
        };
        if !pending.insert(id) {
            return Err(DocumentError::UnresolvedReference {
                reference,
                message: "reference chain never reaches a schema".to_string(),
            });
        }

        let mut current = self.resolve_ref_node(self.root, resolved, pending)?;
        let path = reference.trim_start_matches('#').trim_start_matches('/');
        if !path.is_empty() {
            for part in path.split('/') {
                let next = self.child(current, &unescape_pointer(part)).ok_or_else(|| {
                    DocumentError::UnresolvedReference {
                        reference: reference.clone(),
                        message: format!("no value at segment '{}'", part),
                    }
                })?;
                current = self.resolve_ref_node(next, resolved, pending)?;
            }
        }

        pending.remove(&id);
        resolved.insert(id, current);
        Ok(current)
    }
}

/// Unescape JSON Pointer encoding (~1 = /, ~0 = ~).
pub(crate) fn unescape_pointer(part: &str) -> String {
    part.replace("~1", "/").replace("~0", "~")
}

/// Escape a key for use as a JSON Pointer segment.
pub(crate) fn escape_pointer(part: &str) -> String {
    part.replace('~', "~0").replace('/', "~1")
}
