//! Cycle removal for dereferenced schema graphs.

use std::collections::HashSet;

use tracing::debug;

use crate::graph::{NodeId, SchemaGraph};
use crate::types::CircularRefInfo;

/// Find reference cycles below `root` and cut them in place.
///
/// Walks the graph depth-first in definition order. When a child is already
/// on the active path, the slot holding it is repointed at a fresh
/// `{ "type": "object", "_circularRef": <original> }` node and the cycle is
/// recorded. Only nodes on the active path count, so a node shared by two
/// sibling branches is not reported. Paths start at `.` and are joined with `/`.
pub fn resolve_cycles(graph: &mut SchemaGraph, root: NodeId) -> Vec<CircularRefInfo> {
    let mut walk = CycleWalk::default();
    if graph.is_composite(root) {
        walk.visit(graph, root, ".");
    }
    walk.found
}

#[derive(Default)]
struct CycleWalk {
    key_path: Vec<String>,
    stack: Vec<NodeId>,
    on_path: HashSet<NodeId>,
    found: Vec<CircularRefInfo>,
}

impl CycleWalk {
    fn visit(&mut self, graph: &mut SchemaGraph, node: NodeId, key: &str) {
        self.key_path.push(key.to_string());
        self.stack.push(node);
        self.on_path.insert(node);

        for (child_key, child) in graph.children(node) {
            if !graph.is_composite(child) {
                continue;
            }

            if self.on_path.contains(&child) {
                let first = self
                    .stack
                    .iter()
                    .position(|id| *id == child)
                    .unwrap_or_default();
                let info = CircularRefInfo {
                    reference: format!("{}/{}", self.key_path.join("/"), child_key),
                    original: self.key_path[..=first].join("/"),
                };
                debug!(reference = %info.reference, original = %info.original, "cutting circular reference");

                let sentinel = graph.add_value(&info.sentinel());
                graph.link(node, &child_key, sentinel);
                self.found.push(info);
            } else {
                self.visit(graph, child, &child_key);
            }
        }

        self.key_path.pop();
        self.stack.pop();
        self.on_path.remove(&node);
    }
}
