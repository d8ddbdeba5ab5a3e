//! Node/link view of a graph for display layers.
//!
//! JSON has no infinities or NaN, so non-finite `value`/`grad` fields are
//! written as the strings `"inf"`, `"-inf"` and `"NaN"`.

use std::collections::HashMap;

use serde::{Serialize, Serializer};

use crate::env::Environment;
use crate::graph::{NodeId, Op, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub name: String,
    #[serde(serialize_with = "finite_or_label")]
    pub value: f64,
    #[serde(serialize_with = "finite_or_label")]
    pub grad: f64,
    pub op: Op,
    /// Depth from the nearest leaf; leaves are group 0
    pub group: usize,
}

/// One `children` edge, pointing from the child to the node derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphLink {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(serialize_with = "finite_or_label")]
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

impl GraphData {
    pub fn new() -> Self {
        GraphData::default()
    }

    /// Everything reachable from `root`.
    pub fn from_root(root: &Value) -> Self {
        let mut data = GraphData::new();
        data.extend(root, &mut HashMap::new());
        data
    }

    /// Everything reachable from any binding, each node once.
    pub fn from_environment(env: &Environment) -> Self {
        let mut data = GraphData::new();
        let mut groups = HashMap::new();
        for value in env.values() {
            data.extend(value, &mut groups);
        }
        data
    }

    /// Append nodes reachable from `root` that are not yet in `groups`.
    /// Children come first in topological order, so their groups are known.
    fn extend(&mut self, root: &Value, groups: &mut HashMap<NodeId, usize>) {
        for node in root.topological_order() {
            if groups.contains_key(&node.id()) {
                continue;
            }
            let group = node
                .children()
                .iter()
                .filter_map(|c| groups.get(&c.id()).copied())
                .max()
                .map_or(0, |g| g + 1);
            groups.insert(node.id(), group);
            self.nodes.push(GraphNode {
                id: node.id(),
                name: node.name().to_string(),
                value: node.data(),
                grad: node.grad(),
                op: node.op(),
                group,
            });
            for child in node.children() {
                self.links.push(GraphLink {
                    source: child.id(),
                    target: node.id(),
                    value: child.data(),
                });
            }
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn finite_or_label<S: Serializer>(x: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if x.is_finite() {
        serializer.serialize_f64(*x)
    } else if x.is_nan() {
        serializer.serialize_str("NaN")
    } else if *x > 0.0 {
        serializer.serialize_str("inf")
    } else {
        serializer.serialize_str("-inf")
    }
}
