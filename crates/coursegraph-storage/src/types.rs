//! Storage-layer types: stored nodes and edges, property maps, and the
//! ordering helper both backends share.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use coursegraph_core::{NodeRef, Relation, Tag};

/// Node or edge properties. Writing `Value::Null` for a key removes it.
pub type Properties = BTreeMap<String, Value>;

/// Which edges of a node an operation considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// A node as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNode {
    pub node: NodeRef,
    pub tags: BTreeSet<Tag>,
    pub properties: Properties,
}

impl StoredNode {
    pub fn new(node: NodeRef) -> Self {
        StoredNode {
            node,
            tags: BTreeSet::new(),
            properties: Properties::new(),
        }
    }

    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn int_property(&self, key: &str) -> Option<i64> {
        self.properties.get(key).and_then(Value::as_i64)
    }
}

/// A relationship as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEdge {
    pub source: NodeRef,
    pub relation: Relation,
    pub target: NodeRef,
    pub properties: Properties,
}

/// Merges `updates` into `properties`; null values delete their key.
pub fn merge_properties(properties: &mut Properties, updates: &Properties) {
    for (key, value) in updates {
        if value.is_null() {
            properties.remove(key);
        } else {
            properties.insert(key.clone(), value.clone());
        }
    }
}

/// Sorts nodes by an integer property, ascending. Nodes missing the
/// property go last; ties fall back to node identity so the result is
/// deterministic.
pub fn sort_by_order_key(nodes: &mut [StoredNode], order_key: &str) {
    nodes.sort_by(|a, b| {
        match (a.int_property(order_key), b.int_property(order_key)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.node.cmp(&b.node))
    });
}

/// Node and relationship totals, by label and by relation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: BTreeMap<String, usize>,
    pub edges: BTreeMap<String, usize>,
}
