//! In-memory implementation of [`GraphStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests, dry runs, and
//! anywhere persistence isn't needed. It stores all data in ordered maps with
//! identical semantics to the SQLite backend. Transactions snapshot the whole
//! graph on `begin` and restore it on `rollback`.

use std::collections::BTreeMap;

use coursegraph_core::{NodeLabel, NodeRef, Relation, Tag};

use crate::error::StorageError;
use crate::traits::{walk_chain, GraphStore};
use crate::types::{
    merge_properties, sort_by_order_key, Direction, Properties, StoredEdge, StoredNode,
};

/// (source, relation, target)
type EdgeKey = (NodeRef, Relation, NodeRef);

/// The full graph held by the in-memory backend.
#[derive(Debug, Clone, Default)]
struct GraphState {
    /// Nodes indexed by label and id
    nodes: BTreeMap<NodeRef, StoredNode>,
    /// Relationship properties indexed by their full triple
    edges: BTreeMap<EdgeKey, Properties>,
}

impl GraphState {
    fn node_mut(&mut self, node: &NodeRef) -> Result<&mut StoredNode, StorageError> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| StorageError::NodeNotFound { node: node.clone() })
    }

    fn require_node(&self, node: &NodeRef) -> Result<(), StorageError> {
        if !self.nodes.contains_key(node) {
            return Err(StorageError::NodeNotFound { node: node.clone() });
        }
        Ok(())
    }

    fn matching_keys(
        &self,
        node: &NodeRef,
        relations: &[Relation],
        direction: Direction,
    ) -> Vec<EdgeKey> {
        self.edges
            .keys()
            .filter(|(source, relation, target)| {
                relations.contains(relation)
                    && match direction {
                        Direction::Outgoing => source == node,
                        Direction::Incoming => target == node,
                        Direction::Both => source == node || target == node,
                    }
            })
            .cloned()
            .collect()
    }
}

/// In-memory implementation of [`GraphStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: GraphState,
    /// Graph as it was when the open transaction began
    snapshot: Option<GraphState>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }
}

impl GraphStore for InMemoryStore {
    // -------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------

    fn begin(&mut self) -> Result<(), StorageError> {
        if self.snapshot.is_some() {
            return Err(StorageError::Transaction {
                reason: "a transaction is already open".into(),
            });
        }
        self.snapshot = Some(self.state.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| StorageError::Transaction {
                reason: "commit without an open transaction".into(),
            })
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        let snapshot = self.snapshot.take().ok_or_else(|| StorageError::Transaction {
            reason: "rollback without an open transaction".into(),
        })?;
        self.state = snapshot;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------

    fn merge_node(&mut self, node: &NodeRef) -> Result<bool, StorageError> {
        if self.state.nodes.contains_key(node) {
            return Ok(false);
        }
        self.state
            .nodes
            .insert(node.clone(), StoredNode::new(node.clone()));
        Ok(true)
    }

    fn get_node(&self, node: &NodeRef) -> Result<Option<StoredNode>, StorageError> {
        Ok(self.state.nodes.get(node).cloned())
    }

    fn nodes_with_label(&self, label: NodeLabel) -> Result<Vec<StoredNode>, StorageError> {
        Ok(self
            .state
            .nodes
            .values()
            .filter(|n| n.node.label == label)
            .cloned()
            .collect())
    }

    fn set_properties(
        &mut self,
        node: &NodeRef,
        properties: &Properties,
    ) -> Result<(), StorageError> {
        let stored = self.state.node_mut(node)?;
        merge_properties(&mut stored.properties, properties);
        Ok(())
    }

    fn add_tag(&mut self, node: &NodeRef, tag: Tag) -> Result<bool, StorageError> {
        Ok(self.state.node_mut(node)?.tags.insert(tag))
    }

    fn remove_tag(&mut self, node: &NodeRef, tag: Tag) -> Result<bool, StorageError> {
        Ok(self.state.node_mut(node)?.tags.remove(&tag))
    }

    // -------------------------------------------------------------------
    // Relationships
    // -------------------------------------------------------------------

    fn merge_edge(
        &mut self,
        source: &NodeRef,
        relation: Relation,
        target: &NodeRef,
        properties: &Properties,
    ) -> Result<bool, StorageError> {
        self.state.require_node(source)?;
        self.state.require_node(target)?;

        let key = (source.clone(), relation, target.clone());
        let created = !self.state.edges.contains_key(&key);
        let stored = self.state.edges.entry(key).or_default();
        merge_properties(stored, properties);
        Ok(created)
    }

    fn edges(
        &self,
        node: &NodeRef,
        relations: &[Relation],
        direction: Direction,
    ) -> Result<Vec<StoredEdge>, StorageError> {
        Ok(self
            .state
            .matching_keys(node, relations, direction)
            .into_iter()
            .map(|key| {
                let properties = self.state.edges.get(&key).cloned().unwrap_or_default();
                let (source, relation, target) = key;
                StoredEdge {
                    source,
                    relation,
                    target,
                    properties,
                }
            })
            .collect())
    }

    fn delete_edges(
        &mut self,
        node: &NodeRef,
        relations: &[Relation],
        direction: Direction,
    ) -> Result<usize, StorageError> {
        let keys = self.state.matching_keys(node, relations, direction);
        for key in &keys {
            self.state.edges.remove(key);
        }
        Ok(keys.len())
    }

    // -------------------------------------------------------------------
    // Traversals
    // -------------------------------------------------------------------

    fn children_ordered(
        &self,
        parent: &NodeRef,
        relation: Relation,
        order_key: &str,
    ) -> Result<Vec<StoredNode>, StorageError> {
        let mut children: Vec<StoredNode> = self
            .state
            .matching_keys(parent, &[relation], Direction::Outgoing)
            .into_iter()
            .filter_map(|(_, _, target)| self.state.nodes.get(&target).cloned())
            .collect();
        sort_by_order_key(&mut children, order_key);
        Ok(children)
    }

    fn follow_chain(
        &self,
        start: &NodeRef,
        relation: Relation,
    ) -> Result<Vec<NodeRef>, StorageError> {
        self.state.require_node(start)?;
        walk_chain(start, relation, |current| {
            Ok(self
                .state
                .matching_keys(current, &[relation], Direction::Outgoing)
                .into_iter()
                .map(|(_, _, target)| target)
                .collect())
        })
    }

    fn count_nodes(&self, label: Option<NodeLabel>) -> Result<usize, StorageError> {
        Ok(match label {
            Some(label) => self.state.nodes.keys().filter(|n| n.label == label).count(),
            None => self.state.nodes.len(),
        })
    }

    fn count_edges(&self, relation: Option<Relation>) -> Result<usize, StorageError> {
        Ok(match relation {
            Some(relation) => self
                .state
                .edges
                .keys()
                .filter(|(_, r, _)| *r == relation)
                .count(),
            None => self.state.edges.len(),
        })
    }
}
