//! The [`GraphStore`] trait defining the storage contract for the catalog
//! graph.
//!
//! The trait is the capability set the synchronizer needs and nothing more:
//! - **Transactions**: `begin`/`commit`/`rollback`. Writes issued outside a
//!   transaction are applied immediately.
//! - **Upserts**: match-or-create nodes by label and id, merge property maps,
//!   add or remove tags, match-or-create relationships.
//! - **Deletes**: relationships only. Nodes are never removed through this
//!   trait.
//! - **Traversals**: ordered children, same-relation chains, counts.
//!
//! All backends (InMemoryStore, SqliteStore) implement this trait, ensuring
//! they are fully swappable without changing the synchronizer.

use coursegraph_core::{NodeLabel, NodeRef, Relation, Tag};

use crate::error::StorageError;
use crate::types::{Direction, GraphStats, Properties, StoredEdge, StoredNode};

/// The storage contract for the catalog graph.
///
/// The trait is synchronous and takes `&mut self` for writes: one writer at
/// a time by construction.
pub trait GraphStore {
    // -------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------

    /// Opens a write transaction. Fails if one is already open.
    fn begin(&mut self) -> Result<(), StorageError>;

    /// Makes every write since [`GraphStore::begin`] durable.
    fn commit(&mut self) -> Result<(), StorageError>;

    /// Discards every write since [`GraphStore::begin`].
    fn rollback(&mut self) -> Result<(), StorageError>;

    // -------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------

    /// Matches the node or creates it with no tags and no properties.
    ///
    /// Returns `true` if the node was created.
    fn merge_node(&mut self, node: &NodeRef) -> Result<bool, StorageError>;

    /// Retrieves a node, or `None` if it does not exist.
    fn get_node(&self, node: &NodeRef) -> Result<Option<StoredNode>, StorageError>;

    /// Lists every node carrying `label`, ordered by id.
    fn nodes_with_label(&self, label: NodeLabel) -> Result<Vec<StoredNode>, StorageError>;

    /// Merges `properties` into an existing node. Null values remove keys.
    fn set_properties(
        &mut self,
        node: &NodeRef,
        properties: &Properties,
    ) -> Result<(), StorageError>;

    /// Adds a tag. Returns `true` if the node did not carry it before.
    fn add_tag(&mut self, node: &NodeRef, tag: Tag) -> Result<bool, StorageError>;

    /// Removes a tag. Returns `true` if the node carried it before.
    fn remove_tag(&mut self, node: &NodeRef, tag: Tag) -> Result<bool, StorageError>;

    // -------------------------------------------------------------------
    // Relationships
    // -------------------------------------------------------------------

    /// Matches the relationship or creates it, then merges `properties`
    /// into it. Both endpoints must exist.
    ///
    /// Returns `true` if the relationship was created.
    fn merge_edge(
        &mut self,
        source: &NodeRef,
        relation: Relation,
        target: &NodeRef,
        properties: &Properties,
    ) -> Result<bool, StorageError>;

    /// Lists the relationships of `node` whose type is in `relations`.
    fn edges(
        &self,
        node: &NodeRef,
        relations: &[Relation],
        direction: Direction,
    ) -> Result<Vec<StoredEdge>, StorageError>;

    /// Deletes the relationships of `node` whose type is in `relations`.
    ///
    /// Returns how many were deleted.
    fn delete_edges(
        &mut self,
        node: &NodeRef,
        relations: &[Relation],
        direction: Direction,
    ) -> Result<usize, StorageError>;

    // -------------------------------------------------------------------
    // Traversals
    // -------------------------------------------------------------------

    /// Targets of `parent`'s outgoing `relation` edges, ascending by the
    /// integer property `order_key`.
    fn children_ordered(
        &self,
        parent: &NodeRef,
        relation: Relation,
        order_key: &str,
    ) -> Result<Vec<StoredNode>, StorageError>;

    /// Walks `relation` edges from `start` until a node with no outgoing
    /// edge of that type. The result starts with `start`.
    ///
    /// Fails with [`StorageError::IntegrityError`] if the walk branches or
    /// revisits a node.
    fn follow_chain(
        &self,
        start: &NodeRef,
        relation: Relation,
    ) -> Result<Vec<NodeRef>, StorageError>;

    /// Counts nodes, optionally restricted to one label.
    fn count_nodes(&self, label: Option<NodeLabel>) -> Result<usize, StorageError>;

    /// Counts relationships, optionally restricted to one type.
    fn count_edges(&self, relation: Option<Relation>) -> Result<usize, StorageError>;

    // -------------------------------------------------------------------
    // Provided methods
    // -------------------------------------------------------------------

    /// The single target of `node`'s outgoing `relation` edge, if any.
    fn single_target(
        &self,
        node: &NodeRef,
        relation: Relation,
    ) -> Result<Option<NodeRef>, StorageError> {
        let edges = self.edges(node, &[relation], Direction::Outgoing)?;
        match edges.as_slice() {
            [] => Ok(None),
            [edge] => Ok(Some(edge.target.clone())),
            _ => Err(StorageError::IntegrityError {
                reason: format!("{} has {} outgoing {} edges", node, edges.len(), relation),
            }),
        }
    }

    /// Node and relationship totals for every label and relation type.
    fn stats(&self) -> Result<GraphStats, StorageError> {
        let mut stats = GraphStats::default();
        for label in NodeLabel::ALL {
            stats
                .nodes
                .insert(label.as_str().to_string(), self.count_nodes(Some(label))?);
        }
        for relation in Relation::ALL {
            stats
                .edges
                .insert(relation.as_str().to_string(), self.count_edges(Some(relation))?);
        }
        Ok(stats)
    }
}

/// Shared chain walk for backends: `next` yields the outgoing targets of a
/// node for the relation being followed.
pub(crate) fn walk_chain<F>(
    start: &NodeRef,
    relation: Relation,
    mut next: F,
) -> Result<Vec<NodeRef>, StorageError>
where
    F: FnMut(&NodeRef) -> Result<Vec<NodeRef>, StorageError>,
{
    let mut path = vec![start.clone()];
    let mut visited = std::collections::HashSet::new();
    visited.insert(start.clone());

    let mut current = start.clone();
    loop {
        let targets = next(&current)?;
        let target = match targets.as_slice() {
            [] => return Ok(path),
            [target] => target.clone(),
            _ => {
                return Err(StorageError::IntegrityError {
                    reason: format!("{} chain branches at {}", relation, current),
                })
            }
        };
        if !visited.insert(target.clone()) {
            return Err(StorageError::IntegrityError {
                reason: format!("{} chain revisits {}", relation, target),
            });
        }
        path.push(target.clone());
        current = target;
    }
}
