//! Sibling chains: a singly-linked ordering over a parent's children with
//! first and last sentinels hanging off the parent.
//!
//! Chains are always rebuilt from scratch. Callers remove the old chain
//! first (see [`clear_chain`]), so the result is a simple path by
//! construction.

use coursegraph_core::{NodeRef, Relation};
use coursegraph_storage::{Direction, GraphStore, Properties, StorageError};

/// The three relationship types that make up one kind of chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSpec {
    /// Links each item to its successor.
    pub next: Relation,
    /// Parent to the first item.
    pub first: Relation,
    /// Parent to the last item.
    pub last: Relation,
}

/// Lessons within a module.
pub const LESSON_CHAIN: ChainSpec = ChainSpec {
    next: Relation::Next,
    first: Relation::FirstLesson,
    last: Relation::LastLesson,
};

/// Modules within a course.
pub const MODULE_CHAIN: ChainSpec = ChainSpec {
    next: Relation::NextModule,
    first: Relation::FirstModule,
    last: Relation::LastModule,
};

/// Relationship counts produced by one chain operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainStats {
    pub created: usize,
    pub deleted: usize,
}

/// Links `items` in order under `parent`.
///
/// Creates `items[i] -next-> items[i+1]` for every adjacent pair plus the
/// first and last sentinels. An empty slice creates nothing.
pub fn build_chain<S: GraphStore + ?Sized>(
    store: &mut S,
    parent: &NodeRef,
    items: &[NodeRef],
    spec: ChainSpec,
) -> Result<ChainStats, StorageError> {
    let mut stats = ChainStats::default();
    let (Some(first), Some(last)) = (items.first(), items.last()) else {
        return Ok(stats);
    };

    let none = Properties::new();
    for pair in items.windows(2) {
        stats.created += usize::from(store.merge_edge(&pair[0], spec.next, &pair[1], &none)?);
    }
    stats.created += usize::from(store.merge_edge(parent, spec.first, first, &none)?);
    stats.created += usize::from(store.merge_edge(parent, spec.last, last, &none)?);
    Ok(stats)
}

/// Removes the sentinels under `parent` and every `next` edge touching
/// `items`, in both directions.
pub fn clear_chain<S: GraphStore + ?Sized>(
    store: &mut S,
    parent: &NodeRef,
    items: &[NodeRef],
    spec: ChainSpec,
) -> Result<ChainStats, StorageError> {
    let mut stats = ChainStats::default();
    stats.deleted += store.delete_edges(parent, &[spec.first, spec.last], Direction::Outgoing)?;
    for item in items {
        stats.deleted += store.delete_edges(item, &[spec.next], Direction::Both)?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursegraph_storage::InMemoryStore;

    fn seed(store: &mut InMemoryStore, slugs: &[&str]) -> (NodeRef, Vec<NodeRef>) {
        let module = NodeRef::module("c", "m");
        store.merge_node(&module).unwrap();
        let lessons: Vec<NodeRef> = slugs.iter().map(|s| NodeRef::lesson("c", "m", s)).collect();
        for lesson in &lessons {
            store.merge_node(lesson).unwrap();
        }
        (module, lessons)
    }

    #[test]
    fn links_adjacent_pairs_and_sentinels() {
        let mut store = InMemoryStore::new();
        let (module, lessons) = seed(&mut store, &["a", "b", "c"]);

        let stats = build_chain(&mut store, &module, &lessons, LESSON_CHAIN).unwrap();
        assert_eq!(stats.created, 4);
        assert_eq!(store.follow_chain(&lessons[0], Relation::Next).unwrap(), lessons);
        assert_eq!(
            store.single_target(&module, Relation::FirstLesson).unwrap(),
            Some(lessons[0].clone())
        );
        assert_eq!(
            store.single_target(&module, Relation::LastLesson).unwrap(),
            Some(lessons[2].clone())
        );
    }

    #[test]
    fn single_item_is_both_first_and_last() {
        let mut store = InMemoryStore::new();
        let (module, lessons) = seed(&mut store, &["only"]);
        build_chain(&mut store, &module, &lessons, LESSON_CHAIN).unwrap();
        assert_eq!(store.count_edges(Some(Relation::Next)).unwrap(), 0);
        assert_eq!(store.count_edges(Some(Relation::FirstLesson)).unwrap(), 1);
        assert_eq!(store.count_edges(Some(Relation::LastLesson)).unwrap(), 1);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut store = InMemoryStore::new();
        let (module, _) = seed(&mut store, &[]);
        let stats = build_chain(&mut store, &module, &[], LESSON_CHAIN).unwrap();
        assert_eq!(stats, ChainStats::default());
        assert_eq!(store.count_edges(None).unwrap(), 0);
    }

    #[test]
    fn clear_then_rebuild_follows_new_order() {
        let mut store = InMemoryStore::new();
        let (module, lessons) = seed(&mut store, &["a", "b", "c"]);
        build_chain(&mut store, &module, &lessons, LESSON_CHAIN).unwrap();

        let cleared = clear_chain(&mut store, &module, &lessons, LESSON_CHAIN).unwrap();
        assert_eq!(cleared.deleted, 4);

        let reordered = vec![lessons[1].clone(), lessons[0].clone(), lessons[2].clone()];
        build_chain(&mut store, &module, &reordered, LESSON_CHAIN).unwrap();
        assert_eq!(store.follow_chain(&lessons[1], Relation::Next).unwrap(), reordered);
        assert_eq!(store.count_edges(Some(Relation::Next)).unwrap(), 2);
    }
}
