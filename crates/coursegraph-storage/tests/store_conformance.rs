//! Behavioural conformance tests run against every [`GraphStore`] backend.
//!
//! Each scenario is written once against `&mut dyn GraphStore` and invoked
//! for both the in-memory store and a SQLite store on a temp file, so the two
//! backends cannot drift apart.

use serde_json::json;

use coursegraph_core::{NodeLabel, NodeRef, Relation, Tag};
use coursegraph_storage::{
    Direction, GraphStore, InMemoryStore, Properties, SqliteStore, StorageError,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn props(pairs: &[(&str, serde_json::Value)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Runs `scenario` against a fresh store of each kind.
fn for_each_backend(scenario: fn(&mut dyn GraphStore)) {
    let mut memory = InMemoryStore::new();
    scenario(&mut memory);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conformance.db");
    let mut sqlite = SqliteStore::new(path.to_str().unwrap()).unwrap();
    scenario(&mut sqlite);
}

/// Builds module `m` of course `c` with lessons linked by HAS_LESSON and
/// chained by NEXT in the given order.
fn seed_module(store: &mut dyn GraphStore, slugs: &[&str]) -> (NodeRef, Vec<NodeRef>) {
    let module = NodeRef::module("c", "m");
    store.merge_node(&module).unwrap();
    let mut lessons = Vec::new();
    for (order, slug) in slugs.iter().enumerate() {
        let lesson = NodeRef::lesson("c", "m", slug);
        store.merge_node(&lesson).unwrap();
        store
            .set_properties(&lesson, &props(&[("slug", json!(slug)), ("order", json!(order))]))
            .unwrap();
        store
            .merge_edge(&module, Relation::HasLesson, &lesson, &Properties::new())
            .unwrap();
        lessons.push(lesson);
    }
    for pair in lessons.windows(2) {
        store
            .merge_edge(&pair[0], Relation::Next, &pair[1], &Properties::new())
            .unwrap();
    }
    (module, lessons)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn properties_merge_and_null_removes() {
    for_each_backend(|store| {
        let course = NodeRef::course("cypher");
        store.merge_node(&course).unwrap();
        store
            .set_properties(&course, &props(&[("title", json!("Cypher")), ("caption", json!("x"))]))
            .unwrap();
        store
            .set_properties(&course, &props(&[("caption", serde_json::Value::Null)]))
            .unwrap();

        let stored = store.get_node(&course).unwrap().unwrap();
        assert_eq!(stored.str_property("title"), Some("Cypher"));
        assert!(stored.property("caption").is_none());
    });
}

#[test]
fn nodes_are_never_deleted_by_edge_removal() {
    for_each_backend(|store| {
        let (module, lessons) = seed_module(store, &["a", "b", "c"]);
        let deleted = store
            .delete_edges(&module, &[Relation::HasLesson], Direction::Outgoing)
            .unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(store.count_nodes(Some(NodeLabel::Lesson)).unwrap(), 3);
        assert_eq!(store.count_edges(Some(Relation::Next)).unwrap(), 2);
        assert!(store.get_node(&lessons[0]).unwrap().is_some());
    });
}

#[test]
fn ordered_children_and_chain_agree() {
    for_each_backend(|store| {
        let (module, lessons) = seed_module(store, &["intro", "match", "where"]);
        let children: Vec<NodeRef> = store
            .children_ordered(&module, Relation::HasLesson, "order")
            .unwrap()
            .into_iter()
            .map(|n| n.node)
            .collect();
        assert_eq!(children, lessons);
        assert_eq!(store.follow_chain(&lessons[0], Relation::Next).unwrap(), lessons);
    });
}

#[test]
fn edges_filter_by_relation_and_direction() {
    for_each_backend(|store| {
        let (module, lessons) = seed_module(store, &["a", "b", "c"]);
        store
            .merge_edge(&module, Relation::FirstLesson, &lessons[0], &Properties::new())
            .unwrap();

        let middle_next = store
            .edges(&lessons[1], &[Relation::Next], Direction::Both)
            .unwrap();
        assert_eq!(middle_next.len(), 2);

        let into_first = store
            .edges(&lessons[0], &[Relation::HasLesson, Relation::FirstLesson], Direction::Incoming)
            .unwrap();
        assert_eq!(into_first.len(), 2);
        assert!(into_first.iter().all(|e| e.source == module));

        assert_eq!(
            store.single_target(&module, Relation::FirstLesson).unwrap(),
            Some(lessons[0].clone())
        );
        assert!(store.single_target(&module, Relation::HasLesson).is_err());
    });
}

#[test]
fn tags_toggle_and_report_changes() {
    for_each_backend(|store| {
        let lesson = NodeRef::lesson("c", "m", "l");
        store.merge_node(&lesson).unwrap();
        assert!(store.add_tag(&lesson, Tag::OptionalLesson).unwrap());
        assert!(store.add_tag(&lesson, Tag::DeletedLesson).unwrap());
        assert!(store.remove_tag(&lesson, Tag::OptionalLesson).unwrap());

        let stored = store.get_node(&lesson).unwrap().unwrap();
        assert!(stored.has_tag(Tag::DeletedLesson));
        assert!(!stored.has_tag(Tag::OptionalLesson));
    });
}

#[test]
fn rollback_restores_everything_written_since_begin() {
    for_each_backend(|store| {
        let (module, lessons) = seed_module(store, &["a", "b"]);

        store.begin().unwrap();
        store
            .delete_edges(&lessons[0], &[Relation::Next], Direction::Both)
            .unwrap();
        store.add_tag(&module, Tag::DeletedModule).unwrap();
        store.merge_node(&NodeRef::course("new")).unwrap();
        store.rollback().unwrap();

        assert_eq!(store.count_edges(Some(Relation::Next)).unwrap(), 1);
        assert!(store.get_node(&module).unwrap().unwrap().tags.is_empty());
        assert_eq!(store.count_nodes(Some(NodeLabel::Course)).unwrap(), 0);
    });
}

#[test]
fn writes_to_missing_nodes_fail() {
    for_each_backend(|store| {
        let ghost = NodeRef::course("ghost");
        assert!(matches!(
            store.add_tag(&ghost, Tag::FromCommunityGraph).unwrap_err(),
            StorageError::NodeNotFound { .. }
        ));
        assert!(store.get_node(&ghost).unwrap().is_none());
        assert!(store.follow_chain(&ghost, Relation::Next).is_err());
    });
}

#[test]
fn nodes_with_label_lists_only_that_label() {
    for_each_backend(|store| {
        store.merge_node(&NodeRef::course("b")).unwrap();
        store.merge_node(&NodeRef::course("a")).unwrap();
        store.merge_node(&NodeRef::category("x")).unwrap();
        let courses = store.nodes_with_label(NodeLabel::Course).unwrap();
        assert_eq!(courses.len(), 2);
        assert!(courses.iter().all(|n| n.node.label == NodeLabel::Course));

        let stats = store.stats().unwrap();
        assert_eq!(stats.nodes["Course"], 2);
        assert_eq!(stats.nodes["Category"], 1);
    });
}
