//! Progress annotation over a course's continuous lesson path.
//!
//! The path starts at the first lesson of the first module that has lessons
//! and follows `NEXT` to the end of the course, crossing module boundaries
//! through the bridge edges.

use serde_json::json;

use coursegraph_core::{NodeRef, Relation};
use coursegraph_storage::{GraphStore, Properties, StorageError};

/// Property written on every lesson of the path.
pub const PROGRESS_KEY: &str = "progressPercentage";

/// `round(index / len * 100)`.
///
/// The last position of a path never reaches 100: a four-lesson course
/// yields `[0, 25, 50, 75]`. Callers rely on these exact values.
pub fn progress_percentage(index: usize, len: usize) -> u32 {
    if len == 0 {
        return 0;
    }
    ((index as f64 / len as f64) * 100.0).round() as u32
}

/// The ordered lesson path of `course`, or empty if it has no lessons.
pub fn course_path<S: GraphStore + ?Sized>(
    store: &S,
    course: &NodeRef,
) -> Result<Vec<NodeRef>, StorageError> {
    let Some(first_module) = store.single_target(course, Relation::FirstModule)? else {
        return Ok(Vec::new());
    };

    for module in store.follow_chain(&first_module, Relation::NextModule)? {
        if let Some(first_lesson) = store.single_target(&module, Relation::FirstLesson)? {
            return store.follow_chain(&first_lesson, Relation::Next);
        }
    }
    Ok(Vec::new())
}

/// Writes the progress percentage of every node on `path`. Returns how many
/// nodes were annotated.
pub fn annotate<S: GraphStore + ?Sized>(
    store: &mut S,
    path: &[NodeRef],
) -> Result<usize, StorageError> {
    for (index, node) in path.iter().enumerate() {
        let mut props = Properties::new();
        props.insert(
            PROGRESS_KEY.to_string(),
            json!(progress_percentage(index, path.len())),
        );
        store.set_properties(node, &props)?;
    }
    Ok(path.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{build_chain, LESSON_CHAIN, MODULE_CHAIN};
    use coursegraph_storage::InMemoryStore;
    use proptest::prelude::*;

    #[test]
    fn four_lessons_give_quarter_steps() {
        let values: Vec<u32> = (0..4).map(|i| progress_percentage(i, 4)).collect();
        assert_eq!(values, [0, 25, 50, 75]);
    }

    // The last lesson stays below 100. Kept for compatibility with
    // progress values already stored against enrolments.
    #[test]
    fn last_lesson_does_not_reach_one_hundred() {
        assert_eq!(progress_percentage(3, 4), 75);
        assert_eq!(progress_percentage(0, 1), 0);
        assert_eq!(progress_percentage(2, 3), 67);
    }

    proptest! {
        #[test]
        fn strictly_increasing_up_to_one_hundred_lessons(len in 1usize..=100) {
            let values: Vec<u32> = (0..len).map(|i| progress_percentage(i, len)).collect();
            prop_assert_eq!(values[0], 0);
            prop_assert!(values.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(values[len - 1] < 100);
        }

        #[test]
        fn never_decreasing_for_long_paths(len in 1usize..2000) {
            let values: Vec<u32> = (0..len).map(|i| progress_percentage(i, len)).collect();
            prop_assert!(values.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    /// Course `c` with two modules, the first one empty.
    fn course_with_empty_first_module(store: &mut InMemoryStore) -> (NodeRef, Vec<NodeRef>) {
        let course = NodeRef::course("c");
        let empty = NodeRef::module("c", "empty");
        let full = NodeRef::module("c", "full");
        let lessons: Vec<NodeRef> = ["a", "b"].iter().map(|s| NodeRef::lesson("c", "full", s)).collect();
        for node in [&course, &empty, &full].into_iter().chain(&lessons) {
            store.merge_node(node).unwrap();
        }
        build_chain(store, &course, &[empty, full.clone()], MODULE_CHAIN).unwrap();
        build_chain(store, &full, &lessons, LESSON_CHAIN).unwrap();
        (course, lessons)
    }

    #[test]
    fn path_skips_modules_without_lessons() {
        let mut store = InMemoryStore::new();
        let (course, lessons) = course_with_empty_first_module(&mut store);
        assert_eq!(course_path(&store, &course).unwrap(), lessons);
    }

    #[test]
    fn annotate_writes_integer_percentages() {
        let mut store = InMemoryStore::new();
        let (course, lessons) = course_with_empty_first_module(&mut store);
        let path = course_path(&store, &course).unwrap();
        assert_eq!(annotate(&mut store, &path).unwrap(), 2);

        let second = store.get_node(&lessons[1]).unwrap().unwrap();
        assert_eq!(second.int_property(PROGRESS_KEY), Some(50));
    }

    #[test]
    fn course_without_modules_has_empty_path() {
        let mut store = InMemoryStore::new();
        let course = NodeRef::course("c");
        store.merge_node(&course).unwrap();
        assert!(course_path(&store, &course).unwrap().is_empty());
        assert_eq!(annotate(&mut store, &[]).unwrap(), 0);
    }
}
