//! Catalog validation and dense re-indexing.
//!
//! [`validate_catalog`] rejects malformed trees before anything touches the
//! store. [`normalize`] then sorts modules and lessons by their declared
//! order and rewrites that order as `0..n-1`, so the persisted `order`
//! property never carries gaps or the loader's raw ordering keys.

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::error::CoreError;
use crate::tree::{CourseTree, LessonTree, ModuleTree};

/// Validates a whole catalog, failing on the first problem found.
pub fn validate_catalog(courses: &[CourseTree]) -> Result<(), CoreError> {
    let mut course_slugs = HashSet::new();
    for course in courses {
        require_slug(&course.slug, "catalog")?;
        if !course_slugs.insert(course.slug.as_str()) {
            return Err(CoreError::DuplicateSlug {
                path: "catalog".into(),
                slug: course.slug.clone(),
            });
        }
        validate_course(course)?;
    }
    check_prerequisite_cycles(courses)
}

fn validate_course(course: &CourseTree) -> Result<(), CoreError> {
    let path = course.slug.as_str();

    for category in &course.categories {
        require_slug(&category.category, &format!("{}/categories", path))?;
    }

    for slug in course.prerequisite_slugs.iter().chain(&course.progress_to_slugs) {
        require_slug(slug, &format!("{}/prerequisites", path))?;
        if *slug == course.slug {
            return Err(CoreError::SelfPrerequisite {
                course: course.slug.clone(),
            });
        }
    }

    check_siblings(
        path,
        course.modules.iter().map(|m| (m.slug.as_str(), m.order)),
    )?;
    for module in &course.modules {
        validate_module(path, module)?;
    }
    Ok(())
}

fn validate_module(course_path: &str, module: &ModuleTree) -> Result<(), CoreError> {
    let path = format!("{}/{}", course_path, module.slug);
    check_siblings(
        &path,
        module.lessons.iter().map(|l| (l.slug.as_str(), l.order)),
    )?;
    for lesson in &module.lessons {
        validate_lesson(&path, lesson)?;
    }
    Ok(())
}

fn validate_lesson(module_path: &str, lesson: &LessonTree) -> Result<(), CoreError> {
    let path = format!("{}/{}", module_path, lesson.slug);
    let mut seen = HashSet::new();
    for question in &lesson.questions {
        require_slug(&question.id, &format!("{}/questions", path))?;
        if !seen.insert(question.id.as_str()) {
            return Err(CoreError::DuplicateSlug {
                path: path.clone(),
                slug: question.id.clone(),
            });
        }
    }
    Ok(())
}

/// Checks a sibling group: non-empty unique slugs, non-negative unique orders.
fn check_siblings<'a>(
    parent: &str,
    siblings: impl Iterator<Item = (&'a str, i64)>,
) -> Result<(), CoreError> {
    let mut slugs = HashSet::new();
    let mut orders = HashSet::new();
    for (slug, order) in siblings {
        require_slug(slug, parent)?;
        if !slugs.insert(slug) {
            return Err(CoreError::DuplicateSlug {
                path: parent.to_string(),
                slug: slug.to_string(),
            });
        }
        if order < 0 {
            return Err(CoreError::NegativeOrder {
                path: format!("{}/{}", parent, slug),
                order,
            });
        }
        if !orders.insert(order) {
            return Err(CoreError::DuplicateOrder {
                path: parent.to_string(),
                order,
            });
        }
    }
    Ok(())
}

fn require_slug(slug: &str, path: &str) -> Result<(), CoreError> {
    if slug.trim().is_empty() {
        return Err(CoreError::MissingSlug {
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Rejects catalogs whose declared prerequisite edges form a cycle.
///
/// Edges point from a course to the course it depends on; `progressTo`
/// entries contribute the reverse direction.
fn check_prerequisite_cycles(courses: &[CourseTree]) -> Result<(), CoreError> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for course in courses {
        graph.add_node(course.slug.as_str());
        for prerequisite in &course.prerequisite_slugs {
            graph.add_edge(course.slug.as_str(), prerequisite.as_str(), ());
        }
        for next in &course.progress_to_slugs {
            graph.add_edge(next.as_str(), course.slug.as_str(), ());
        }
    }

    toposort(&graph, None)
        .map(|_| ())
        .map_err(|cycle| CoreError::PrerequisiteCycle {
            course: cycle.node_id().to_string(),
        })
}

/// Sorts modules and lessons by declared order and re-derives dense
/// `0..n-1` orders. Expects a catalog that passed [`validate_catalog`].
pub fn normalize(mut courses: Vec<CourseTree>) -> Vec<CourseTree> {
    for course in &mut courses {
        course.modules.sort_by_key(|m| m.order);
        for (index, module) in course.modules.iter_mut().enumerate() {
            module.order = index as i64;
            module.lessons.sort_by_key(|l| l.order);
            for (index, lesson) in module.lessons.iter_mut().enumerate() {
                lesson.order = index as i64;
            }
        }
    }
    courses
}

/// Validates then normalizes a catalog.
pub fn prepare(courses: Vec<CourseTree>) -> Result<Vec<CourseTree>, CoreError> {
    validate_catalog(&courses)?;
    Ok(normalize(courses))
}
