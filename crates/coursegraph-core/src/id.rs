//! Stable identities for persisted graph entities.
//!
//! Every node identifier is derived from the entity's natural key: the
//! ordered path of slugs leading to it in the content tree. The segments are
//! joined with [`KEY_SEPARATOR`] and base64-encoded, which keeps identifiers
//! compatible with graphs written by earlier importers and makes them stable
//! across runs and process restarts. Nothing here performs I/O or keeps
//! counters.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::schema::NodeLabel;

/// Separator placed between natural-key segments before encoding.
pub const KEY_SEPARATOR: &str = "--";

/// Identifier of a persisted node, unique within its [`NodeLabel`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to a node: the label it lives under plus its identifier.
///
/// The store matches and creates nodes by this pair, so two entities of
/// different kinds never collide even if their identifiers happen to match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: NodeLabel,
    pub id: NodeId,
}

impl NodeRef {
    pub fn new(label: NodeLabel, id: NodeId) -> Self {
        NodeRef { label, id }
    }

    pub fn course(slug: &str) -> Self {
        NodeRef::new(NodeLabel::Course, course_id(slug))
    }

    pub fn category(name: &str) -> Self {
        NodeRef::new(NodeLabel::Category, category_id(name))
    }

    pub fn module(course: &str, module: &str) -> Self {
        NodeRef::new(NodeLabel::Module, module_id(course, module))
    }

    pub fn lesson(course: &str, module: &str, lesson: &str) -> Self {
        NodeRef::new(NodeLabel::Lesson, lesson_id(course, module, lesson))
    }

    pub fn question(lesson: &NodeId, question: &str) -> Self {
        NodeRef::new(NodeLabel::Question, question_id(lesson, question))
    }

    /// Users are keyed by their identity-provider subject, verbatim.
    pub fn user(sub: &str) -> Self {
        NodeRef::new(NodeLabel::User, NodeId(sub.to_string()))
    }

    pub fn enrolment(course: &str, sub: &str) -> Self {
        NodeRef::new(NodeLabel::Enrolment, enrolment_id(course, sub))
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label, self.id)
    }
}

/// Resolves the identifier for a natural key.
///
/// # Panics
///
/// Panics if `segments` is empty. Every entity has at least one key segment,
/// so an empty key is a programming error rather than bad input.
pub fn resolve_id<S: AsRef<str>>(segments: &[S]) -> NodeId {
    assert!(
        !segments.is_empty(),
        "resolve_id requires at least one key segment"
    );
    let joined = segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(KEY_SEPARATOR);
    NodeId(STANDARD.encode(joined))
}

pub fn course_id(course: &str) -> NodeId {
    resolve_id(&[course])
}

pub fn category_id(category: &str) -> NodeId {
    resolve_id(&[category])
}

pub fn module_id(course: &str, module: &str) -> NodeId {
    resolve_id(&[course, module])
}

pub fn lesson_id(course: &str, module: &str, lesson: &str) -> NodeId {
    resolve_id(&[course, module, lesson])
}

/// Questions are keyed under their lesson's identifier, not its slug path.
pub fn question_id(lesson: &NodeId, question: &str) -> NodeId {
    resolve_id(&[lesson.as_str(), question])
}

pub fn enrolment_id(course: &str, sub: &str) -> NodeId {
    resolve_id(&[course, sub])
}
