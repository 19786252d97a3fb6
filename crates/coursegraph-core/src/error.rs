//! Core error types for coursegraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! ways an incoming content tree can be malformed. Every variant carries the
//! tree path (`course/module/lesson`) at which the problem was found.

use thiserror::Error;

/// Core errors produced by the coursegraph-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A course, module, lesson, question or category has an empty slug.
    #[error("missing slug at '{path}'")]
    MissingSlug { path: String },

    /// Two siblings resolve to the same slug, which would collapse their
    /// identities into one node.
    #[error("duplicate slug '{slug}' under '{path}'")]
    DuplicateSlug { path: String, slug: String },

    /// A module or lesson declares a negative order.
    #[error("negative order {order} at '{path}'")]
    NegativeOrder { path: String, order: i64 },

    /// Two siblings declare the same order, so their relative position is
    /// undefined.
    #[error("duplicate order {order} under '{path}'")]
    DuplicateOrder { path: String, order: i64 },

    /// A course lists itself as a prerequisite or progression target.
    #[error("course '{course}' references itself as a prerequisite")]
    SelfPrerequisite { course: String },

    /// The prerequisite relationships declared in one catalog form a cycle.
    #[error("prerequisite cycle detected through course '{course}'")]
    PrerequisiteCycle { course: String },

    /// Canonical serialization of the content tree failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
