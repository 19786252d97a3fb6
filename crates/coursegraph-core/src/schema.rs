//! Graph vocabulary: node labels, removable node markers, and relationship
//! types.
//!
//! The string forms returned by `as_str` are what backends persist, so they
//! must never change once written.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Node labels
// ---------------------------------------------------------------------------

/// The primary label of a node. Every node has exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Course,
    Category,
    Module,
    Lesson,
    Question,
    User,
    Enrolment,
}

impl NodeLabel {
    pub const ALL: [NodeLabel; 7] = [
        NodeLabel::Course,
        NodeLabel::Category,
        NodeLabel::Module,
        NodeLabel::Lesson,
        NodeLabel::Question,
        NodeLabel::User,
        NodeLabel::Enrolment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Course => "Course",
            NodeLabel::Category => "Category",
            NodeLabel::Module => "Module",
            NodeLabel::Lesson => "Lesson",
            NodeLabel::Question => "Question",
            NodeLabel::User => "User",
            NodeLabel::Enrolment => "Enrolment",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| format!("unknown node label '{}'", s))
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// A removable marker on a node.
///
/// The `Deleted*` tags are tombstones: the node is absent from the latest
/// content tree but is kept because enrolments and certificates reference
/// its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tag {
    DeletedModule,
    DeletedLesson,
    DeletedQuestion,
    OptionalLesson,
    CompletedEnrolment,
    FromCommunityGraph,
}

impl Tag {
    pub const ALL: [Tag; 6] = [
        Tag::DeletedModule,
        Tag::DeletedLesson,
        Tag::DeletedQuestion,
        Tag::OptionalLesson,
        Tag::CompletedEnrolment,
        Tag::FromCommunityGraph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::DeletedModule => "DeletedModule",
            Tag::DeletedLesson => "DeletedLesson",
            Tag::DeletedQuestion => "DeletedQuestion",
            Tag::OptionalLesson => "OptionalLesson",
            Tag::CompletedEnrolment => "CompletedEnrolment",
            Tag::FromCommunityGraph => "FromCommunityGraph",
        }
    }

    /// The tombstone tag for nodes of `label`, if that label can be
    /// tombstoned at all.
    pub fn tombstone_for(label: NodeLabel) -> Option<Tag> {
        match label {
            NodeLabel::Module => Some(Tag::DeletedModule),
            NodeLabel::Lesson => Some(Tag::DeletedLesson),
            NodeLabel::Question => Some(Tag::DeletedQuestion),
            _ => None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| format!("unknown tag '{}'", s))
    }
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// Directed relationship types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    /// Course -> Category, carries an `order` property.
    InCategory,
    /// Course -> Course it depends on.
    Prerequisite,
    HasModule,
    FirstModule,
    LastModule,
    /// Module -> following module within a course.
    NextModule,
    HasLesson,
    FirstLesson,
    LastLesson,
    /// Lesson -> following lesson, including across module boundaries.
    Next,
    HasQuestion,
    HasEnrolment,
    ForCourse,
}

impl Relation {
    pub const ALL: [Relation; 13] = [
        Relation::InCategory,
        Relation::Prerequisite,
        Relation::HasModule,
        Relation::FirstModule,
        Relation::LastModule,
        Relation::NextModule,
        Relation::HasLesson,
        Relation::FirstLesson,
        Relation::LastLesson,
        Relation::Next,
        Relation::HasQuestion,
        Relation::HasEnrolment,
        Relation::ForCourse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::InCategory => "IN_CATEGORY",
            Relation::Prerequisite => "PREREQUISITE",
            Relation::HasModule => "HAS_MODULE",
            Relation::FirstModule => "FIRST_MODULE",
            Relation::LastModule => "LAST_MODULE",
            Relation::NextModule => "NEXT_MODULE",
            Relation::HasLesson => "HAS_LESSON",
            Relation::FirstLesson => "FIRST_LESSON",
            Relation::LastLesson => "LAST_LESSON",
            Relation::Next => "NEXT",
            Relation::HasQuestion => "HAS_QUESTION",
            Relation::HasEnrolment => "HAS_ENROLMENT",
            Relation::ForCourse => "FOR_COURSE",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Relation::ALL
            .into_iter()
            .find(|rel| rel.as_str() == s)
            .ok_or_else(|| format!("unknown relation '{}'", s))
    }
}
