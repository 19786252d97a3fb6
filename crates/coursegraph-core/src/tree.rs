//! The content tree: the ordered, in-memory catalog produced by the content
//! loader and consumed by the synchronizer.
//!
//! Course -> Module -> Lesson -> Question. Every type round-trips through
//! JSON with camelCase keys, which is how the loader hands catalogs over.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_CATEGORY_ORDER: i64 = 1;

/// Publication status of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    #[default]
    Active,
    Disabled,
}

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Active => "active",
            CourseStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lesson presentation type. Open-ended: unknown names are carried through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LessonType {
    #[default]
    Default,
    Text,
    Other(String),
}

impl LessonType {
    pub fn as_str(&self) -> &str {
        match self {
            LessonType::Default => "default",
            LessonType::Text => "text",
            LessonType::Other(name) => name,
        }
    }
}

impl From<String> for LessonType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "default" => LessonType::Default,
            "text" => LessonType::Text,
            _ => LessonType::Other(value),
        }
    }
}

impl From<LessonType> for String {
    fn from(value: LessonType) -> Self {
        value.as_str().to_string()
    }
}

/// Membership of a course in a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    #[serde(alias = "name")]
    pub category: String,
    #[serde(default = "default_category_order")]
    pub order: i64,
}

fn default_category_order() -> i64 {
    DEFAULT_CATEGORY_ORDER
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseTree {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    /// `None` falls back to the synchronizer's default status.
    #[serde(default)]
    pub status: Option<CourseStatus>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub usecase: Option<String>,
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    /// Free-form attributes merged onto the course node.
    #[serde(default)]
    pub attributes: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
    /// Courses that should be taken before this one.
    #[serde(default)]
    pub prerequisite_slugs: Vec<String>,
    /// Courses this one leads on to.
    #[serde(default)]
    pub progress_to_slugs: Vec<String>,
    #[serde(default)]
    pub modules: Vec<ModuleTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleTree {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    pub order: i64,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub lessons: Vec<LessonTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonTree {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub lesson_type: LessonType,
    pub order: i64,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub disable_cache: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub questions: Vec<QuestionTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionTree {
    #[serde(alias = "slug")]
    pub id: String,
    #[serde(default)]
    pub text: String,
}

impl CourseTree {
    /// Total number of lessons across all modules.
    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|m| m.lessons.len()).sum()
    }
}

/// Computes a blake3 digest of a catalog.
///
/// Deterministic: the tree holds only `Vec` and `IndexMap` collections, so
/// its JSON form is stable for equal input.
pub fn catalog_digest(courses: &[CourseTree]) -> Result<blake3::Hash, CoreError> {
    let bytes = serde_json::to_vec(courses)?;
    Ok(blake3::hash(&bytes))
}
