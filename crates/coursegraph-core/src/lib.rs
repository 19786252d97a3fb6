pub mod error;
pub mod id;
pub mod schema;
pub mod tree;
pub mod validate;

// Re-export commonly used types
pub use error::CoreError;
pub use id::{NodeId, NodeRef};
pub use schema::{NodeLabel, Relation, Tag};
pub use tree::{CategoryRef, CourseStatus, CourseTree, LessonTree, LessonType, ModuleTree, QuestionTree};
pub use validate::{normalize, prepare, validate_catalog};
