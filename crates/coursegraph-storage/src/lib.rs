//! Storage abstraction for the course catalog graph.
//!
//! Provides the [`GraphStore`] trait defining the storage contract that all
//! backends implement, plus the [`InMemoryStore`] and [`SqliteStore`] as
//! first-class backends.
//!
//! The graph is a labelled property graph: nodes are matched by
//! [`NodeRef`](coursegraph_core::NodeRef), carry a set of removable tags and a
//! JSON property map, and relationships are unique per (source, type, target).
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: stored node/edge types and property helpers
//! - [`traits`]: GraphStore trait definition
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: migration setup and connection configuration
//! - [`sqlite`]: SqliteStore implementation

pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use error::StorageError;
pub use memory::InMemoryStore;
pub use schema::SqliteConfig;
pub use sqlite::SqliteStore;
pub use traits::GraphStore;
pub use types::{Direction, GraphStats, Properties, StoredEdge, StoredNode};
