//! Error types for coursegraph-sync.
//!
//! [`SyncError`] is what every public operation in this crate returns. Store
//! failures are split in two: [`SyncError::StoreUnavailable`] when the store
//! itself cannot be used, and [`SyncError::SyncFailure`] when a write went
//! wrong mid-run, tagged with the course/module/lesson being processed.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use coursegraph_core::CoreError;
use coursegraph_storage::StorageError;

/// Where in the content tree a failure happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncContext {
    pub course: Option<String>,
    pub module: Option<String>,
    pub lesson: Option<String>,
}

impl SyncContext {
    pub fn course(slug: &str) -> Self {
        SyncContext {
            course: Some(slug.to_string()),
            ..Default::default()
        }
    }
}

impl fmt::Display for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.course, &self.module, &self.lesson]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            f.write_str("batch")
        } else {
            f.write_str(&parts.join("/"))
        }
    }
}

/// Errors produced by synchronization and the sibling operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The content tree was rejected before any write.
    #[error("invalid content tree: {0}")]
    InvalidContentTree(#[from] CoreError),

    /// The store could not be opened, locked or reached.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StorageError),

    /// A write failed mid-run. The transaction was rolled back.
    #[error("sync failed at {context}: {source}")]
    SyncFailure {
        context: SyncContext,
        #[source]
        source: StorageError,
    },

    /// A sibling operation addressed an entity that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An external record source could not be read.
    #[error("source error: {0}")]
    Source(String),
}

impl SyncError {
    /// Classifies a storage error raised while processing `context`.
    pub fn from_storage(err: StorageError, context: SyncContext) -> Self {
        if err.is_unavailable() {
            SyncError::StoreUnavailable(err)
        } else {
            SyncError::SyncFailure {
                context,
                source: err,
            }
        }
    }

    /// Whether re-running the whole batch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::StoreUnavailable(_) | SyncError::SyncFailure { .. }
        )
    }
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        SyncError::from_storage(err, SyncContext::default())
    }
}
