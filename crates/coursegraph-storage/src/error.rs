//! Storage error types for coursegraph-storage.
//!
//! [`StorageError`] covers all anticipated failure modes in the storage layer:
//! backend errors, serialization, missing nodes, transaction misuse and
//! integrity violations found while traversing.

use rusqlite::ErrorCode;
use thiserror::Error;

use coursegraph_core::NodeRef;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite backend reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// Reading a backing file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A node referenced by a write does not exist.
    #[error("node not found: {node}")]
    NodeNotFound { node: NodeRef },

    /// `begin`/`commit`/`rollback` called out of sequence.
    #[error("transaction error: {reason}")]
    Transaction { reason: String },

    /// A data integrity violation was detected.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },
}

impl StorageError {
    /// Whether the error means the store itself cannot be reached or used,
    /// as opposed to a single write going wrong.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::CannotOpen
                    | ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::NotADatabase
                    | ErrorCode::PermissionDenied
                    | ErrorCode::ReadOnly
                    | ErrorCode::SystemIoFailure
            ),
            StorageError::Migration(_) | StorageError::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: std::os::raw::c_int) -> StorageError {
        StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn busy_and_cannot_open_are_unavailable() {
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_unavailable());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_CANTOPEN).is_unavailable());
    }

    #[test]
    fn constraint_violation_is_not_unavailable() {
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).is_unavailable());
        let missing = StorageError::NodeNotFound {
            node: NodeRef::course("gone"),
        };
        assert!(!missing.is_unavailable());
    }
}
