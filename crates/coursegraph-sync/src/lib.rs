//! Catalog synchronization for the course content graph.
//!
//! [`synchronize`] reconciles a store against a freshly loaded catalog:
//! nodes keep stable identities across runs, content missing from the
//! catalog is tombstoned instead of deleted, and the lesson and module chains
//! used for navigation are rebuilt from scratch together with each lesson's
//! progress percentage. The whole run is one transaction.
//!
//! Two smaller operations share the same store and error policy:
//! [`profile::update_user`] and [`certification::import_certifications`].
//!
//! # Modules
//!
//! - [`reconcile`]: the staged reconciler and its [`Session`]
//! - [`chain`]: sibling chain building
//! - [`progress`]: course path discovery and progress annotation
//! - [`profile`]: user profile updates
//! - [`certification`]: certification import
//! - [`report`]: run summaries
//! - [`error`]: SyncError and its context

pub mod certification;
pub mod chain;
pub mod error;
pub mod profile;
pub mod progress;
pub mod reconcile;
pub mod report;

use tracing::warn;

use coursegraph_core::CourseTree;
use coursegraph_storage::GraphStore;

pub use certification::{
    import_certifications, CertificationRow, CertificationSource, ImportOptions, ImportReport,
    JsonCertificationSource,
};
pub use error::{SyncContext, SyncError};
pub use profile::{update_user, ProfileUpdates, UserProfile};
pub use reconcile::{Session, SyncOptions, Synchronizer};
pub use report::SyncReport;

/// Synchronizes `courses` into `store` with default options.
pub fn synchronize<S: GraphStore + ?Sized>(
    store: &mut S,
    courses: &[CourseTree],
) -> Result<SyncReport, SyncError> {
    Synchronizer::default().run(store, courses)
}

/// Runs `f` inside a store transaction: commit on success, rollback on any
/// error.
pub(crate) fn with_transaction<S, T, F>(store: &mut S, f: F) -> Result<T, SyncError>
where
    S: GraphStore + ?Sized,
    F: FnOnce(&mut S) -> Result<T, SyncError>,
{
    store.begin()?;
    let result = f(store).and_then(|value| {
        store.commit()?;
        Ok(value)
    });
    if let Err(err) = &result {
        warn!(error = %err, "rolling back");
        if let Err(rollback) = store.rollback() {
            warn!(error = %rollback, "rollback failed");
        }
    }
    result
}
