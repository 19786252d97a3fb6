//! Run summaries returned to callers and printed by the CLI.

use serde::{Deserialize, Serialize};

/// Outcome of one [`synchronize`](crate::synchronize) run.
///
/// A re-run over an unchanged catalog reports zero created nodes and equal
/// created/deleted relationship counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub courses: usize,
    pub modules: usize,
    pub lessons: usize,
    pub questions: usize,
    pub nodes_created: usize,
    /// Nodes carrying a fresh tombstone once the run finished.
    pub nodes_tombstoned: usize,
    /// Nodes that lost a tombstone from an earlier run.
    pub nodes_resurrected: usize,
    pub edges_created: usize,
    pub edges_deleted: usize,
    /// Disabled courses created for unknown prerequisite slugs.
    pub placeholder_courses: usize,
    /// Lessons given a progress percentage.
    pub lessons_annotated: usize,
    /// blake3 digest of the normalized catalog, hex encoded.
    pub digest: String,
}
