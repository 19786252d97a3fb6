//! Import of passed certification exams as completed enrolments.
//!
//! Rows come from an external exam system through a [`CertificationSource`].
//! Only rows finished at or after the newest enrolment imported so far are
//! considered, so re-running the import picks up where the last one stopped
//! and re-imports at most the boundary rows, which merge onto existing nodes.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use coursegraph_core::{NodeLabel, NodeRef, Relation, Tag};
use coursegraph_storage::{GraphStore, Properties};

use crate::error::SyncError;
use crate::with_transaction;

/// Cutoff used before any enrolment has been imported.
pub const DEFAULT_CUTOFF: &str = "1970-01-01T00:00:00.555Z";

/// Most rows imported by one run unless configured otherwise.
pub const DEFAULT_LIMIT: usize = 1000;

/// Maps an exam name to the slug of the certification course it grants.
pub fn course_for_exam(exam: &str) -> Option<&'static str> {
    match exam {
        "neo4-3.x-certification-test"
        | "neo4j-4.x-certification-test"
        | "neo4j-certified-professional" => Some("neo4j-certification"),
        "neo4j-gds-test" => Some("gds-certification"),
        _ => None,
    }
}

/// One exam attempt as reported by the exam system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificationRow {
    /// Identity-provider subject of the candidate.
    pub sub: String,
    pub exam: String,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub certificate_path: Option<String>,
    pub passed: bool,
    /// Completion time, in epoch seconds.
    pub finished: i64,
}

/// Where certification rows come from.
pub trait CertificationSource {
    /// Every row the source knows about. Filtering happens in
    /// [`select_rows`].
    fn rows(&self) -> Result<Vec<CertificationRow>, SyncError>;
}

/// Reads rows from a JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonCertificationSource {
    path: PathBuf,
}

impl JsonCertificationSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonCertificationSource { path: path.into() }
    }
}

impl CertificationSource for JsonCertificationSource {
    fn rows(&self) -> Result<Vec<CertificationRow>, SyncError> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            SyncError::Source(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| SyncError::Source(format!("malformed {}: {}", self.path.display(), e)))
    }
}

impl CertificationSource for Vec<CertificationRow> {
    fn rows(&self) -> Result<Vec<CertificationRow>, SyncError> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub limit: usize,
    /// Timestamp written as `createdAt` on new nodes. `None` means the wall
    /// clock.
    pub now: Option<DateTime<Utc>>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            limit: DEFAULT_LIMIT,
            now: None,
        }
    }
}

/// Outcome of one import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Rows finished before this were ignored.
    pub cutoff: DateTime<Utc>,
    /// Rows that passed the filter.
    pub rows_read: usize,
    pub enrolments_created: usize,
    pub users_created: usize,
    pub skipped_missing_course: usize,
}

/// A filtered row, resolved to its course and completion time.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedRow {
    pub course_slug: &'static str,
    pub completed_at: DateTime<Utc>,
    pub row: CertificationRow,
}

/// The newest `completedAt` across imported enrolments, or
/// [`DEFAULT_CUTOFF`] if there are none.
pub fn find_cutoff<S: GraphStore + ?Sized>(store: &S) -> Result<DateTime<Utc>, SyncError> {
    let newest = store
        .nodes_with_label(NodeLabel::Enrolment)?
        .iter()
        .filter(|node| node.has_tag(Tag::FromCommunityGraph))
        .filter_map(|node| node.str_property("completedAt"))
        .filter_map(|at| DateTime::parse_from_rfc3339(at).ok())
        .map(|at| at.with_timezone(&Utc))
        .max();

    match newest {
        Some(at) => Ok(at),
        None => DateTime::parse_from_rfc3339(DEFAULT_CUTOFF)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|e| SyncError::Source(e.to_string())),
    }
}

/// Keeps passed rows for known exams finished at or after `cutoff`
/// (compared in whole seconds), oldest first, at most `limit` of them.
pub fn select_rows(
    rows: Vec<CertificationRow>,
    cutoff: DateTime<Utc>,
    limit: usize,
) -> Vec<SelectedRow> {
    let cutoff = cutoff.timestamp();
    let mut selected: Vec<SelectedRow> = rows
        .into_iter()
        .filter(|row| row.passed && row.finished >= cutoff)
        .filter_map(|row| {
            let course_slug = course_for_exam(&row.exam)?;
            let completed_at = DateTime::from_timestamp(row.finished, 0)?;
            Some(SelectedRow {
                course_slug,
                completed_at,
                row,
            })
        })
        .collect();
    selected.sort_by_key(|selected| selected.row.finished);
    selected.truncate(limit);
    selected
}

/// Imports certification rows from `source` as completed enrolments, in one
/// transaction.
pub fn import_certifications<S, C>(
    store: &mut S,
    source: &C,
    options: &ImportOptions,
) -> Result<ImportReport, SyncError>
where
    S: GraphStore + ?Sized,
    C: CertificationSource + ?Sized,
{
    let cutoff = find_cutoff(store)?;
    info!(%cutoff, "importing certifications");
    let selected = select_rows(source.rows()?, cutoff, options.limit);
    let now = json!(options
        .now
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true));

    let mut report = ImportReport {
        cutoff,
        rows_read: selected.len(),
        enrolments_created: 0,
        users_created: 0,
        skipped_missing_course: 0,
    };

    with_transaction(store, |store| {
        for selected in &selected {
            let course = NodeRef::course(selected.course_slug);
            if store.get_node(&course)?.is_none() {
                debug!(course = selected.course_slug, "certification course missing, skipping row");
                report.skipped_missing_course += 1;
                continue;
            }
            let sub = selected.row.sub.as_str();

            let user = NodeRef::user(sub);
            if store.merge_node(&user)? {
                let mut props = Properties::new();
                props.insert("sub".into(), json!(sub));
                props.insert("id".into(), json!(uuid::Uuid::new_v4().to_string()));
                props.insert("createdAt".into(), now.clone());
                store.set_properties(&user, &props)?;
                report.users_created += 1;
            }

            let enrolment = NodeRef::enrolment(selected.course_slug, sub);
            let mut props = Properties::new();
            if store.merge_node(&enrolment)? {
                props.insert("id".into(), json!(enrolment.id.as_str()));
                props.insert("createdAt".into(), now.clone());
                report.enrolments_created += 1;
            }
            props.insert("percent".into(), json!(selected.row.percent));
            props.insert("certificatePath".into(), json!(selected.row.certificate_path));
            props.insert(
                "completedAt".into(),
                json!(selected.completed_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
            store.set_properties(&enrolment, &props)?;
            store.add_tag(&enrolment, Tag::CompletedEnrolment)?;
            store.add_tag(&enrolment, Tag::FromCommunityGraph)?;

            let none = Properties::new();
            store.merge_edge(&user, Relation::HasEnrolment, &enrolment, &none)?;
            store.merge_edge(&enrolment, Relation::ForCourse, &course, &none)?;
        }
        Ok(())
    })?;

    info!(
        rows = report.rows_read,
        created = report.enrolments_created,
        skipped = report.skipped_missing_course,
        "certifications imported"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursegraph_storage::InMemoryStore;

    fn row(sub: &str, exam: &str, passed: bool, finished: i64) -> CertificationRow {
        CertificationRow {
            sub: sub.into(),
            exam: exam.into(),
            percent: Some(0.9),
            certificate_path: Some(format!("/c/{}", sub)),
            passed,
            finished,
        }
    }

    fn store_with_courses(slugs: &[&str]) -> InMemoryStore {
        let mut store = InMemoryStore::new();
        for slug in slugs {
            store.merge_node(&NodeRef::course(slug)).unwrap();
        }
        store
    }

    #[test]
    fn exams_map_to_certification_courses() {
        assert_eq!(course_for_exam("neo4j-gds-test"), Some("gds-certification"));
        assert_eq!(course_for_exam("neo4-3.x-certification-test"), Some("neo4j-certification"));
        assert_eq!(course_for_exam("neo4j-certified-professional"), Some("neo4j-certification"));
        assert_eq!(course_for_exam("graph-data-science-101"), None);
    }

    #[test]
    fn select_filters_sorts_and_limits() {
        let cutoff = DateTime::from_timestamp(100, 0).unwrap();
        let rows = vec![
            row("late", "neo4j-gds-test", true, 300),
            row("failed", "neo4j-gds-test", false, 200),
            row("early", "neo4j-gds-test", true, 99),
            row("unknown", "other-exam", true, 250),
            row("boundary", "neo4j-4.x-certification-test", true, 100),
            row("middle", "neo4j-gds-test", true, 200),
        ];

        let subs: Vec<String> = select_rows(rows.clone(), cutoff, 10)
            .into_iter()
            .map(|s| s.row.sub)
            .collect();
        assert_eq!(subs, ["boundary", "middle", "late"]);
        assert_eq!(select_rows(rows, cutoff, 2).len(), 2);
    }

    #[test]
    fn cutoff_defaults_then_tracks_newest_import() {
        let mut store = store_with_courses(&["gds-certification"]);
        assert_eq!(find_cutoff(&store).unwrap().to_rfc3339_opts(SecondsFormat::Millis, true), DEFAULT_CUTOFF);

        let rows = vec![row("a", "neo4j-gds-test", true, 1_700_000_000)];
        import_certifications(&mut store, &rows, &ImportOptions::default()).unwrap();
        assert_eq!(find_cutoff(&store).unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn import_creates_enrolments_and_skips_missing_courses() {
        let mut store = store_with_courses(&["neo4j-certification"]);
        let rows = vec![
            row("a", "neo4j-4.x-certification-test", true, 10),
            row("a", "neo4j-gds-test", true, 20),
        ];
        let report = import_certifications(&mut store, &rows, &ImportOptions::default()).unwrap();
        assert_eq!(report.rows_read, 2);
        assert_eq!(report.enrolments_created, 1);
        assert_eq!(report.skipped_missing_course, 1);

        let enrolment = store
            .get_node(&NodeRef::enrolment("neo4j-certification", "a"))
            .unwrap()
            .unwrap();
        assert!(enrolment.has_tag(Tag::CompletedEnrolment));
        assert!(enrolment.has_tag(Tag::FromCommunityGraph));
        assert_eq!(enrolment.str_property("certificatePath"), Some("/c/a"));
        assert_eq!(enrolment.str_property("completedAt"), Some("1970-01-01T00:00:10.000Z"));
        assert_eq!(store.count_edges(Some(Relation::HasEnrolment)).unwrap(), 1);
        assert_eq!(store.count_edges(Some(Relation::ForCourse)).unwrap(), 1);

        let user = store.get_node(&NodeRef::user("a")).unwrap().unwrap();
        assert!(uuid::Uuid::parse_str(user.str_property("id").unwrap()).is_ok());
    }

    #[test]
    fn reimport_is_idempotent() {
        let mut store = store_with_courses(&["neo4j-certification"]);
        let rows = vec![row("a", "neo4j-certified-professional", true, 50)];
        import_certifications(&mut store, &rows, &ImportOptions::default()).unwrap();
        let nodes = store.count_nodes(None).unwrap();
        let edges = store.count_edges(None).unwrap();

        let second = import_certifications(&mut store, &rows, &ImportOptions::default()).unwrap();
        assert_eq!(second.rows_read, 1);
        assert_eq!(second.enrolments_created, 0);
        assert_eq!(store.count_nodes(None).unwrap(), nodes);
        assert_eq!(store.count_edges(None).unwrap(), edges);
    }

    #[test]
    fn json_source_reports_unreadable_files() {
        let source = JsonCertificationSource::new("/definitely/not/here.json");
        assert!(matches!(source.rows().unwrap_err(), SyncError::Source(_)));
    }
}
