//! The graph reconciler: applies a whole catalog to the store in one
//! transaction.
//!
//! A run is staged explicitly:
//!
//! 1. disable every active course, then upsert every incoming course;
//! 2. clear the prerequisite edges of every incoming course;
//! 3. per course: relink categories and prerequisites, tombstone the old
//!    module tree, upsert modules, lessons and questions (clearing their
//!    tombstones), rebuild the lesson and module chains, bridge modules into
//!    one lesson path, and annotate progress along it.
//!
//! Existing children are always tombstoned before survivors are upserted
//! again rather than diffed, so every chain is rebuilt from nothing on every
//! run. Nodes are never deleted.
//!
//! Each phase is a public function over a [`Session`], which wraps the store
//! and keeps the counters that end up in the [`SyncReport`].

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn};

use coursegraph_core::tree::catalog_digest;
use coursegraph_core::{
    prepare, CourseStatus, CourseTree, LessonTree, ModuleTree, NodeLabel, NodeRef, Relation, Tag,
};
use coursegraph_storage::{Direction, GraphStore, Properties, StorageError};

use crate::chain::{self, ChainStats, LESSON_CHAIN, MODULE_CHAIN};
use crate::error::{SyncContext, SyncError};
use crate::progress;
use crate::report::SyncReport;
use crate::with_transaction;

/// Options for a synchronization run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Status given to courses whose tree does not declare one.
    pub default_status: CourseStatus,
    /// Timestamp written as `updatedAt`. `None` means the wall clock.
    pub now: Option<DateTime<Utc>>,
}

/// Runs catalog synchronizations with fixed options.
#[derive(Debug, Clone, Default)]
pub struct Synchronizer {
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(options: SyncOptions) -> Self {
        Synchronizer { options }
    }

    /// Validates and normalizes `courses`, then reconciles the store against
    /// them inside one transaction. On failure the transaction is rolled
    /// back and nothing is written.
    pub fn run<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        courses: &[CourseTree],
    ) -> Result<SyncReport, SyncError> {
        let courses = prepare(courses.to_vec())?;
        let digest = catalog_digest(&courses)?.to_hex().to_string();
        let now = self.options.now.unwrap_or_else(Utc::now);

        let mut report = with_transaction(store, |store| {
            let mut session = Session::new(store, now);
            match apply(&mut session, &courses, self.options.default_status) {
                Ok(()) => Ok(session.into_report()),
                Err(err) => Err(SyncError::from_storage(err, session.context.clone())),
            }
        })?;

        report.digest = digest;
        info!(
            courses = report.courses,
            lessons = report.lessons,
            created = report.nodes_created,
            tombstoned = report.nodes_tombstoned,
            resurrected = report.nodes_resurrected,
            "catalog synchronized"
        );
        Ok(report)
    }
}

fn apply<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    courses: &[CourseTree],
    default_status: CourseStatus,
) -> Result<(), StorageError> {
    disable_active_courses(session)?;
    for course in courses {
        session.enter_course(&course.slug);
        upsert_course(session, course, default_status)?;
    }
    clear_prerequisites(session, courses)?;

    for course in courses {
        let span = info_span!("course", course = %course.slug);
        let _guard = span.enter();
        sync_course(session, course)?;
    }
    Ok(())
}

fn sync_course<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    course: &CourseTree,
) -> Result<(), StorageError> {
    let course_ref = NodeRef::course(&course.slug);
    session.enter_course(&course.slug);

    link_categories(session, &course_ref, course)?;
    link_prerequisites(session, &course_ref, course)?;
    tombstone_modules(session, &course_ref)?;

    let mut modules = Vec::with_capacity(course.modules.len());
    for module in &course.modules {
        session.enter_module(&module.slug);
        let module_ref = upsert_module(session, &course.slug, module)?;
        tombstone_lessons(session, &module_ref)?;

        let mut lessons = Vec::with_capacity(module.lessons.len());
        for lesson in &module.lessons {
            session.enter_lesson(&lesson.slug);
            let lesson_ref = upsert_lesson(session, &course.slug, &module.slug, lesson)?;
            sync_questions(session, &lesson_ref, lesson)?;
            lessons.push(lesson_ref);
        }

        session.enter_module(&module.slug);
        let stats = chain::build_chain(&mut *session.store, &module_ref, &lessons, LESSON_CHAIN)?;
        session.add_chain(stats);
        debug!(module = %module.slug, lessons = lessons.len(), "module relinked");
        modules.push(module_ref);
    }

    session.enter_course(&course.slug);
    let stats = chain::build_chain(&mut *session.store, &course_ref, &modules, MODULE_CHAIN)?;
    session.add_chain(stats);
    bridge_modules(session, &course_ref)?;

    let path = progress::course_path(&*session.store, &course_ref)?;
    session.report.lessons_annotated += progress::annotate(&mut *session.store, &path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A store wrapper for one run: every write goes through it so the run's
/// counters stay accurate.
pub struct Session<'s, S: GraphStore + ?Sized> {
    store: &'s mut S,
    now: DateTime<Utc>,
    report: SyncReport,
    /// Nodes tombstoned by this run and not restored since
    fresh_tombstones: HashSet<NodeRef>,
    context: SyncContext,
}

impl<'s, S: GraphStore + ?Sized> Session<'s, S> {
    pub fn new(store: &'s mut S, now: DateTime<Utc>) -> Self {
        Session {
            store,
            now,
            report: SyncReport::default(),
            fresh_tombstones: HashSet::new(),
            context: SyncContext::default(),
        }
    }

    pub fn store(&self) -> &S {
        &*self.store
    }

    /// Counters so far. Tombstone totals are only final after
    /// [`Session::into_report`].
    pub fn report(&self) -> &SyncReport {
        &self.report
    }

    pub fn into_report(self) -> SyncReport {
        SyncReport {
            nodes_tombstoned: self.fresh_tombstones.len(),
            ..self.report
        }
    }

    fn enter_course(&mut self, slug: &str) {
        self.context = SyncContext::course(slug);
    }

    fn enter_module(&mut self, slug: &str) {
        self.context.module = Some(slug.to_string());
        self.context.lesson = None;
    }

    fn enter_lesson(&mut self, slug: &str) {
        self.context.lesson = Some(slug.to_string());
    }

    fn timestamp(&self) -> Value {
        json!(self.now.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    fn merge(&mut self, node: &NodeRef) -> Result<bool, StorageError> {
        let created = self.store.merge_node(node)?;
        self.report.nodes_created += usize::from(created);
        Ok(created)
    }

    fn set(&mut self, node: &NodeRef, properties: &Properties) -> Result<(), StorageError> {
        self.store.set_properties(node, properties)
    }

    fn children(&self, parent: &NodeRef, relation: Relation) -> Result<Vec<NodeRef>, StorageError> {
        Ok(self
            .store
            .children_ordered(parent, relation, "order")?
            .into_iter()
            .map(|child| child.node)
            .collect())
    }

    fn tombstone(&mut self, node: &NodeRef, tag: Tag) -> Result<(), StorageError> {
        if self.store.add_tag(node, tag)? {
            self.fresh_tombstones.insert(node.clone());
        }
        Ok(())
    }

    fn restore(&mut self, node: &NodeRef, tag: Tag) -> Result<(), StorageError> {
        if self.store.remove_tag(node, tag)? && !self.fresh_tombstones.remove(node) {
            self.report.nodes_resurrected += 1;
        }
        Ok(())
    }

    fn link(
        &mut self,
        source: &NodeRef,
        relation: Relation,
        target: &NodeRef,
        properties: &Properties,
    ) -> Result<(), StorageError> {
        let created = self.store.merge_edge(source, relation, target, properties)?;
        self.report.edges_created += usize::from(created);
        Ok(())
    }

    fn unlink(
        &mut self,
        node: &NodeRef,
        relations: &[Relation],
        direction: Direction,
    ) -> Result<(), StorageError> {
        self.report.edges_deleted += self.store.delete_edges(node, relations, direction)?;
        Ok(())
    }

    fn add_chain(&mut self, stats: ChainStats) {
        self.report.edges_created += stats.created;
        self.report.edges_deleted += stats.deleted;
    }
}

fn props<const N: usize>(pairs: [(&str, Value); N]) -> Properties {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

// ---------------------------------------------------------------------------
// Courses
// ---------------------------------------------------------------------------

/// Sets every active course to disabled. Courses present in the catalog are
/// re-enabled by [`upsert_course`].
pub fn disable_active_courses<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
) -> Result<usize, StorageError> {
    let disabled = props([("status", json!(CourseStatus::Disabled.as_str()))]);
    let mut count = 0;
    for course in session.store.nodes_with_label(NodeLabel::Course)? {
        if course.str_property("status") == Some(CourseStatus::Active.as_str()) {
            session.set(&course.node, &disabled)?;
            count += 1;
        }
    }
    debug!(count, "disabled active courses");
    Ok(count)
}

/// Creates or updates a course node from its tree. Free-form attributes are
/// written first so the typed fields win on collision.
pub fn upsert_course<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    course: &CourseTree,
    default_status: CourseStatus,
) -> Result<NodeRef, StorageError> {
    let course_ref = NodeRef::course(&course.slug);
    session.merge(&course_ref)?;

    let mut properties: Properties = course
        .attributes
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    properties.extend(props([
        ("id", json!(course_ref.id.as_str())),
        ("slug", json!(course.slug)),
        ("title", json!(course.title)),
        ("language", json!(course.language)),
        ("status", json!(course.status.unwrap_or(default_status).as_str())),
        ("thumbnail", json!(course.thumbnail)),
        ("caption", json!(course.caption)),
        ("video", json!(course.video)),
        ("usecase", json!(course.usecase)),
        ("redirect", json!(course.redirect)),
        ("duration", json!(course.duration)),
        ("repository", json!(course.repository)),
        ("link", json!(format!("/courses/{}/", course.slug))),
        ("updatedAt", session.timestamp()),
    ]));
    session.set(&course_ref, &properties)?;

    session.report.courses += 1;
    Ok(course_ref)
}

/// Removes every PREREQUISITE edge touching the incoming courses, in both
/// directions. Runs for the whole batch before any course relinks, since
/// either endpoint may declare an edge.
pub fn clear_prerequisites<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    courses: &[CourseTree],
) -> Result<(), StorageError> {
    for course in courses {
        session.unlink(
            &NodeRef::course(&course.slug),
            &[Relation::Prerequisite],
            Direction::Both,
        )?;
    }
    Ok(())
}

/// Replaces the course's category memberships with the tree's list.
pub fn link_categories<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    course_ref: &NodeRef,
    course: &CourseTree,
) -> Result<(), StorageError> {
    session.unlink(course_ref, &[Relation::InCategory], Direction::Outgoing)?;
    for category in &course.categories {
        let category_ref = NodeRef::category(&category.category);
        session.merge(&category_ref)?;
        session.set(
            &category_ref,
            &props([
                ("id", json!(category_ref.id.as_str())),
                ("slug", json!(category.category)),
            ]),
        )?;
        session.link(
            course_ref,
            Relation::InCategory,
            &category_ref,
            &props([("order", json!(category.order))]),
        )?;
    }
    Ok(())
}

/// Links prerequisite and progress-to courses. Expects
/// [`clear_prerequisites`] to have run for the batch.
pub fn link_prerequisites<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    course_ref: &NodeRef,
    course: &CourseTree,
) -> Result<(), StorageError> {
    let none = Properties::new();
    for slug in &course.prerequisite_slugs {
        let previous = ensure_course(session, slug)?;
        session.link(course_ref, Relation::Prerequisite, &previous, &none)?;
    }
    for slug in &course.progress_to_slugs {
        let next = ensure_course(session, slug)?;
        session.link(&next, Relation::Prerequisite, course_ref, &none)?;
    }
    Ok(())
}

/// Matches a course by slug, creating a disabled placeholder if unknown.
fn ensure_course<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    slug: &str,
) -> Result<NodeRef, StorageError> {
    let course_ref = NodeRef::course(slug);
    if session.merge(&course_ref)? {
        warn!(slug, "creating disabled placeholder for unknown course");
        session.set(
            &course_ref,
            &props([
                ("id", json!(course_ref.id.as_str())),
                ("slug", json!(slug)),
                ("status", json!(CourseStatus::Disabled.as_str())),
                ("link", json!(format!("/courses/{}/", slug))),
            ]),
        )?;
        session.report.placeholder_courses += 1;
    }
    Ok(course_ref)
}

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

/// Tombstones every module of the course along with its lessons and
/// questions, and removes the module chain.
pub fn tombstone_modules<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    course_ref: &NodeRef,
) -> Result<(), StorageError> {
    let modules = session.children(course_ref, Relation::HasModule)?;
    for module in &modules {
        session.tombstone(module, Tag::DeletedModule)?;
        tombstone_lessons(session, module)?;
    }
    let stats = chain::clear_chain(&mut *session.store, course_ref, &modules, MODULE_CHAIN)?;
    session.add_chain(stats);
    session.unlink(course_ref, &[Relation::HasModule], Direction::Outgoing)
}

/// Creates or updates a module, clears its tombstone and attaches it to its
/// course.
pub fn upsert_module<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    course_slug: &str,
    module: &ModuleTree,
) -> Result<NodeRef, StorageError> {
    let course_ref = NodeRef::course(course_slug);
    let module_ref = NodeRef::module(course_slug, &module.slug);
    session.merge(&module_ref)?;
    session.set(
        &module_ref,
        &props([
            ("id", json!(module_ref.id.as_str())),
            ("slug", json!(module.slug)),
            ("title", json!(module.title)),
            ("order", json!(module.order)),
            ("status", json!("active")),
            ("duration", json!(module.duration)),
            ("link", json!(format!("/courses/{}/{}/", course_slug, module.slug))),
            ("updatedAt", session.timestamp()),
        ]),
    )?;
    session.restore(&module_ref, Tag::DeletedModule)?;
    session.link(&course_ref, Relation::HasModule, &module_ref, &Properties::new())?;

    session.report.modules += 1;
    Ok(module_ref)
}

/// Connects the last lesson of each module to the first lesson of the next
/// module that has lessons. Returns how many bridges exist afterwards.
pub fn bridge_modules<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    course_ref: &NodeRef,
) -> Result<usize, StorageError> {
    let mut ends = Vec::new();
    for module in session.children(course_ref, Relation::HasModule)? {
        let first = session.store.single_target(&module, Relation::FirstLesson)?;
        let last = session.store.single_target(&module, Relation::LastLesson)?;
        if let (Some(first), Some(last)) = (first, last) {
            ends.push((first, last));
        }
    }

    let none = Properties::new();
    for pair in ends.windows(2) {
        let (_, last) = &pair[0];
        let (first, _) = &pair[1];
        session.link(last, Relation::Next, first, &none)?;
    }
    Ok(ends.len().saturating_sub(1))
}

// ---------------------------------------------------------------------------
// Lessons and questions
// ---------------------------------------------------------------------------

/// Tombstones every lesson of the module (and their questions), cuts their
/// `NEXT` edges and detaches them from the module.
pub fn tombstone_lessons<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    module_ref: &NodeRef,
) -> Result<(), StorageError> {
    let lessons = session.children(module_ref, Relation::HasLesson)?;
    for lesson in &lessons {
        session.tombstone(lesson, Tag::DeletedLesson)?;
        tombstone_questions(session, lesson)?;
    }
    let stats = chain::clear_chain(&mut *session.store, module_ref, &lessons, LESSON_CHAIN)?;
    session.add_chain(stats);
    session.unlink(module_ref, &[Relation::HasLesson], Direction::Outgoing)
}

/// Creates or updates a lesson, clears its tombstone, syncs the optional
/// marker and attaches it to its module.
pub fn upsert_lesson<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    course_slug: &str,
    module_slug: &str,
    lesson: &LessonTree,
) -> Result<NodeRef, StorageError> {
    let module_ref = NodeRef::module(course_slug, module_slug);
    let lesson_ref = NodeRef::lesson(course_slug, module_slug, &lesson.slug);
    session.merge(&lesson_ref)?;

    let updated_at = lesson
        .updated_at
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true));
    session.set(
        &lesson_ref,
        &props([
            ("id", json!(lesson_ref.id.as_str())),
            ("slug", json!(lesson.slug)),
            ("type", json!(lesson.lesson_type.as_str())),
            ("title", json!(lesson.title)),
            ("order", json!(lesson.order)),
            ("duration", json!(lesson.duration)),
            ("sandbox", json!(lesson.sandbox)),
            ("status", json!("active")),
            (
                "link",
                json!(format!("/courses/{}/{}/{}/", course_slug, module_slug, lesson.slug)),
            ),
            ("disableCache", json!(lesson.disable_cache)),
            ("updatedAt", json!(updated_at)),
        ]),
    )?;
    session.restore(&lesson_ref, Tag::DeletedLesson)?;

    if lesson.optional {
        session.store.add_tag(&lesson_ref, Tag::OptionalLesson)?;
    } else {
        session.store.remove_tag(&lesson_ref, Tag::OptionalLesson)?;
    }

    session.unlink(&lesson_ref, &[Relation::Next], Direction::Both)?;
    session.link(&module_ref, Relation::HasLesson, &lesson_ref, &Properties::new())?;

    session.report.lessons += 1;
    Ok(lesson_ref)
}

fn tombstone_questions<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    lesson_ref: &NodeRef,
) -> Result<(), StorageError> {
    let questions = session
        .store
        .edges(lesson_ref, &[Relation::HasQuestion], Direction::Outgoing)?;
    for edge in &questions {
        session.tombstone(&edge.target, Tag::DeletedQuestion)?;
    }
    session.unlink(lesson_ref, &[Relation::HasQuestion], Direction::Outgoing)
}

/// Replaces the lesson's questions with the tree's list: old questions are
/// tombstoned and detached, current ones upserted, restored and relinked.
pub fn sync_questions<S: GraphStore + ?Sized>(
    session: &mut Session<'_, S>,
    lesson_ref: &NodeRef,
    lesson: &LessonTree,
) -> Result<(), StorageError> {
    tombstone_questions(session, lesson_ref)?;
    for question in &lesson.questions {
        let question_ref = NodeRef::question(&lesson_ref.id, &question.id);
        session.merge(&question_ref)?;
        session.set(
            &question_ref,
            &props([
                ("id", json!(question_ref.id.as_str())),
                ("slug", json!(question.id)),
                ("text", json!(question.text)),
            ]),
        )?;
        session.restore(&question_ref, Tag::DeletedQuestion)?;
        session.link(lesson_ref, Relation::HasQuestion, &question_ref, &Properties::new())?;
    }
    session.report.questions += lesson.questions.len();
    Ok(())
}
