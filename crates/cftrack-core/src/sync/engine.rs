//! Sync orchestration: resolve, fetch, classify, persist, advance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::contests::select_new_contests;
use super::submissions::{walk_submissions, WalkOutcome};
use super::{SyncError, SyncScope};
use crate::config::SyncSettings;
use crate::db::InsertReport;
use crate::models::{StudentId, StudentSyncReport, SyncResult};
use crate::services::DatabaseService;
use crate::source::JudgeSource;
use crate::util::unix_millis_now;

type SyncOutcome = std::result::Result<SyncResult, SyncError>;
type StudentLocks = Mutex<HashMap<StudentId, Arc<AsyncMutex<()>>>>;

/// Held for the duration of one sync; drops the map entry once no other
/// task is waiting on the same student.
struct StudentGuard<'a> {
    id: StudentId,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a StudentLocks,
}

impl Drop for StudentGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.id);
        }
    }
}

/// Runs incremental syncs against one judge source and one store.
///
/// Every public method returns a [`SyncResult`]; failures never escape as
/// errors. Aborted runs leave the watermark untouched.
pub struct SyncEngine<S> {
    source: S,
    store: DatabaseService,
    settings: SyncSettings,
    student_locks: StudentLocks,
}

impl<S: JudgeSource> SyncEngine<S> {
    pub fn new(source: S, store: DatabaseService, settings: SyncSettings) -> Self {
        Self {
            source,
            store,
            settings,
            student_locks: Mutex::new(HashMap::new()),
        }
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Advisory per-student lock; `None` when serialization is switched off.
    async fn lock_student(&self, id: &StudentId) -> Option<StudentGuard<'_>> {
        if !self.settings.serialize_per_student {
            return None;
        }
        let lock = {
            let mut locks = self
                .student_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(*id).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        Some(StudentGuard {
            id: *id,
            lock,
            guard: Some(guard),
            locks: &self.student_locks,
        })
    }

    async fn resolve_handle(&self, id: &StudentId) -> Result<String, SyncError> {
        let student = self
            .store
            .get_student(id)
            .await?
            .ok_or(SyncError::NotFound)?;
        student
            .handle()
            .map(str::to_string)
            .ok_or(SyncError::NotFound)
    }

    async fn advance(&self, id: &StudentId) -> Result<(), SyncError> {
        self.store.advance_last_sync(id, unix_millis_now()).await?;
        Ok(())
    }

    fn check_report(report: &InsertReport, what: &str) -> Result<(), SyncError> {
        if report.is_total_failure() {
            return Err(SyncError::Persistence(
                report
                    .first_failure()
                    .unwrap_or("no records written")
                    .to_string(),
            ));
        }
        let failed = report.rejected.len() - report.duplicates();
        if failed > 0 {
            tracing::warn!(
                "{} of {} staged {} were rejected",
                failed,
                report.attempted,
                what
            );
        }
        Ok(())
    }

    fn finish(id: &StudentId, stream: &str, outcome: SyncOutcome) -> SyncResult {
        match outcome {
            Ok(result) => {
                tracing::info!("{} sync for {} finished: {}", stream, id, result.summary());
                result
            }
            Err(error) => {
                tracing::warn!("{} sync for {} aborted: {}", stream, id, error);
                error.into()
            }
        }
    }

    /// Fetch and store submissions newer than the student's watermark.
    pub async fn sync_submissions(&self, id: &StudentId) -> SyncResult {
        let _guard = self.lock_student(id).await;
        Self::finish(id, "Submission", self.run_submissions(id).await)
    }

    async fn run_submissions(&self, id: &StudentId) -> SyncOutcome {
        let handle = self.resolve_handle(id).await?;
        let last_stored_id = self.store.submission_watermark(id).await?;

        let outcome = walk_submissions(
            &self.source,
            &handle,
            last_stored_id,
            self.settings.page_size,
            self.settings.history_cap,
        )
        .await?;

        let walk = match outcome {
            WalkOutcome::NoHistory => {
                self.advance(id).await?;
                return Ok(SyncResult::completed(0, "No Codeforces submissions found."));
            }
            WalkOutcome::UpToDate => {
                self.advance(id).await?;
                return Ok(SyncResult::completed(0, "Already up-to-date."));
            }
            WalkOutcome::Regression { latest, stored } => {
                return Err(SyncError::DataOutdated { latest, stored });
            }
            WalkOutcome::NewItems(walk) => walk,
        };

        if walk.history_capped {
            tracing::info!(
                "Stopped {} at {} fetched submissions without reaching stored data",
                handle,
                walk.fetched
            );
        }

        let staged = walk
            .staged
            .into_iter()
            .map(|item| item.into_submission(*id))
            .collect::<Vec<_>>();
        let report = if staged.is_empty() {
            InsertReport::default()
        } else {
            self.store.insert_submissions(staged).await?
        };
        Self::check_report(&report, "submissions")?;
        self.advance(id).await?;

        let message = if report.inserted > 0 {
            format!("Synced {} new submissions.", report.inserted)
        } else {
            "No new submissions synced.".to_string()
        };
        Ok(SyncResult::completed(report.inserted, message).with_history_capped(walk.history_capped))
    }

    /// Fetch the rating history and store participations newer than the watermark.
    pub async fn sync_contests(&self, id: &StudentId) -> SyncResult {
        let _guard = self.lock_student(id).await;
        Self::finish(id, "Contest", self.run_contests(id).await)
    }

    async fn run_contests(&self, id: &StudentId) -> SyncOutcome {
        let handle = self.resolve_handle(id).await?;
        let watermark = self.store.contest_watermark(id).await?;

        let history = self.source.fetch_rating_history(&handle).await?;
        if history.is_empty() {
            self.advance(id).await?;
            return Ok(SyncResult::completed(0, "No contest participations found."));
        }

        let fresh = select_new_contests(history, watermark);
        if fresh.is_empty() {
            self.advance(id).await?;
            return Ok(SyncResult::completed(0, "Already up-to-date."));
        }

        let staged = fresh
            .into_iter()
            .map(|entry| entry.into_participation(*id))
            .collect::<Vec<_>>();
        let report = self.store.insert_contests(staged).await?;
        Self::check_report(&report, "contest participations")?;
        self.advance(id).await?;

        let message = if report.inserted > 0 {
            format!("Synced {} new contest participations.", report.inserted)
        } else {
            "No new contest participations synced.".to_string()
        };
        Ok(SyncResult::completed(report.inserted, message))
    }

    /// Run the selected streams for one student, submissions first.
    pub async fn sync_student(&self, id: &StudentId, scope: SyncScope) -> StudentSyncReport {
        let submissions = if scope.includes_submissions() {
            Some(self.sync_submissions(id).await)
        } else {
            None
        };
        let contests = if scope.includes_contests() {
            Some(self.sync_contests(id).await)
        } else {
            None
        };

        StudentSyncReport {
            student_id: *id,
            submissions,
            contests,
        }
    }

    /// Sync every student with a handle, at most `concurrency` at a time.
    pub async fn sync_all(
        &self,
        scope: SyncScope,
        concurrency: usize,
    ) -> crate::Result<Vec<StudentSyncReport>> {
        let students = self.store.list_syncable_students().await?;
        tracing::info!(
            "Syncing {} students with concurrency {}",
            students.len(),
            concurrency.max(1)
        );

        let reports = stream::iter(students)
            .map(|student| async move { self.sync_student(&student.id, scope).await })
            .buffer_unordered(concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewStudent, Student, SyncErrorKind};
    use crate::source::{
        ExternalRatingChange, ExternalSubmission, SourceError, SourceResult, SubmissionPage,
    };
    use pretty_assertions::assert_eq;

    /// In-memory judge keyed by handle; records every call it receives.
    #[derive(Default)]
    struct ScriptedSource {
        submissions: HashMap<String, Vec<ExternalSubmission>>,
        ratings: HashMap<String, Vec<ExternalRatingChange>>,
        fail_submissions_at: Option<(u32, SourceError)>,
        fail_ratings: Option<SourceError>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn with_submissions(mut self, handle: &str, newest: i64, oldest: i64) -> Self {
            let items = (oldest..=newest).rev().map(external).collect();
            self.submissions.insert(handle.to_string(), items);
            self
        }

        fn with_ratings(mut self, handle: &str, entries: &[(i64, i64)]) -> Self {
            let entries = entries
                .iter()
                .map(|&(contest_id, seconds)| rating(contest_id, seconds))
                .collect();
            self.ratings.insert(handle.to_string(), entries);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl JudgeSource for ScriptedSource {
        async fn fetch_submission_page(
            &self,
            handle: &str,
            start: u32,
            count: u32,
        ) -> SourceResult<SubmissionPage> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("user.status {handle} {start} {count}"));
            if let Some((at, error)) = &self.fail_submissions_at {
                if *at == start {
                    return Err(error.clone());
                }
            }
            let items = self.submissions.get(handle).ok_or_else(|| {
                SourceError::Api(format!("handle: User with handle {handle} not found"))
            })?;
            Ok(SubmissionPage::new(
                items
                    .iter()
                    .skip(start as usize - 1)
                    .take(count as usize)
                    .cloned()
                    .collect(),
            ))
        }

        async fn fetch_rating_history(
            &self,
            handle: &str,
        ) -> SourceResult<Vec<ExternalRatingChange>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("user.rating {handle}"));
            if let Some(error) = &self.fail_ratings {
                return Err(error.clone());
            }
            Ok(self.ratings.get(handle).cloned().unwrap_or_default())
        }
    }

    fn external(id: i64) -> ExternalSubmission {
        ExternalSubmission {
            id,
            contest_id: Some(1900),
            problem_index: "A".to_string(),
            problem_name: Some("Sum".to_string()),
            problem_rating: 800,
            tags: vec!["math".to_string()],
            verdict: Some(if id % 2 == 0 { "OK" } else { "WRONG_ANSWER" }.to_string()),
            creation_time_seconds: 1_600_000_000 + id,
            language: Some("Rust 2021".to_string()),
            time_consumed_ms: 15,
            memory_consumed_bytes: 0,
            passed_test_count: Some(3),
            participant_type: Some("PRACTICE".to_string()),
        }
    }

    fn rating(contest_id: i64, seconds: i64) -> ExternalRatingChange {
        ExternalRatingChange {
            contest_id,
            contest_name: Some(format!("Codeforces Round {contest_id}")),
            rank: 100,
            old_rating: 1400,
            new_rating: 1450,
            rating_update_time_seconds: seconds,
        }
    }

    async fn add_student(store: &DatabaseService, name: &str, handle: Option<&str>) -> StudentId {
        store
            .create_student(Student::new(NewStudent {
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                cf_handle: handle.map(str::to_string),
                ..NewStudent::default()
            }))
            .await
            .unwrap()
            .id
    }

    fn engine(source: ScriptedSource, store: &DatabaseService) -> SyncEngine<ScriptedSource> {
        SyncEngine::new(source, store.clone(), SyncSettings::default())
    }

    async fn last_sync(store: &DatabaseService, id: &StudentId) -> Option<i64> {
        store.get_student(id).await.unwrap().unwrap().last_sync
    }

    async fn stored_count(store: &DatabaseService, id: &StudentId) -> usize {
        store.sync_status(id).await.unwrap().unwrap().submission_count
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_sync_then_boundary_on_second_page() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Ann", Some("ann_cf")).await;

        let seed = engine(ScriptedSource::default().with_submissions("ann_cf", 1000, 901), &store);
        let first = seed.sync_submissions(&id).await;
        assert_eq!(first.new_count, 100);
        assert_eq!(first.message.as_deref(), Some("Synced 100 new submissions."));
        assert_eq!(store.submission_watermark(&id).await.unwrap(), 1000);

        let grown = engine(ScriptedSource::default().with_submissions("ann_cf", 1100, 901), &store);
        let result = grown.sync_submissions(&id).await;

        assert!(result.success);
        assert_eq!(result.new_count, 100);
        assert!(!result.history_capped);
        assert_eq!(
            grown.source().calls(),
            vec!["user.status ann_cf 1 100", "user.status ann_cf 101 100"]
        );
        assert_eq!(store.submission_watermark(&id).await.unwrap(), 1100);
        assert_eq!(stored_count(&store, &id).await, 200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_sync_without_new_data_is_idempotent() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Ann", Some("ann_cf")).await;
        let engine = engine(ScriptedSource::default().with_submissions("ann_cf", 60, 1), &store);

        assert_eq!(engine.sync_submissions(&id).await.new_count, 60);
        let first_sync = last_sync(&store, &id).await.unwrap();

        let again = engine.sync_submissions(&id).await;
        assert!(again.success);
        assert_eq!(again.new_count, 0);
        assert_eq!(again.message.as_deref(), Some("Already up-to-date."));
        assert_eq!(stored_count(&store, &id).await, 60);
        assert!(last_sync(&store, &id).await.unwrap() >= first_sync);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn regression_reports_outdated_and_mutates_nothing() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Ann", Some("ann_cf")).await;

        engine(ScriptedSource::default().with_submissions("ann_cf", 50, 1), &store)
            .sync_submissions(&id)
            .await;
        let before = last_sync(&store, &id).await;

        let shrunk = engine(ScriptedSource::default().with_submissions("ann_cf", 40, 1), &store);
        let result = shrunk.sync_submissions(&id).await;

        assert!(!result.success);
        assert_eq!(result.data_outdated, Some(true));
        assert_eq!(result.error_kind, Some(SyncErrorKind::DataOutdated));
        assert_eq!(
            result.message.as_deref(),
            Some("Data mismatch: latest CF ID 40 < stored ID 50")
        );
        assert_eq!(last_sync(&store, &id).await, before);
        assert_eq!(stored_count(&store, &id).await, 50);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_handle_makes_no_network_calls() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Bob", None).await;
        let engine = engine(ScriptedSource::default(), &store);

        let result = engine.sync_submissions(&id).await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Student or Codeforces handle not found")
        );
        assert_eq!(result.error_kind, Some(SyncErrorKind::NotFound));

        let unknown = engine.sync_contests(&StudentId::new()).await;
        assert_eq!(unknown.error_kind, Some(SyncErrorKind::NotFound));

        assert!(engine.source().calls().is_empty());
        assert_eq!(last_sync(&store, &id).await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_history_completes_and_advances() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Ann", Some("ann_cf")).await;
        let mut source = ScriptedSource::default();
        source.submissions.insert("ann_cf".to_string(), Vec::new());
        let engine = engine(source, &store);

        let result = engine.sync_submissions(&id).await;
        assert_eq!(
            result,
            SyncResult::completed(0, "No Codeforces submissions found.")
        );
        assert!(last_sync(&store, &id).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn history_cap_is_reported_but_successful() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Ann", Some("ann_cf")).await;
        let settings = SyncSettings {
            page_size: 10,
            history_cap: 30,
            ..SyncSettings::default()
        };
        let engine = SyncEngine::new(
            ScriptedSource::default().with_submissions("ann_cf", 100, 1),
            store.clone(),
            settings,
        );

        let result = engine.sync_submissions(&id).await;
        assert!(result.success);
        assert!(result.history_capped);
        assert_eq!(result.new_count, 30);
        assert_eq!(engine.source().calls().len(), 3);
        assert_eq!(store.submission_watermark(&id).await.unwrap(), 100);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_syncs_do_not_duplicate() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Ann", Some("ann_cf")).await;
        let settings = SyncSettings {
            serialize_per_student: false,
            ..SyncSettings::default()
        };
        let engine = SyncEngine::new(
            ScriptedSource::default().with_submissions("ann_cf", 150, 1),
            store.clone(),
            settings,
        );

        let (left, right) = tokio::join!(engine.sync_submissions(&id), engine.sync_submissions(&id));

        assert!(left.success && right.success);
        assert_eq!(left.new_count + right.new_count, 150);
        assert_eq!(stored_count(&store, &id).await, 150);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serialized_syncs_fetch_once_each() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Ann", Some("ann_cf")).await;
        let engine = engine(ScriptedSource::default().with_submissions("ann_cf", 30, 1), &store);

        let (left, right) = tokio::join!(engine.sync_submissions(&id), engine.sync_submissions(&id));

        let mut counts = vec![left.new_count, right.new_count];
        counts.sort_unstable();
        assert_eq!(counts, vec![0, 30]);
        assert_eq!(engine.source().calls().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn student_locks_are_released_after_sync() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let ann = add_student(&store, "Ann", Some("ann_cf")).await;
        let bob = add_student(&store, "Bob", Some("bob_cf")).await;
        let engine = engine(
            ScriptedSource::default()
                .with_submissions("ann_cf", 30, 1)
                .with_submissions("bob_cf", 5, 1),
            &store,
        );

        tokio::join!(
            engine.sync_submissions(&ann),
            engine.sync_submissions(&ann),
            engine.sync_student(&bob, SyncScope::All),
        );

        assert!(engine.student_locks.lock().unwrap().is_empty());
        assert_eq!(stored_count(&store, &ann).await, 30);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn total_write_failure_is_persistence_error() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Ann", Some("ann_cf")).await;
        store
            .execute_raw(
                "CREATE TRIGGER reject_submissions BEFORE INSERT ON submissions
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END",
            )
            .await
            .unwrap();
        let engine = engine(ScriptedSource::default().with_submissions("ann_cf", 5, 1), &store);

        let result = engine.sync_submissions(&id).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(SyncErrorKind::PersistenceError));
        assert!(result.error.unwrap().starts_with("Bulk insert failed"));
        assert_eq!(last_sync(&store, &id).await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn source_failures_leave_watermark_untouched() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Ann", Some("ann_cf")).await;
        let mut source = ScriptedSource::default().with_submissions("ann_cf", 150, 1);
        source.fail_submissions_at = Some((101, SourceError::Unavailable("timed out".to_string())));
        source.fail_ratings = Some(SourceError::Api("Unknown".to_string()));
        let engine = engine(source, &store);

        let submissions = engine.sync_submissions(&id).await;
        assert_eq!(submissions.error_kind, Some(SyncErrorKind::SourceUnavailable));

        let contests = engine.sync_contests(&id).await;
        assert_eq!(contests.error_kind, Some(SyncErrorKind::SourceError));
        assert_eq!(contests.error.as_deref(), Some("CF API error: Unknown"));

        assert_eq!(stored_count(&store, &id).await, 0);
        assert_eq!(last_sync(&store, &id).await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn contests_keep_only_newer_entries() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Ann", Some("ann_cf")).await;

        let first = engine(
            ScriptedSource::default().with_ratings("ann_cf", &[(1, 100), (2, 200)]),
            &store,
        );
        let result = first.sync_contests(&id).await;
        assert_eq!(
            result.message.as_deref(),
            Some("Synced 2 new contest participations.")
        );

        let grown = engine(
            ScriptedSource::default().with_ratings("ann_cf", &[(1, 100), (2, 200), (3, 300)]),
            &store,
        );
        assert_eq!(grown.sync_contests(&id).await.new_count, 1);
        assert_eq!(
            grown.sync_contests(&id).await.message.as_deref(),
            Some("Already up-to-date.")
        );
        assert_eq!(store.contest_watermark(&id).await.unwrap(), 300_000);
        assert_eq!(store.list_contests(&id).await.unwrap().len(), 3);

        let empty = engine(ScriptedSource::default(), &store);
        assert_eq!(
            empty.sync_contests(&id).await.message.as_deref(),
            Some("No contest participations found.")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_all_covers_students_with_handles() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let ann = add_student(&store, "Ann", Some("ann_cf")).await;
        let bob = add_student(&store, "Bob", Some("bob_cf")).await;
        add_student(&store, "Cid", None).await;

        let source = ScriptedSource::default()
            .with_submissions("ann_cf", 10, 1)
            .with_submissions("bob_cf", 25, 11)
            .with_ratings("bob_cf", &[(5, 500)]);
        let engine = engine(source, &store);

        let mut reports = engine.sync_all(SyncScope::All, 4).await.unwrap();
        reports.sort_by_key(|report| report.student_id.as_str());

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(StudentSyncReport::success));
        assert_eq!(stored_count(&store, &ann).await, 10);
        assert_eq!(stored_count(&store, &bob).await, 15);
        assert_eq!(store.list_contests(&bob).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scope_limits_streams() {
        let store = DatabaseService::open_in_memory().await.unwrap();
        let id = add_student(&store, "Ann", Some("ann_cf")).await;
        let engine = engine(ScriptedSource::default().with_submissions("ann_cf", 3, 1), &store);

        let report = engine.sync_student(&id, SyncScope::Submissions).await;
        assert!(report.contests.is_none());
        assert_eq!(report.submissions.map(|r| r.new_count), Some(3));
        assert_eq!(engine.source().calls(), vec!["user.status ann_cf 1 100"]);
    }
}
