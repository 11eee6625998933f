//! Shared database service wrapper used by the sync engine and the CLI.
//!
//! The service is the watermark store and the persistence layer in one
//! handle: it is cheap to clone, serializes access to the single libSQL
//! connection, and every method takes the lock only for its own statements.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::{
    ContestRepository, Database, InsertReport, LibSqlContestRepository, LibSqlStudentRepository,
    LibSqlSubmissionRepository, StudentRepository, SubmissionRepository,
};
use crate::models::{ContestParticipation, Student, StudentId, Submission};
use crate::Result;

/// Watermark and record counts for one student
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub student_id: StudentId,
    pub handle: Option<String>,
    pub last_sync: Option<i64>,
    pub last_submission_id: i64,
    pub last_contest_time: i64,
    pub submission_count: usize,
    pub contest_count: usize,
}

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and a fresh one created.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Detected invalid database file at {}: {}. Moving it aside and retrying once.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let file_name = db_path
                .file_name()
                .map_or_else(|| "cftrack.db".into(), |name| name.to_string_lossy());
            let backup_path = db_path.with_file_name(format!("{file_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale sidecar file {}", path.display());
            }
        }

        Ok(())
    }

    /// Add a student to the roster.
    pub async fn create_student(&self, student: Student) -> Result<Student> {
        let db = self.db.lock().await;
        LibSqlStudentRepository::new(db.connection())
            .create(student)
            .await
    }

    /// Fetch a student by id.
    pub async fn get_student(&self, id: &StudentId) -> Result<Option<Student>> {
        let db = self.db.lock().await;
        LibSqlStudentRepository::new(db.connection()).get(id).await
    }

    /// List students by name.
    pub async fn list_students(&self, limit: usize, offset: usize) -> Result<Vec<Student>> {
        let db = self.db.lock().await;
        LibSqlStudentRepository::new(db.connection())
            .list(limit, offset)
            .await
    }

    /// List students eligible for sync.
    pub async fn list_syncable_students(&self) -> Result<Vec<Student>> {
        let db = self.db.lock().await;
        LibSqlStudentRepository::new(db.connection())
            .list_with_handle()
            .await
    }

    /// Resolve full student ids by prefix.
    pub async fn list_student_ids_by_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        LibSqlStudentRepository::new(db.connection())
            .list_ids_by_prefix(prefix, limit)
            .await
    }

    /// Replace or clear a student's handle.
    pub async fn set_student_handle(
        &self,
        id: &StudentId,
        handle: Option<String>,
    ) -> Result<Student> {
        let db = self.db.lock().await;
        LibSqlStudentRepository::new(db.connection())
            .set_handle(id, handle)
            .await
    }

    /// Remove a student and their records.
    pub async fn delete_student(&self, id: &StudentId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlStudentRepository::new(db.connection())
            .delete(id)
            .await
    }

    /// Submission watermark: highest stored judge id, 0 if none.
    pub async fn submission_watermark(&self, id: &StudentId) -> Result<i64> {
        let db = self.db.lock().await;
        LibSqlSubmissionRepository::new(db.connection())
            .last_submission_id(id)
            .await
    }

    /// Contest watermark: latest stored contest time (Unix ms), 0 if none.
    pub async fn contest_watermark(&self, id: &StudentId) -> Result<i64> {
        let db = self.db.lock().await;
        LibSqlContestRepository::new(db.connection())
            .last_contest_time(id)
            .await
    }

    /// Stamp a completed sync.
    pub async fn advance_last_sync(&self, id: &StudentId, at: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlStudentRepository::new(db.connection())
            .touch_last_sync(id, at)
            .await
    }

    /// Insert-only bulk write of staged submissions.
    pub async fn insert_submissions(&self, submissions: Vec<Submission>) -> Result<InsertReport> {
        let db = self.db.lock().await;
        LibSqlSubmissionRepository::new(db.connection())
            .insert_many(submissions)
            .await
    }

    /// Insert-only bulk write of staged contest participations.
    pub async fn insert_contests(
        &self,
        contests: Vec<ContestParticipation>,
    ) -> Result<InsertReport> {
        let db = self.db.lock().await;
        LibSqlContestRepository::new(db.connection())
            .insert_many(contests)
            .await
    }

    /// Most recent stored submissions for a student.
    pub async fn list_recent_submissions(
        &self,
        id: &StudentId,
        limit: usize,
    ) -> Result<Vec<Submission>> {
        let db = self.db.lock().await;
        LibSqlSubmissionRepository::new(db.connection())
            .list_recent(id, limit)
            .await
    }

    /// Stored contest history for a student, oldest first.
    pub async fn list_contests(&self, id: &StudentId) -> Result<Vec<ContestParticipation>> {
        let db = self.db.lock().await;
        LibSqlContestRepository::new(db.connection())
            .list_for_student(id)
            .await
    }

    /// Watermarks and counts for one student, `None` if unknown.
    pub async fn sync_status(&self, id: &StudentId) -> Result<Option<SyncStatus>> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let Some(student) = LibSqlStudentRepository::new(conn).get(id).await? else {
            return Ok(None);
        };
        let submissions = LibSqlSubmissionRepository::new(conn);
        let contests = LibSqlContestRepository::new(conn);

        Ok(Some(SyncStatus {
            student_id: student.id,
            handle: student.cf_handle,
            last_sync: student.last_sync,
            last_submission_id: submissions.last_submission_id(id).await?,
            last_contest_time: contests.last_contest_time(id).await?,
            submission_count: submissions.count_for_student(id).await?,
            contest_count: contests.count_for_student(id).await?,
        }))
    }

    /// Run a raw statement; lets engine tests install failing triggers.
    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute(sql, ()).await?;
        Ok(())
    }
}
