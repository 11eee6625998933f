//! Submission repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::models::{StudentId, Submission, Verdict};
use libsql::{params, Connection, Row, Value};

use super::batch::{insert_unordered, InsertReport};
use super::normalize::normalize_submission;
use super::student_repository::int_or_null;

const INSERT_SUBMISSION: &str = "INSERT INTO submissions (
        cf_submission_id, student_id, contest_id, problem_id, problem_name, problem_rating,
        problem_tags, verdict, submitted_at, language, time_ms, memory_bytes,
        passed_test_count, is_contest_submission, created_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(cf_submission_id) DO NOTHING";

/// Trait for submission storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SubmissionRepository {
    /// Insert-only bulk write keyed by `cf_submission_id`
    async fn insert_many(&self, submissions: Vec<Submission>) -> Result<InsertReport>;

    /// Highest stored judge submission id for a student, 0 when none
    async fn last_submission_id(&self, student_id: &StudentId) -> Result<i64>;

    /// Number of stored submissions for a student
    async fn count_for_student(&self, student_id: &StudentId) -> Result<usize>;

    /// Most recent submissions for a student, newest first
    async fn list_recent(&self, student_id: &StudentId, limit: usize) -> Result<Vec<Submission>>;
}

/// libSQL implementation of `SubmissionRepository`
pub struct LibSqlSubmissionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSubmissionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn to_params(submission: Submission) -> Result<(String, Vec<Value>)> {
        let tags = serde_json::to_string(&submission.problem_tags)?;
        Ok((
            submission.cf_submission_id.to_string(),
            vec![
                Value::Integer(submission.cf_submission_id),
                Value::Text(submission.student_id.as_str()),
                int_or_null(submission.contest_id),
                Value::Text(submission.problem_id),
                Value::Text(submission.problem_name),
                Value::Integer(submission.problem_rating),
                Value::Text(tags),
                Value::Text(submission.verdict.to_string()),
                Value::Integer(submission.submitted_at),
                Value::Text(submission.language),
                Value::Integer(submission.time_ms),
                Value::Integer(submission.memory_bytes),
                int_or_null(submission.passed_test_count),
                Value::Integer(i64::from(submission.is_contest_submission)),
                Value::Integer(submission.created_at),
            ],
        ))
    }

    fn parse_submission(row: &Row) -> Result<Submission> {
        let student_id: String = row.get(1)?;
        let tags: String = row.get(6)?;
        let verdict: String = row.get(7)?;
        Ok(Submission {
            cf_submission_id: row.get(0)?,
            student_id: student_id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid student ID: {student_id}")))?,
            contest_id: row.get::<Option<i64>>(2)?,
            problem_id: row.get(3)?,
            problem_name: row.get(4)?,
            problem_rating: row.get(5)?,
            problem_tags: serde_json::from_str(&tags).unwrap_or_default(),
            verdict: Verdict::from(verdict),
            submitted_at: row.get(8)?,
            language: row.get(9)?,
            time_ms: row.get(10)?,
            memory_bytes: row.get(11)?,
            passed_test_count: row.get::<Option<i64>>(12)?,
            is_contest_submission: row.get::<i64>(13)? != 0,
            created_at: row.get(14)?,
        })
    }
}

impl SubmissionRepository for LibSqlSubmissionRepository<'_> {
    async fn insert_many(&self, submissions: Vec<Submission>) -> Result<InsertReport> {
        let now = chrono::Utc::now().timestamp_millis();
        let rows = submissions
            .into_iter()
            .map(|submission| Self::to_params(normalize_submission(submission, now)))
            .collect::<Result<Vec<_>>>()?;

        insert_unordered(self.conn, INSERT_SUBMISSION, rows).await
    }

    async fn last_submission_id(&self, student_id: &StudentId) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COALESCE(MAX(cf_submission_id), 0) FROM submissions WHERE student_id = ?",
                [student_id.as_str()],
            )
            .await?;

        Ok(match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        })
    }

    async fn count_for_student(&self, student_id: &StudentId) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM submissions WHERE student_id = ?",
                [student_id.as_str()],
            )
            .await?;

        Ok(match rows.next().await? {
            Some(row) => usize::try_from(row.get::<i64>(0)?).unwrap_or_default(),
            None => 0,
        })
    }

    async fn list_recent(&self, student_id: &StudentId, limit: usize) -> Result<Vec<Submission>> {
        let mut rows = self
            .conn
            .query(
                "SELECT cf_submission_id, student_id, contest_id, problem_id, problem_name,
                        problem_rating, problem_tags, verdict, submitted_at, language, time_ms,
                        memory_bytes, passed_test_count, is_contest_submission, created_at
                 FROM submissions
                 WHERE student_id = ?
                 ORDER BY cf_submission_id DESC
                 LIMIT ?",
                params![student_id.as_str(), limit as i64],
            )
            .await?;

        let mut submissions = Vec::new();
        while let Some(row) = rows.next().await? {
            submissions.push(Self::parse_submission(&row)?);
        }
        Ok(submissions)
    }
}
