//! Contest participation repository implementation

use crate::error::{Error, Result};
use crate::models::{ContestParticipation, StudentId};
use libsql::{Connection, Row, Value};

use super::batch::{insert_unordered, InsertReport};
use super::normalize::normalize_contest;
use super::student_repository::text_or_null;

const INSERT_CONTEST: &str = "INSERT INTO contest_participations (
        student_id, contest_id, contest_name, rank, old_rating, new_rating,
        problems_solved, contest_time, created_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(student_id, contest_id) DO NOTHING";

/// Trait for contest participation storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ContestRepository {
    /// Insert-only bulk write keyed by `(student_id, contest_id)`
    async fn insert_many(&self, contests: Vec<ContestParticipation>) -> Result<InsertReport>;

    /// Latest stored contest time (Unix ms) for a student, 0 when none
    async fn last_contest_time(&self, student_id: &StudentId) -> Result<i64>;

    /// Number of stored participations for a student
    async fn count_for_student(&self, student_id: &StudentId) -> Result<usize>;

    /// Full contest history for a student, oldest first
    async fn list_for_student(&self, student_id: &StudentId) -> Result<Vec<ContestParticipation>>;
}

/// libSQL implementation of `ContestRepository`
pub struct LibSqlContestRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlContestRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn to_params(contest: ContestParticipation) -> (String, Vec<Value>) {
        (
            format!("{}/{}", contest.student_id, contest.contest_id),
            vec![
                Value::Text(contest.student_id.as_str()),
                Value::Integer(contest.contest_id),
                text_or_null(contest.contest_name),
                Value::Integer(contest.rank),
                Value::Integer(contest.old_rating),
                Value::Integer(contest.new_rating),
                Value::Integer(contest.problems_solved),
                Value::Integer(contest.contest_time),
                Value::Integer(contest.created_at),
            ],
        )
    }

    fn parse_contest(row: &Row) -> Result<ContestParticipation> {
        let student_id: String = row.get(0)?;
        Ok(ContestParticipation {
            student_id: student_id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid student ID: {student_id}")))?,
            contest_id: row.get(1)?,
            contest_name: row.get::<Option<String>>(2)?,
            rank: row.get(3)?,
            old_rating: row.get(4)?,
            new_rating: row.get(5)?,
            problems_solved: row.get(6)?,
            contest_time: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    async fn scalar(&self, sql: &str, student_id: &StudentId) -> Result<i64> {
        let mut rows = self.conn.query(sql, [student_id.as_str()]).await?;
        Ok(match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        })
    }
}

impl ContestRepository for LibSqlContestRepository<'_> {
    async fn insert_many(&self, contests: Vec<ContestParticipation>) -> Result<InsertReport> {
        let now = chrono::Utc::now().timestamp_millis();
        let rows = contests
            .into_iter()
            .map(|contest| Self::to_params(normalize_contest(contest, now)));

        insert_unordered(self.conn, INSERT_CONTEST, rows).await
    }

    async fn last_contest_time(&self, student_id: &StudentId) -> Result<i64> {
        self.scalar(
            "SELECT COALESCE(MAX(contest_time), 0) FROM contest_participations WHERE student_id = ?",
            student_id,
        )
        .await
    }

    async fn count_for_student(&self, student_id: &StudentId) -> Result<usize> {
        let count = self
            .scalar(
                "SELECT COUNT(*) FROM contest_participations WHERE student_id = ?",
                student_id,
            )
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn list_for_student(&self, student_id: &StudentId) -> Result<Vec<ContestParticipation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT student_id, contest_id, contest_name, rank, old_rating, new_rating,
                        problems_solved, contest_time, created_at
                 FROM contest_participations
                 WHERE student_id = ?
                 ORDER BY contest_time ASC",
                [student_id.as_str()],
            )
            .await?;

        let mut contests = Vec::new();
        while let Some(row) = rows.next().await? {
            contests.push(Self::parse_contest(&row)?);
        }
        Ok(contests)
    }
}
