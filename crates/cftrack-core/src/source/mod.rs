//! External judge access.
//!
//! `JudgeSource` is the seam between the sync engine and Codeforces. The
//! production implementation is [`CodeforcesClient`]; tests drive the engine
//! with scripted sources instead.

mod codeforces;
mod payload;

use thiserror::Error;

use crate::models::{problem_key, ContestParticipation, StudentId, Submission, Verdict};
use crate::util::seconds_to_millis;

pub use codeforces::CodeforcesClient;
pub use payload::{parse_envelope, parse_rating_history, parse_submissions, Parsed};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Transport failure or timeout; nothing structured came back
    #[error("Codeforces is unavailable: {0}")]
    Unavailable(String),
    /// The judge answered with a failure status
    #[error("CF API error: {0}")]
    Api(String),
    /// The request itself was out of bounds
    #[error("Invalid judge request: {0}")]
    InvalidRequest(String),
    /// The judge answered, but not in a shape we understand
    #[error("Invalid Codeforces payload: {0}")]
    InvalidPayload(String),
}

impl SourceError {
    /// Transport-level failures, as opposed to answers from the judge
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Read-only access to a judge's submission and rating history.
#[allow(async_fn_in_trait)]
pub trait JudgeSource {
    /// One page of submissions, newest first. `start` is 1-based.
    async fn fetch_submission_page(
        &self,
        handle: &str,
        start: u32,
        count: u32,
    ) -> SourceResult<SubmissionPage>;

    /// The complete rated-contest history; the judge does not paginate it.
    async fn fetch_rating_history(&self, handle: &str) -> SourceResult<Vec<ExternalRatingChange>>;
}

/// A fetched submission page.
///
/// `fetched` counts every item the judge returned, including ones dropped as
/// malformed, so page-exhaustion and cap checks see the judge's real page
/// length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionPage {
    pub items: Vec<ExternalSubmission>,
    pub fetched: usize,
}

impl SubmissionPage {
    pub fn new(items: Vec<ExternalSubmission>) -> Self {
        let fetched = items.len();
        Self { items, fetched }
    }

    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }

    /// Id of the newest item that passed validation. A malformed head item
    /// is skipped, so this can be older than the page's true head.
    pub fn latest_id(&self) -> Option<i64> {
        self.items.first().map(|item| item.id)
    }
}

/// A submission as reported by the judge, after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSubmission {
    pub id: i64,
    pub contest_id: Option<i64>,
    pub problem_index: String,
    pub problem_name: Option<String>,
    pub problem_rating: i64,
    pub tags: Vec<String>,
    pub verdict: Option<String>,
    pub creation_time_seconds: i64,
    pub language: Option<String>,
    pub time_consumed_ms: i64,
    pub memory_consumed_bytes: i64,
    pub passed_test_count: Option<i64>,
    pub participant_type: Option<String>,
}

impl ExternalSubmission {
    /// Stage this item as a stored record for `student_id`.
    pub fn into_submission(self, student_id: StudentId) -> Submission {
        Submission {
            cf_submission_id: self.id,
            student_id,
            contest_id: self.contest_id,
            problem_id: problem_key(self.contest_id, &self.problem_index),
            problem_name: self.problem_name.unwrap_or_default(),
            problem_rating: self.problem_rating,
            problem_tags: self.tags,
            verdict: Verdict::from(self.verdict.as_deref().unwrap_or_default()),
            submitted_at: seconds_to_millis(self.creation_time_seconds),
            language: self.language.unwrap_or_default(),
            time_ms: self.time_consumed_ms,
            memory_bytes: self.memory_consumed_bytes,
            passed_test_count: self.passed_test_count,
            is_contest_submission: self.participant_type.as_deref() == Some("CONTESTANT"),
            created_at: 0,
        }
    }
}

/// One rated contest from the judge's rating history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRatingChange {
    pub contest_id: i64,
    pub contest_name: Option<String>,
    pub rank: i64,
    pub old_rating: i64,
    pub new_rating: i64,
    pub rating_update_time_seconds: i64,
}

impl ExternalRatingChange {
    /// Participation time in stored units (Unix ms)
    pub const fn contest_time(&self) -> i64 {
        seconds_to_millis(self.rating_update_time_seconds)
    }

    /// Stage this entry as a stored record for `student_id`.
    pub fn into_participation(self, student_id: StudentId) -> ContestParticipation {
        ContestParticipation {
            student_id,
            contest_id: self.contest_id,
            contest_time: self.contest_time(),
            contest_name: self.contest_name,
            rank: self.rank,
            old_rating: self.old_rating,
            new_rating: self.new_rating,
            // user.rating does not report solved counts
            problems_solved: 0,
            created_at: 0,
        }
    }
}
