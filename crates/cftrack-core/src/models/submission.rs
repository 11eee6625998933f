//! Submission model

use serde::{Deserialize, Serialize};
use std::fmt;

use super::StudentId;

/// Judge verdict, collapsed to accepted vs. everything else.
///
/// Non-accepted verdicts keep the judge's raw label (`WRONG_ANSWER`,
/// `TIME_LIMIT_EXCEEDED`, ...) so reports can still break them down.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Verdict {
    Accepted,
    Other(String),
}

impl Verdict {
    const ACCEPTED: &'static str = "OK";

    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Accepted => Self::ACCEPTED,
            Self::Other(label) => label,
        }
    }
}

impl From<&str> for Verdict {
    fn from(value: &str) -> Self {
        let value = value.trim();
        if value == Self::ACCEPTED {
            Self::Accepted
        } else if value.is_empty() {
            Self::Other("UNKNOWN".to_string())
        } else {
            Self::Other(value.to_string())
        }
    }
}

impl From<String> for Verdict {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Verdict> for String {
    fn from(value: Verdict) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A judged submission stored for a student.
///
/// Records are insert-only: once written, sync never touches them again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Judge-side submission id, unique across all students
    pub cf_submission_id: i64,
    pub student_id: StudentId,
    pub contest_id: Option<i64>,
    /// Composite problem identity, e.g. `1851A`
    pub problem_id: String,
    pub problem_name: String,
    /// Difficulty rating, 0 when the judge has none
    pub problem_rating: i64,
    pub problem_tags: Vec<String>,
    pub verdict: Verdict,
    /// Judge creation time (Unix ms)
    pub submitted_at: i64,
    pub language: String,
    pub time_ms: i64,
    pub memory_bytes: i64,
    pub passed_test_count: Option<i64>,
    pub is_contest_submission: bool,
    /// Local insertion time (Unix ms), stamped on write
    pub created_at: i64,
}

/// Build the composite problem identity from contest id and index.
#[must_use]
pub fn problem_key(contest_id: Option<i64>, index: &str) -> String {
    let index = index.trim();
    contest_id.map_or_else(|| index.to_string(), |contest| format!("{contest}{index}"))
}
