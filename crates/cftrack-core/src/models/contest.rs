//! Contest participation model

use serde::{Deserialize, Serialize};

use super::StudentId;

/// One rated contest a student took part in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestParticipation {
    pub student_id: StudentId,
    pub contest_id: i64,
    pub contest_name: Option<String>,
    /// Final standing, 1-based
    pub rank: i64,
    pub old_rating: i64,
    pub new_rating: i64,
    pub problems_solved: i64,
    /// Rating update time (Unix ms); drives the contest watermark
    pub contest_time: i64,
    /// Local insertion time (Unix ms), stamped on write
    pub created_at: i64,
}

impl ContestParticipation {
    #[must_use]
    pub const fn rating_change(&self) -> i64 {
        self.new_rating - self.old_rating
    }
}
