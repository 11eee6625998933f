//! Data models for cftrack

mod contest;
mod student;
mod submission;
mod sync_result;

pub use contest::ContestParticipation;
pub use student::{NewStudent, Student, StudentId};
pub use submission::{problem_key, Submission, Verdict};
pub use sync_result::{StudentSyncReport, SyncErrorKind, SyncResult};
