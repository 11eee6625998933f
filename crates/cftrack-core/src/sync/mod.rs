//! Incremental Codeforces sync.
//!
//! The page walk and contest filter are plain functions over a
//! [`JudgeSource`](crate::source::JudgeSource); [`SyncEngine`] wires them to
//! the store, advances watermarks and folds every failure into a
//! [`SyncResult`].

mod contests;
mod engine;
mod submissions;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{SyncErrorKind, SyncResult};
use crate::source::SourceError;

pub use contests::select_new_contests;
pub use engine::SyncEngine;
pub use submissions::{walk_submissions, SubmissionWalk, WalkOutcome};

/// Why a sync run was aborted
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Student or Codeforces handle not found")]
    NotFound,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Data mismatch: latest CF ID {latest} < stored ID {stored}")]
    DataOutdated { latest: i64, stored: i64 },

    #[error("Bulk insert failed: {0}")]
    Persistence(String),

    #[error("Store error: {0}")]
    Store(#[from] crate::Error),
}

impl SyncError {
    pub const fn kind(&self) -> SyncErrorKind {
        match self {
            Self::NotFound => SyncErrorKind::NotFound,
            Self::Source(SourceError::Unavailable(_)) => SyncErrorKind::SourceUnavailable,
            Self::Source(_) => SyncErrorKind::SourceError,
            Self::DataOutdated { .. } => SyncErrorKind::DataOutdated,
            Self::Persistence(_) | Self::Store(_) => SyncErrorKind::PersistenceError,
        }
    }
}

impl From<SyncError> for SyncResult {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::DataOutdated { .. } => Self::outdated(error.to_string()),
            _ => Self::aborted(error.kind(), error.to_string()),
        }
    }
}

/// Which record streams a sync run covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncScope {
    #[default]
    All,
    Submissions,
    Contests,
}

impl SyncScope {
    pub const fn includes_submissions(self) -> bool {
        matches!(self, Self::All | Self::Submissions)
    }

    pub const fn includes_contests(self) -> bool {
        matches!(self, Self::All | Self::Contests)
    }
}
