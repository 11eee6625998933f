//! Outcome values returned by the sync engine.
//!
//! These are never persisted; they are handed back to whoever triggered the
//! sync (CLI, scheduler) which decides whether to retry.

use serde::{Deserialize, Serialize};

use super::StudentId;

/// Classification of an aborted sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    NotFound,
    SourceUnavailable,
    SourceError,
    DataOutdated,
    PersistenceError,
}

/// Result of one sync invocation for one record stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    /// Records actually inserted by this run
    pub new_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_outdated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<SyncErrorKind>,
    /// The walk stopped at the history cap before reaching stored data
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub history_capped: bool,
}

impl SyncResult {
    #[must_use]
    pub fn completed(new_count: usize, message: impl Into<String>) -> Self {
        Self {
            success: true,
            new_count,
            data_outdated: None,
            message: Some(message.into()),
            error: None,
            error_kind: None,
            history_capped: false,
        }
    }

    #[must_use]
    pub fn aborted(kind: SyncErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            new_count: 0,
            data_outdated: None,
            message: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            history_capped: false,
        }
    }

    /// Regression: the judge reports less history than is stored.
    #[must_use]
    pub fn outdated(message: impl Into<String>) -> Self {
        Self {
            success: false,
            new_count: 0,
            data_outdated: Some(true),
            message: Some(message.into()),
            error: None,
            error_kind: Some(SyncErrorKind::DataOutdated),
            history_capped: false,
        }
    }

    #[must_use]
    pub const fn with_history_capped(mut self, capped: bool) -> Self {
        self.history_capped = capped;
        self
    }

    #[must_use]
    pub const fn is_data_outdated(&self) -> bool {
        matches!(self.data_outdated, Some(true))
    }

    /// One-line summary for logs and terminal output
    #[must_use]
    pub fn summary(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        self.message
            .clone()
            .unwrap_or_else(|| format!("{} new records", self.new_count))
    }
}

/// Combined submissions + contests outcome for one student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSyncReport {
    pub student_id: StudentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submissions: Option<SyncResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contests: Option<SyncResult>,
}

impl StudentSyncReport {
    /// True when every stream that ran completed
    #[must_use]
    pub fn success(&self) -> bool {
        self.submissions.iter().chain(&self.contests).all(|result| result.success)
    }
}
