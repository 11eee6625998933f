//! Student model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a student, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(Uuid);

impl StudentId {
    /// Create a new unique student ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for StudentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StudentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A student on the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Codeforces handle; sync is refused while this is unset
    pub cf_handle: Option<String>,
    pub current_rating: i64,
    pub max_rating: i64,
    pub is_active: bool,
    /// Last completed sync (Unix ms); `None` until the first one
    pub last_sync: Option<i64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Student {
    /// Build a fresh roster entry from user input.
    ///
    /// The input is stored as given; the repository normalizes and validates
    /// it before writing.
    #[must_use]
    pub fn new(input: NewStudent) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: StudentId::new(),
            name: input.name,
            email: input.email,
            phone: input.phone,
            cf_handle: input.cf_handle,
            current_rating: input.current_rating,
            max_rating: input.max_rating,
            is_active: input.is_active,
            last_sync: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Handle to sync with, if one is configured
    #[must_use]
    pub fn handle(&self) -> Option<&str> {
        self.cf_handle
            .as_deref()
            .map(str::trim)
            .filter(|handle| !handle.is_empty())
    }
}

/// Fields accepted when adding a student to the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub cf_handle: Option<String>,
    #[serde(default)]
    pub current_rating: i64,
    #[serde(default)]
    pub max_rating: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

impl Default for NewStudent {
    fn default() -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            phone: None,
            cf_handle: None,
            current_rating: 0,
            max_rating: 0,
            is_active: default_active(),
        }
    }
}
