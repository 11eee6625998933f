//! Sync engine configuration.
//!
//! `SyncSettings` carries the knobs of the incremental sync: where the judge
//! API lives, how large each page is, how much history one invocation may
//! walk, and how the HTTP client paces and bounds its requests.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

/// Public Codeforces API root.
pub const DEFAULT_API_BASE_URL: &str = "https://codeforces.com/api";
/// Largest page the judge serves per `user.status` call.
pub const MAX_PAGE_SIZE: u32 = 100;

const DEFAULT_PAGE_SIZE: u32 = 100;
const DEFAULT_HISTORY_CAP: u32 = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MIN_REQUEST_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables for the judge client and the submission walk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub api_base_url: String,
    /// Items requested per `user.status` page.
    pub page_size: u32,
    /// Upper bound on submissions fetched by one invocation.
    pub history_cap: u32,
    pub request_timeout_secs: u64,
    /// Minimum spacing between two judge requests issued by one client.
    pub min_request_interval_ms: u64,
    /// Serialize concurrent syncs of the same student inside one engine.
    pub serialize_per_student: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            history_cap: DEFAULT_HISTORY_CAP,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            min_request_interval_ms: DEFAULT_MIN_REQUEST_INTERVAL_MS,
            serialize_per_student: true,
        }
    }
}

impl SyncSettings {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// Check the settings against the judge's limits.
    pub fn validate(&self) -> ConfigResult<()> {
        if !is_http_url(self.api_base_url.trim()) {
            return Err(invalid(
                "api_base_url",
                "must include http:// or https://",
            ));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(invalid(
                "page_size",
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
        if self.history_cap < self.page_size {
            return Err(invalid("history_cap", "must be at least page_size"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be positive"));
        }
        Ok(())
    }

    /// Apply `CFTRACK_*` overrides read through `lookup`.
    ///
    /// Taking the lookup as a closure keeps this testable without touching
    /// the process environment.
    pub fn apply_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| normalize_text_option(lookup(key));

        if let Some(url) = read("CFTRACK_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(value) = read("CFTRACK_PAGE_SIZE") {
            self.page_size = parse_number("page_size", &value)?;
        }
        if let Some(value) = read("CFTRACK_HISTORY_CAP") {
            self.history_cap = parse_number("history_cap", &value)?;
        }
        if let Some(value) = read("CFTRACK_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("request_timeout_secs", &value)?;
        }
        if let Some(value) = read("CFTRACK_MIN_REQUEST_INTERVAL_MS") {
            self.min_request_interval_ms = parse_number("min_request_interval_ms", &value)?;
        }

        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> ConfigResult<T> {
    raw.parse()
        .map_err(|_| invalid(field, format!("'{raw}' is not a valid number")))
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
