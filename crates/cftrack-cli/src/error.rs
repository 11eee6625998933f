use std::io;

use cftrack_core::config::ConfigError;
use cftrack_core::source::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] cftrack_core::Error),
    #[error(transparent)]
    Settings(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Student ID cannot be empty")]
    EmptyStudentId,
    #[error("Student not found for id/prefix: {0}")]
    StudentNotFound(String),
    #[error("{0}")]
    AmbiguousStudentId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    SyncFailed(String),
}
