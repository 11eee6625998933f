//! cftrack-core - Core library for cftrack
//!
//! This crate contains the student roster models, the local database layer,
//! the Codeforces client and the incremental sync engine used by the CLI.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod source;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{ContestParticipation, Student, StudentId, Submission, SyncResult};
