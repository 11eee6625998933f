//! Database layer for cftrack

mod batch;
mod connection;
mod contest_repository;
mod migrations;
pub mod normalize;
mod student_repository;
mod submission_repository;

pub use batch::{InsertReport, Rejection};
pub use connection::Database;
pub use contest_repository::{ContestRepository, LibSqlContestRepository};
pub use student_repository::{LibSqlStudentRepository, StudentRepository};
pub use submission_repository::{LibSqlSubmissionRepository, SubmissionRepository};
