pub mod common;
pub mod completions;
pub mod config;
pub mod status;
pub mod student;
pub mod sync;
