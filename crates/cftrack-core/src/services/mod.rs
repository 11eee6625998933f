//! Services shared by the sync engine and the CLI

mod database;

pub use database::{DatabaseService, SyncStatus};
