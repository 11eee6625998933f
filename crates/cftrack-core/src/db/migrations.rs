//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Execute `statements` atomically; libsql has no `execute_batch`.
async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: roster, submissions and contest history
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                phone TEXT,
                cf_handle TEXT UNIQUE,
                current_rating INTEGER NOT NULL DEFAULT 0,
                max_rating INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_sync INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_students_handle ON students(cf_handle)",
            // cf_submission_id is the dedup key for insert-only sync
            "CREATE TABLE IF NOT EXISTS submissions (
                cf_submission_id INTEGER PRIMARY KEY,
                student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
                contest_id INTEGER,
                problem_id TEXT NOT NULL,
                problem_name TEXT NOT NULL,
                problem_rating INTEGER NOT NULL DEFAULT 0,
                problem_tags TEXT NOT NULL DEFAULT '[]',
                verdict TEXT NOT NULL,
                submitted_at INTEGER NOT NULL,
                language TEXT NOT NULL,
                time_ms INTEGER NOT NULL DEFAULT 0,
                memory_bytes INTEGER NOT NULL DEFAULT 0,
                passed_test_count INTEGER,
                is_contest_submission INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_submissions_student
                ON submissions(student_id, cf_submission_id DESC)",
            "CREATE INDEX IF NOT EXISTS idx_submissions_submitted
                ON submissions(student_id, submitted_at DESC)",
            "CREATE TABLE IF NOT EXISTS contest_participations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
                contest_id INTEGER NOT NULL,
                contest_name TEXT,
                rank INTEGER NOT NULL CHECK (rank >= 1),
                old_rating INTEGER NOT NULL DEFAULT 0 CHECK (old_rating >= 0),
                new_rating INTEGER NOT NULL DEFAULT 0 CHECK (new_rating >= 0),
                problems_solved INTEGER NOT NULL DEFAULT 0 CHECK (problems_solved >= 0),
                contest_time INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_contests_student_time
                ON contest_participations(student_id, contest_time DESC)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_contests_student_contest
                ON contest_participations(student_id, contest_id)",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
