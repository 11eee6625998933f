//! Unordered, insert-only batch writes.

use libsql::{Connection, Value};
use serde::Serialize;

use crate::error::Result;

/// Why a staged record was not written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    /// The uniqueness key already exists; the stored record is left untouched
    Duplicate { key: String },
    /// Any other write failure for this record
    Write { key: String, reason: String },
}

impl Rejection {
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Outcome of one batch write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub attempted: usize,
    pub inserted: usize,
    pub rejected: Vec<Rejection>,
}

impl InsertReport {
    pub fn duplicates(&self) -> usize {
        self.rejected.iter().filter(|r| r.is_duplicate()).count()
    }

    /// Everything failed, and not merely because it was already stored.
    pub fn is_total_failure(&self) -> bool {
        self.attempted > 0
            && self.inserted == 0
            && self.rejected.iter().any(|r| !r.is_duplicate())
    }

    /// First non-duplicate failure, for error messages
    pub fn first_failure(&self) -> Option<&str> {
        self.rejected.iter().find_map(|r| match r {
            Rejection::Write { reason, .. } => Some(reason.as_str()),
            Rejection::Duplicate { .. } => None,
        })
    }
}

/// Run `sql` once per row inside a single transaction.
///
/// `sql` must carry an `ON CONFLICT ... DO NOTHING` clause: a row that
/// changes nothing is counted as a duplicate. A failing row is recorded and
/// the remaining rows are still attempted.
pub async fn insert_unordered<I>(conn: &Connection, sql: &str, rows: I) -> Result<InsertReport>
where
    I: IntoIterator<Item = (String, Vec<Value>)>,
{
    let mut report = InsertReport::default();

    conn.execute("BEGIN TRANSACTION", ()).await?;

    for (key, params) in rows {
        report.attempted += 1;
        match conn.execute(sql, params).await {
            Ok(0) => report.rejected.push(Rejection::Duplicate { key }),
            Ok(_) => report.inserted += 1,
            Err(error) => {
                tracing::warn!("Rejected record {key}: {error}");
                report.rejected.push(Rejection::Write {
                    key,
                    reason: error.to_string(),
                });
            }
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(report)
}
