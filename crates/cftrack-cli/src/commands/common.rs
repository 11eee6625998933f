use std::env;
use std::path::{Path, PathBuf};

use cftrack_core::models::StudentSyncReport;
use cftrack_core::services::DatabaseService;
use cftrack_core::{Student, StudentId, SyncResult};
use chrono::Utc;
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StudentListItem {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub cf_handle: Option<String>,
    pub current_rating: i64,
    pub max_rating: i64,
    pub is_active: bool,
    pub last_sync: Option<i64>,
    pub last_sync_relative: Option<String>,
}

pub async fn open_database(path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(path.to_path_buf()).await?)
}

pub fn normalize_student_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyStudentId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Resolve a full student id or a unique id prefix.
pub async fn resolve_student(query: &str, db: &DatabaseService) -> Result<Student, CliError> {
    let query = normalize_student_identifier(query)?;

    if let Ok(student_id) = query.parse::<StudentId>() {
        if let Some(student) = db.get_student(&student_id).await? {
            return Ok(student);
        }
    }

    let matching_ids = db.list_student_ids_by_prefix(&query, 3).await?;

    match matching_ids.len() {
        0 => Err(CliError::StudentNotFound(query)),
        1 => {
            let resolved_id = matching_ids[0]
                .parse::<StudentId>()
                .map_err(|_| CliError::StudentNotFound(query.clone()))?;
            db.get_student(&resolved_id)
                .await?
                .ok_or(CliError::StudentNotFound(query))
        }
        _ => {
            let options = matching_ids
                .iter()
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousStudentId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_student_lines(students: &[Student]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    students
        .iter()
        .map(|student| {
            let id = short_id(&student.id.to_string());
            let handle = student.handle().unwrap_or("-");
            let last_sync = student.last_sync.map_or_else(
                || "never".to_string(),
                |at| format_relative_time(at, now_ms),
            );
            let name = &student.name;
            let rating = student.current_rating;

            format!("{id:<13}  {name:<24}  {handle:<20}  {rating:>5}  {last_sync}")
        })
        .collect()
}

pub fn student_to_list_item(student: &Student) -> StudentListItem {
    let now_ms = Utc::now().timestamp_millis();
    StudentListItem {
        id: student.id.to_string(),
        name: student.name.clone(),
        email: student.email.clone(),
        phone: student.phone.clone(),
        cf_handle: student.cf_handle.clone(),
        current_rating: student.current_rating,
        max_rating: student.max_rating,
        is_active: student.is_active,
        last_sync: student.last_sync,
        last_sync_relative: student
            .last_sync
            .map(|at| format_relative_time(at, now_ms)),
    }
}

/// One line per stream that ran, e.g. `submissions  ok      Synced 3 new submissions.`
pub fn format_report_lines(report: &StudentSyncReport) -> Vec<String> {
    [("submissions", &report.submissions), ("contests", &report.contests)]
        .into_iter()
        .filter_map(|(stream, result)| result.as_ref().map(|result| format_result_line(stream, result)))
        .collect()
}

pub fn format_result_line(stream: &str, result: &SyncResult) -> String {
    let status = if result.success {
        "ok"
    } else if result.is_data_outdated() {
        "outdated"
    } else {
        "failed"
    };
    let mut line = format!("{stream:<12}  {status:<8}  {}", result.summary());
    if result.history_capped {
        line.push_str(" (history cap reached)");
    }
    line
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("CFTRACK_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("cftrack")
        .join("cftrack.db")
}
