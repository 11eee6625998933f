use std::path::Path;

use cftrack_core::services::SyncStatus;
use cftrack_core::{ContestParticipation, Submission};
use serde::Serialize;

use crate::commands::common::{format_timestamp, open_database, resolve_student};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub name: String,
    #[serde(flatten)]
    pub status: SyncStatus,
    pub recent_submissions: Vec<Submission>,
    pub latest_contest: Option<ContestParticipation>,
}

pub async fn run_status(
    student: &str,
    recent: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let student = resolve_student(student, &db).await?;
    let status = db
        .sync_status(&student.id)
        .await?
        .ok_or_else(|| CliError::StudentNotFound(student.id.to_string()))?;

    let view = StatusView {
        name: student.name,
        recent_submissions: db.list_recent_submissions(&student.id, recent).await?,
        latest_contest: db.list_contests(&student.id).await?.pop(),
        status,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    for line in format_status_lines(&view) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_status_lines(view: &StatusView) -> Vec<String> {
    let status = &view.status;
    let mut lines = vec![
        format!(
            "{} ({})",
            view.name,
            status.handle.as_deref().unwrap_or("no handle")
        ),
        format!(
            "Last sync:        {}",
            status
                .last_sync
                .map_or_else(|| "never".to_string(), format_timestamp)
        ),
        format!(
            "Submissions:      {} stored, watermark {}",
            status.submission_count, status.last_submission_id
        ),
        format!(
            "Contests:         {} stored, latest {}",
            status.contest_count,
            if status.last_contest_time > 0 {
                format_timestamp(status.last_contest_time)
            } else {
                "none".to_string()
            }
        ),
    ];

    if let Some(contest) = &view.latest_contest {
        lines.push(format!(
            "Latest contest:   {} rank {} ({:+})",
            contest
                .contest_name
                .clone()
                .unwrap_or_else(|| contest.contest_id.to_string()),
            contest.rank,
            contest.rating_change()
        ));
    }

    for submission in &view.recent_submissions {
        lines.push(format!(
            "  {:>12}  {:<8}  {:<24}  {}",
            submission.cf_submission_id,
            submission.problem_id,
            submission.verdict.as_str(),
            format_timestamp(submission.submitted_at)
        ));
    }
    lines
}
