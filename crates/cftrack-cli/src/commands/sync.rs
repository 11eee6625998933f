use std::path::Path;

use cftrack_core::config::SyncSettings;
use cftrack_core::services::DatabaseService;
use cftrack_core::source::CodeforcesClient;
use cftrack_core::sync::{SyncEngine, SyncScope};

use crate::commands::common::{format_report_lines, open_database, resolve_student, short_id};
use crate::error::CliError;

fn build_engine(
    db: DatabaseService,
    settings: SyncSettings,
) -> Result<SyncEngine<CodeforcesClient>, CliError> {
    let client = CodeforcesClient::new(&settings)?;
    Ok(SyncEngine::new(client, db, settings))
}

pub async fn run_sync(
    student: &str,
    scope: SyncScope,
    as_json: bool,
    settings: SyncSettings,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let student = resolve_student(student, &db).await?;
    let engine = build_engine(db, settings)?;

    let report = engine.sync_student(&student.id, scope).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} ({})", student.name, student.handle().unwrap_or("-"));
        for line in format_report_lines(&report) {
            println!("  {line}");
        }
    }

    if report.success() {
        Ok(())
    } else {
        Err(CliError::SyncFailed(format!(
            "Sync failed for {}",
            student.name
        )))
    }
}

pub async fn run_sync_all(
    concurrency: usize,
    scope: SyncScope,
    as_json: bool,
    settings: SyncSettings,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let engine = build_engine(db, settings)?;

    let mut reports = engine.sync_all(scope, concurrency).await?;
    reports.sort_by_key(|report| report.student_id.as_str());

    if as_json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else if reports.is_empty() {
        println!("No students with a Codeforces handle.");
    } else {
        for report in &reports {
            println!("{}", short_id(&report.student_id.to_string()));
            for line in format_report_lines(report) {
                println!("  {line}");
            }
        }
    }

    let failed = reports
        .iter()
        .filter(|report| !report.success())
        .count();
    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::SyncFailed(format!(
            "{failed} of {} student syncs failed",
            reports.len()
        )))
    }
}
