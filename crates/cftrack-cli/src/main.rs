//! cftrack CLI - keep a student roster in sync with Codeforces
//!
//! Roster management, one-off and bulk syncs, and a status readout over the
//! local database.

mod cli;
mod commands;
mod config_file;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands, SyncStream};
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::status::run_status;
use crate::commands::student::run_student;
use crate::commands::sync::{run_sync, run_sync_all};
use crate::config_file::{load_effective, resolve_config_path};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cftrack=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Student { command } => run_student(command, &db_path).await?,
        Commands::Sync {
            student,
            only,
            json,
        } => {
            let settings = load_effective(&resolve_config_path(cli.config)?)?;
            run_sync(&student, SyncStream::scope(only), json, settings, &db_path).await?;
        }
        Commands::SyncAll {
            concurrency,
            only,
            json,
        } => {
            let settings = load_effective(&resolve_config_path(cli.config)?)?;
            run_sync_all(concurrency, SyncStream::scope(only), json, settings, &db_path).await?;
        }
        Commands::Status {
            student,
            recent,
            json,
        } => run_status(&student, recent, json, &db_path).await?,
        Commands::Config { command } => run_config(command, &resolve_config_path(cli.config)?)?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
