use std::path::PathBuf;

use cftrack_core::sync::SyncScope;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "cftrack")]
#[command(about = "Keep a student roster in sync with Codeforces")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the sync settings file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the student roster
    Student {
        #[command(subcommand)]
        command: StudentCommands,
    },
    /// Sync one student's submissions and contest history
    Sync {
        /// Student ID or unique ID prefix
        student: String,
        /// Only sync one record stream
        #[arg(long, value_enum)]
        only: Option<SyncStream>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync every student with a Codeforces handle
    SyncAll {
        /// Students synced at the same time
        #[arg(short, long, default_value = "4")]
        concurrency: usize,
        /// Only sync one record stream
        #[arg(long, value_enum)]
        only: Option<SyncStream>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show watermarks and stored records for a student
    Status {
        /// Student ID or unique ID prefix
        student: String,
        /// Number of recent submissions to show
        #[arg(short, long, default_value = "5")]
        recent: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or create the sync settings file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum StudentCommands {
    /// Add a student to the roster
    #[command(alias = "new")]
    Add {
        /// Full name
        name: String,
        /// Contact email (unique)
        #[arg(long)]
        email: String,
        /// Codeforces handle
        #[arg(long)]
        handle: Option<String>,
        /// Phone number, 10-15 digits
        #[arg(long)]
        phone: Option<String>,
    },
    /// List students
    List {
        /// Number of students to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one student
    Show {
        /// Student ID or unique ID prefix
        student: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a student and their synced records
    #[command(alias = "rm")]
    Remove {
        /// Student ID or unique ID prefix
        student: String,
    },
    /// Set or clear a student's Codeforces handle
    SetHandle {
        /// Student ID or unique ID prefix
        student: String,
        /// New handle; omit to clear
        handle: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective settings and where they came from
    Show,
    /// Write a settings file with the defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SyncStream {
    Submissions,
    Contests,
}

impl SyncStream {
    pub const fn scope(stream: Option<Self>) -> SyncScope {
        match stream {
            None => SyncScope::All,
            Some(Self::Submissions) => SyncScope::Submissions,
            Some(Self::Contests) => SyncScope::Contests,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
