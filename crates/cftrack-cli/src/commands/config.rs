use std::path::Path;

use cftrack_core::config::SyncSettings;

use crate::cli::ConfigCommands;
use crate::config_file::{load_effective, save_to_path};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, config_path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_config_show(config_path),
        ConfigCommands::Init { force } => run_config_init(config_path, force),
    }
}

pub fn run_config_show(config_path: &Path) -> Result<(), CliError> {
    let settings = load_effective(config_path)?;
    let source = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("defaults ({} not found)", config_path.display())
    };

    println!("# {source}");
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

pub fn run_config_init(config_path: &Path, force: bool) -> Result<(), CliError> {
    if config_path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists; pass --force to overwrite",
            config_path.display()
        )));
    }

    save_to_path(&SyncSettings::default(), config_path).map_err(CliError::Config)?;
    println!("Wrote default settings to {}", config_path.display());
    Ok(())
}
