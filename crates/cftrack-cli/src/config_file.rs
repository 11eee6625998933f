//! Persistent sync settings file.

use std::path::{Path, PathBuf};

use cftrack_core::config::SyncSettings;

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cftrack").join(CONFIG_FILE_NAME))
}

/// Explicit `--config` path, otherwise the per-user default.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    explicit
        .or_else(default_config_path)
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

/// Read settings from `path`; a missing file yields the defaults.
pub fn load_from_path(path: &Path) -> Result<SyncSettings, String> {
    if !path.exists() {
        return Ok(SyncSettings::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
    serde_json::from_str::<SyncSettings>(&raw)
        .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))
}

pub fn save_to_path(settings: &SyncSettings, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|error| {
            format!(
                "Failed to create config directory {}: {}",
                parent.display(),
                error
            )
        })?;
    }

    let serialized = serde_json::to_string_pretty(settings)
        .map_err(|error| format!("Failed to serialize config: {error}"))?;
    std::fs::write(path, serialized)
        .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
}

/// File settings, then `CFTRACK_*` environment overrides, then validation.
pub fn load_effective(path: &Path) -> Result<SyncSettings, CliError> {
    let settings = load_from_path(path)
        .map_err(CliError::Config)?
        .with_env_overrides()?;
    settings.validate()?;
    Ok(settings)
}
