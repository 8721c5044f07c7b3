//! CLI configuration utilities

use anyhow::{Context, Result};
use shiftclock_core::Settings;
use shiftclock_session::FileStore;
use std::path::{Path, PathBuf};

/// Command-line values that take precedence over file and environment
#[derive(Debug, Default)]
pub struct Overrides {
    pub log_level: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub api_url: Option<String>,
}

/// Load settings from `path` and the environment, then apply CLI overrides
pub fn load_settings(path: Option<&Path>, overrides: Overrides) -> Result<Settings> {
    let mut settings = Settings::load(path).with_context(|| match path {
        Some(path) => format!("failed to load configuration from {}", path.display()),
        None => "failed to load configuration".to_string(),
    })?;

    if let Some(level) = overrides.log_level {
        settings.logging.level = level;
    }
    if let Some(dir) = overrides.data_dir {
        settings.storage.data_dir = Some(dir);
    }
    if let Some(url) = overrides.api_url {
        settings.api.base_url = url;
    }
    settings.validate().context("invalid configuration")?;
    Ok(settings)
}

/// The session file described by `settings`
pub fn session_store(settings: &Settings) -> Result<FileStore> {
    FileStore::in_data_dir(
        settings.storage.data_dir.as_deref(),
        &settings.storage.file_name,
    )
    .context("no data directory available; pass --data-dir")
}
