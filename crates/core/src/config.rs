//! Configuration management for Shiftclock clients

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix, e.g. `SHIFTCLOCK_SESSION__IDLE_TIMEOUT_MS`
pub const ENV_PREFIX: &str = "SHIFTCLOCK";

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Token and activity timing
    pub session: SessionConfig,

    /// Authentication endpoint configuration
    pub api: ApiConfig,

    /// Persistent storage configuration
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Token refresh and inactivity thresholds, all in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lead time before expiry at which tokens count as expired and get refreshed
    pub refresh_buffer_ms: u64,

    /// Inactivity after which the session is ended
    pub idle_timeout_ms: u64,

    /// Absolute session length regardless of activity
    pub session_timeout_ms: u64,

    /// How long before the idle timeout the warning is emitted
    pub idle_warning_lead_ms: u64,

    /// How long before the session timeout the warning is emitted
    pub session_warning_lead_ms: u64,

    /// Polling period of the idle check
    pub idle_check_interval_ms: u64,

    /// Polling period of the session-length check
    pub session_check_interval_ms: u64,
}

/// Authentication endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the authentication API
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Where session state is persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the session file; platform data dir when unset
    pub data_dir: Option<PathBuf>,

    /// File name of the key-value store inside `data_dir`
    pub file_name: String,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,

    pub format: LogFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_buffer_ms: 5 * 60 * 1000,
            idle_timeout_ms: 15 * 60 * 1000,
            session_timeout_ms: 30 * 60 * 1000,
            idle_warning_lead_ms: 60 * 1000,
            session_warning_lead_ms: 120 * 1000,
            idle_check_interval_ms: 5 * 1000,
            session_check_interval_ms: 30 * 1000,
        }
    }
}

impl SessionConfig {
    pub const fn refresh_buffer(&self) -> Duration {
        Duration::from_millis(self.refresh_buffer_ms)
    }

    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub const fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub const fn idle_warning_lead(&self) -> Duration {
        Duration::from_millis(self.idle_warning_lead_ms)
    }

    pub const fn session_warning_lead(&self) -> Duration {
        Duration::from_millis(self.session_warning_lead_ms)
    }

    pub const fn idle_check_interval(&self) -> Duration {
        Duration::from_millis(self.idle_check_interval_ms)
    }

    pub const fn session_check_interval(&self) -> Duration {
        Duration::from_millis(self.session_check_interval_ms)
    }

    /// Check that the thresholds describe a usable timeline
    ///
    /// # Errors
    ///
    /// Returns an error if an interval or timeout is zero, or a warning lead is
    /// not shorter than the timeout it precedes
    pub fn validate(&self) -> CoreResult<()> {
        let non_zero = [
            ("idle_timeout_ms", self.idle_timeout_ms),
            ("session_timeout_ms", self.session_timeout_ms),
            ("idle_check_interval_ms", self.idle_check_interval_ms),
            ("session_check_interval_ms", self.session_check_interval_ms),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(CoreError::invalid_config(format!(
                "session.{name} must be greater than zero"
            )));
        }
        if self.idle_warning_lead_ms >= self.idle_timeout_ms {
            return Err(CoreError::invalid_config(
                "session.idle_warning_lead_ms must be shorter than session.idle_timeout_ms",
            ));
        }
        if self.session_warning_lead_ms >= self.session_timeout_ms {
            return Err(CoreError::invalid_config(
                "session.session_warning_lead_ms must be shorter than session.session_timeout_ms",
            ));
        }
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            file_name: "session.json".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Load configuration from an optional file layered under the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the result
    /// fails validation
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Load configuration from file, with environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        Self::load(Some(path.as_ref()))
    }

    /// Load configuration with defaults and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables cannot be parsed
    pub fn from_env() -> CoreResult<Self> {
        Self::load(None)
    }

    /// # Errors
    ///
    /// Returns the first validation failure
    pub fn validate(&self) -> CoreResult<()> {
        self.session.validate()?;
        url::Url::parse(&self.api.base_url).map_err(|e| {
            CoreError::invalid_config(format!("api.base_url '{}': {e}", self.api.base_url))
        })?;
        if self.storage.file_name.is_empty() {
            return Err(CoreError::invalid_config("storage.file_name must not be empty"));
        }
        Ok(())
    }
}
