//! Configuration module for Daybook.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::BackupPeriod;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Daybook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub drive: DriveConfig,
    pub backup: BackupConfig,
    pub jobs: JobsConfig,
    pub lock: LockConfig,
    pub logging: LoggingConfig,
}

/// Local storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding notes and preferences.
    pub database_path: PathBuf,
    /// Directory holding media and voice files referenced by notes.
    pub media_dir: PathBuf,
}

/// Where stored OAuth tokens live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStoreKind {
    /// OS keyring (Secret Service on Linux).
    #[default]
    Keyring,
    /// The `preferences` table of the local database.
    Database,
}

/// Remote object store and token endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// OAuth client ID. `None` disables backup until configured.
    pub client_id: Option<String>,
    /// OAuth token endpoint used for refresh.
    pub token_url: String,
    /// Base URL of the Drive-style REST API.
    pub api_base_url: String,
    /// Token storage backend.
    pub token_store: TokenStoreKind,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Defaults applied before the user touches backup preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Initial value of the auto-backup preference.
    pub auto_backup_default: bool,
    /// Initial auto-backup period in days: 1, 3, 7, 14 or 30.
    pub default_period_days: u32,
}

/// Periodic job scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Hours between cleanup runs.
    pub cleanup_interval_hours: u64,
    /// Hours between pending-media retries.
    pub pending_media_interval_hours: u64,
    /// First retry delay after a failed run, in seconds.
    pub retry_base_delay_secs: u64,
    /// Upper bound for the retry delay, in seconds.
    pub retry_max_delay_secs: u64,
    /// Retries per scheduled run before waiting for the next period.
    pub max_retries: u32,
    /// Seconds between device-condition checks while a job waits to run.
    pub constraint_poll_secs: u64,
    /// Queued media copies are dropped after this many failed attempts.
    pub pending_media_max_attempts: u32,
}

/// App lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Seconds in the background before authorization is revoked.
    pub relock_delay_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/daybook/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("daybook")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("daybook")
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            database_path: data_dir.join("daybook.db"),
            media_dir: data_dir.join("media"),
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            api_base_url: "https://www.googleapis.com".to_string(),
            token_store: TokenStoreKind::default(),
            request_timeout_secs: 60,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            auto_backup_default: true,
            default_period_days: BackupPeriod::default().days(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_hours: 48,
            pending_media_interval_hours: 24,
            retry_base_delay_secs: 30,
            retry_max_delay_secs: 3600,
            max_retries: 5,
            constraint_poll_secs: 60,
            pending_media_max_attempts: 10,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            relock_delay_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"jobs.max_retries"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

/// Longest accepted job interval (one year)
const MAX_INTERVAL_HOURS: u64 = 24 * 365;

fn interval_hours(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    positive(errors, field, value);
    if value > MAX_INTERVAL_HOURS {
        errors.push(ValidationError {
            field: field.into(),
            message: format!("must not exceed {MAX_INTERVAL_HOURS}"),
        });
    }
}

fn http_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if !(value.starts_with("https://") || value.starts_with("http://")) {
        errors.push(ValidationError {
            field: field.into(),
            message: format!("must be an http(s) URL: {value}"),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- storage ---
        if self.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.database_path".into(),
                message: "must not be empty".into(),
            });
        }
        if self.storage.media_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.media_dir".into(),
                message: "must not be empty".into(),
            });
        }

        // --- drive ---
        if matches!(&self.drive.client_id, Some(id) if id.trim().is_empty()) {
            errors.push(ValidationError {
                field: "drive.client_id".into(),
                message: "must not be blank when set".into(),
            });
        }
        http_url(&mut errors, "drive.token_url", &self.drive.token_url);
        http_url(&mut errors, "drive.api_base_url", &self.drive.api_base_url);
        positive(
            &mut errors,
            "drive.request_timeout_secs",
            self.drive.request_timeout_secs,
        );

        // --- backup ---
        if BackupPeriod::from_days(self.backup.default_period_days).is_err() {
            errors.push(ValidationError {
                field: "backup.default_period_days".into(),
                message: format!(
                    "unsupported period {}; valid options: 1, 3, 7, 14, 30",
                    self.backup.default_period_days
                ),
            });
        }

        // --- jobs ---
        interval_hours(
            &mut errors,
            "jobs.cleanup_interval_hours",
            self.jobs.cleanup_interval_hours,
        );
        interval_hours(
            &mut errors,
            "jobs.pending_media_interval_hours",
            self.jobs.pending_media_interval_hours,
        );
        positive(
            &mut errors,
            "jobs.retry_base_delay_secs",
            self.jobs.retry_base_delay_secs,
        );
        positive(
            &mut errors,
            "jobs.constraint_poll_secs",
            self.jobs.constraint_poll_secs,
        );
        positive(
            &mut errors,
            "jobs.pending_media_max_attempts",
            u64::from(self.jobs.pending_media_max_attempts),
        );
        if self.jobs.retry_max_delay_secs < self.jobs.retry_base_delay_secs {
            errors.push(ValidationError {
                field: "jobs.retry_max_delay_secs".into(),
                message: format!(
                    "retry_max_delay_secs ({}) must not be less than retry_base_delay_secs ({})",
                    self.jobs.retry_max_delay_secs, self.jobs.retry_base_delay_secs
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }

    /// Auto-backup period configured as the initial default.
    ///
    /// Falls back to [`BackupPeriod::default`] when the value is unsupported;
    /// [`Config::validate`] reports that case.
    pub fn default_backup_period(&self) -> BackupPeriod {
        BackupPeriod::from_days(self.backup.default_period_days).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use daybook_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .media_dir(PathBuf::from("/tmp/daybook-media"))
///     .relock_delay_secs(10)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- storage ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.storage.database_path = path;
        self
    }

    pub fn media_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.media_dir = dir;
        self
    }

    // --- drive ---

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.drive.client_id = Some(client_id.into());
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.config.drive.token_url = url.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.drive.api_base_url = url.into();
        self
    }

    pub fn token_store(mut self, kind: TokenStoreKind) -> Self {
        self.config.drive.token_store = kind;
        self
    }

    // --- backup ---

    pub fn auto_backup_default(mut self, enabled: bool) -> Self {
        self.config.backup.auto_backup_default = enabled;
        self
    }

    pub fn default_period_days(mut self, days: u32) -> Self {
        self.config.backup.default_period_days = days;
        self
    }

    // --- jobs ---

    pub fn cleanup_interval_hours(mut self, hours: u64) -> Self {
        self.config.jobs.cleanup_interval_hours = hours;
        self
    }

    pub fn retry_delays(mut self, base_secs: u64, max_secs: u64) -> Self {
        self.config.jobs.retry_base_delay_secs = base_secs;
        self.config.jobs.retry_max_delay_secs = max_secs;
        self
    }

    // --- lock ---

    pub fn relock_delay_secs(mut self, secs: u64) -> Self {
        self.config.lock.relock_delay_secs = secs;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
