//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux/macOS: `~/.config/ustat/config.toml`
//! - Windows: `%APPDATA%/ustat/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `USTAT_CONFIG`: Override config file path
//! - `USTAT_DB`: Document store path
//! - `USTAT_BATCH_SIZE`: Accounts per refresh range
//! - `USTAT_WORKERS`: Concurrent range workers
//! - `USTAT_ALARM_WEBHOOK`: Alarm webhook URL
//! - `USTAT_MAILING_WEBHOOK`: Mailing-list webhook URL (also enables the mailing list)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::error::{Result, StatError};
use crate::util::time::parse_instant;

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "USTAT_CONFIG";
/// Environment variable for the document store path.
pub const ENV_DB: &str = "USTAT_DB";
/// Environment variable for the refresh batch size.
pub const ENV_BATCH_SIZE: &str = "USTAT_BATCH_SIZE";
/// Environment variable for the worker bound.
pub const ENV_WORKERS: &str = "USTAT_WORKERS";
/// Environment variable for the alarm webhook URL.
pub const ENV_ALARM_WEBHOOK: &str = "USTAT_ALARM_WEBHOOK";
/// Environment variable for the mailing-list webhook URL.
pub const ENV_MAILING_WEBHOOK: &str = "USTAT_MAILING_WEBHOOK";

/// Default accounts per refresh range.
pub const DEFAULT_BATCH_SIZE: u64 = 2000;
/// Default bound on concurrently running range workers.
pub const DEFAULT_MAX_WORKERS: usize = 8;
/// Default alarm threshold, in percent.
pub const DEFAULT_ALARM_THRESHOLD: f64 = 30.0;
/// First week covered by population cohort snapshots.
pub const DEFAULT_COHORT_START: &str = "2023-03-09";

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Values supplied on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub batch_size: Option<u64>,
    pub max_workers: Option<usize>,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Tracks the source of each overridable value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub db_path: ConfigSource,
    pub batch_size: ConfigSource,
    pub max_workers: ConfigSource,
    pub alarm_webhook: ConfigSource,
    pub mailing_webhook: ConfigSource,
}

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Effective settings; overridden fields already applied.
    pub config: Config,
    /// Document store path.
    pub db_path: PathBuf,
    /// Source of each overridable setting.
    pub sources: ConfigSources,
}

impl ResolvedConfig {
    /// Resolve final configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - An environment override cannot be parsed
    /// - The merged configuration fails validation
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let mut config = Self::load_config(cli)?;
        let mut sources = ConfigSources::default();

        let db_path = Self::resolve_db_path(cli, &config, &mut sources.db_path);

        if let Some(batch) = cli.batch_size {
            config.refresh.batch_size = batch;
            sources.batch_size = ConfigSource::Cli;
        } else if let Some(batch) = env_parsed::<u64>(ENV_BATCH_SIZE)? {
            config.refresh.batch_size = batch;
            sources.batch_size = ConfigSource::Env;
        }

        if let Some(workers) = cli.max_workers {
            config.refresh.max_workers = workers;
            sources.max_workers = ConfigSource::Cli;
        } else if let Some(workers) = env_parsed::<usize>(ENV_WORKERS)? {
            config.refresh.max_workers = workers;
            sources.max_workers = ConfigSource::Env;
        }

        if let Some(url) = env_string(ENV_ALARM_WEBHOOK) {
            config.alarm.webhook_url = Some(url);
            sources.alarm_webhook = ConfigSource::Env;
        } else if config.alarm.webhook_url.is_some() {
            sources.alarm_webhook = ConfigSource::ConfigFile;
        }

        if let Some(url) = env_string(ENV_MAILING_WEBHOOK) {
            config.marketing.webhook_url = Some(url);
            config.marketing.enabled = true;
            sources.mailing_webhook = ConfigSource::Env;
        } else if config.marketing.webhook_url.is_some() {
            sources.mailing_webhook = ConfigSource::ConfigFile;
        }

        config.validate()?;

        Ok(Self {
            config,
            db_path,
            sources,
        })
    }

    fn load_config(cli: &CliOverrides) -> Result<Config> {
        if let Some(path) = &cli.config_path {
            return Config::load_required(path);
        }
        if let Some(path) = env_string(ENV_CONFIG) {
            return Config::load_from(Path::new(&path));
        }
        Config::load()
    }

    fn resolve_db_path(cli: &CliOverrides, config: &Config, source: &mut ConfigSource) -> PathBuf {
        if let Some(path) = &cli.db_path {
            *source = ConfigSource::Cli;
            return path.clone();
        }
        if let Some(path) = env_string(ENV_DB) {
            *source = ConfigSource::Env;
            return PathBuf::from(path);
        }
        if let Some(path) = &config.store.path {
            *source = ConfigSource::ConfigFile;
            return path.clone();
        }
        *source = ConfigSource::Default;
        AppPaths::new().store_file()
    }
}

fn env_string(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(var: &str) -> Result<Option<T>> {
    match env_string(var) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| StatError::ConfigInvalid {
            key: var.to_string(),
            value: raw.clone(),
            message: "expected a positive integer".to_string(),
        }),
    }
}

// =============================================================================
// File Configuration
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub refresh: RefreshConfig,
    pub cohort: CohortConfig,
    pub alarm: AlarmConfig,
    pub marketing: MarketingConfig,
    pub schedule: ScheduleConfig,
    pub cache: CacheConfig,
}

/// Document store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Store file; defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

/// Refresh pass settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefreshConfig {
    /// Accounts per contiguous range.
    pub batch_size: u64,
    /// Ranges processed concurrently.
    pub max_workers: usize,
}

/// Population cohort settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CohortConfig {
    /// Any instant in the first snapshot week (`YYYY-MM-DD` or RFC 3339).
    pub start_at: String,
}

/// Alarm detector settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlarmConfig {
    /// Webhook receiving `{"message": ...}`. Without one, alarms are only logged.
    pub webhook_url: Option<String>,
    /// Drop percentage that must be strictly exceeded to fire.
    pub threshold_percent: f64,
    pub timeout_seconds: u64,
}

/// Mailing-list sync settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarketingConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    /// Tag sent alongside the segment tag.
    pub product_tag: String,
    /// Members per segment.
    pub segment_limit: usize,
    pub timeout_seconds: u64,
}

/// Daemon trigger settings. Hours are UTC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub refresh_hour: u32,
    pub alarm_hour: u32,
    pub cohort_weekday: String,
    pub cohort_hour: u32,
    pub marketing_weekday: String,
    pub marketing_hour: u32,
    /// Seconds between trigger checks.
    pub tick_seconds: u64,
}

/// Read-through cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            start_at: DEFAULT_COHORT_START.to_string(),
        }
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            threshold_percent: DEFAULT_ALARM_THRESHOLD,
            timeout_seconds: 10,
        }
    }
}

impl Default for MarketingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            product_tag: "vanus_ai".to_string(),
            segment_limit: 50,
            timeout_seconds: 10,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            refresh_hour: 1,
            alarm_hour: 2,
            cohort_weekday: "Mon".to_string(),
            cohort_hour: 2,
            marketing_weekday: "Mon".to_string(),
            marketing_hour: 2,
            tick_seconds: 3600,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            max_entries: 100_000,
        }
    }
}

impl CohortConfig {
    /// Parsed `start_at`.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` when the value is not a date or timestamp.
    pub fn start(&self) -> Result<DateTime<Utc>> {
        parse_instant(&self.start_at).map_err(|message| StatError::ConfigInvalid {
            key: "cohort.start_at".to_string(),
            value: self.start_at.clone(),
            message,
        })
    }
}

impl AlarmConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl MarketingConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

fn parse_weekday(key: &str, value: &str) -> Result<Weekday> {
    value.parse::<Weekday>().map_err(|_| StatError::ConfigInvalid {
        key: key.to_string(),
        value: value.to_string(),
        message: "expected a weekday such as Mon or Monday".to_string(),
    })
}

impl ScheduleConfig {
    /// # Errors
    /// Returns `ConfigInvalid` for an unknown weekday name.
    pub fn cohort_weekday(&self) -> Result<Weekday> {
        parse_weekday("schedule.cohort_weekday", &self.cohort_weekday)
    }

    /// # Errors
    /// Returns `ConfigInvalid` for an unknown weekday name.
    pub fn marketing_weekday(&self) -> Result<Weekday> {
        parse_weekday("schedule.marketing_weekday", &self.marketing_weekday)
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path, defaulting when absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::parse_file(path)
    }

    /// Load configuration from a path that must exist.
    pub fn load_required(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StatError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        Self::parse_file(path)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StatError::ConfigParse {
            path: path.display().to_string(),
            line: None,
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| StatError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Validate configuration values.
    ///
    /// Checks that:
    /// - Batch size and worker count are non-zero
    /// - The alarm threshold lies in (0, 100]
    /// - An enabled mailing list has a webhook URL
    /// - Trigger hours are valid and weekdays parse
    /// - The cohort start date parses
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, value: String, message: &str| StatError::ConfigInvalid {
            key: key.to_string(),
            value,
            message: message.to_string(),
        };

        if self.refresh.batch_size == 0 {
            return Err(invalid("refresh.batch_size", "0".into(), "must be greater than 0"));
        }
        if self.refresh.max_workers == 0 {
            return Err(invalid("refresh.max_workers", "0".into(), "must be greater than 0"));
        }

        let threshold = self.alarm.threshold_percent;
        if !(threshold > 0.0 && threshold <= 100.0) {
            return Err(invalid(
                "alarm.threshold_percent",
                threshold.to_string(),
                "must be within (0, 100]",
            ));
        }

        if self.marketing.enabled && self.marketing.webhook_url.is_none() {
            return Err(invalid(
                "marketing.webhook_url",
                String::new(),
                "required when marketing.enabled is true",
            ));
        }

        for (key, hour) in [
            ("schedule.refresh_hour", self.schedule.refresh_hour),
            ("schedule.alarm_hour", self.schedule.alarm_hour),
            ("schedule.cohort_hour", self.schedule.cohort_hour),
            ("schedule.marketing_hour", self.schedule.marketing_hour),
        ] {
            if hour > 23 {
                return Err(invalid(key, hour.to_string(), "must be between 0 and 23"));
            }
        }
        if self.schedule.tick_seconds == 0 {
            return Err(invalid("schedule.tick_seconds", "0".into(), "must be greater than 0"));
        }
        self.schedule.cohort_weekday()?;
        self.schedule.marketing_weekday()?;
        self.cohort.start()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[allow(unsafe_code)]
    fn with_env(vars: &[(&str, &str)], f: impl FnOnce()) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let prior: Vec<_> = vars
            .iter()
            .map(|(k, _)| (k.to_string(), std::env::var(k).ok()))
            .collect();
        for (k, v) in vars {
            unsafe { std::env::set_var(k, v) };
        }
        f();
        for (k, v) in prior {
            match v {
                Some(v) => unsafe { std::env::set_var(&k, v) },
                None => unsafe { std::env::remove_var(&k) },
            }
        }
    }

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.refresh.batch_size, 2000);
        assert!((config.alarm.threshold_percent - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.schedule.cohort_weekday().unwrap(), Weekday::Mon);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let config = Config::load_from(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_required_missing_file_errors() {
        let err = Config::load_required(Path::new("/nonexistent/path/config.toml")).unwrap_err();
        assert!(matches!(err, StatError::ConfigNotFound { .. }));
    }

    #[test]
    fn load_partial_toml_keeps_defaults() {
        let file = write_config(
            r#"
[refresh]
batch_size = 500

[alarm]
webhook_url = "http://localhost:9/alarm"
"#,
        );
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.refresh.batch_size, 500);
        assert_eq!(config.refresh.max_workers, DEFAULT_MAX_WORKERS);
        assert_eq!(
            config.alarm.webhook_url.as_deref(),
            Some("http://localhost:9/alarm")
        );
        assert_eq!(config.marketing.product_tag, "vanus_ai");
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let file = write_config("[refresh\nbatch_size = ");
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, StatError::ConfigParse { .. }), "{err}");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.refresh.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.alarm.threshold_percent = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.marketing.enabled = true;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.schedule.alarm_hour = 24;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.schedule.cohort_weekday = "Someday".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cohort.start_at = "last spring".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/config.toml");
        let mut config = Config::default();
        config.refresh.max_workers = 3;
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn cli_beats_env_beats_file() {
        let file = write_config("[refresh]\nbatch_size = 500\nmax_workers = 2\n");
        with_env(&[(ENV_BATCH_SIZE, "700"), (ENV_WORKERS, "5")], || {
            let cli = CliOverrides {
                config_path: Some(file.path().to_path_buf()),
                db_path: Some(PathBuf::from("/tmp/x.sqlite")),
                batch_size: None,
                max_workers: Some(9),
            };
            let resolved = ResolvedConfig::resolve(&cli).unwrap();
            assert_eq!(resolved.config.refresh.batch_size, 700);
            assert_eq!(resolved.sources.batch_size, ConfigSource::Env);
            assert_eq!(resolved.config.refresh.max_workers, 9);
            assert_eq!(resolved.sources.max_workers, ConfigSource::Cli);
            assert_eq!(resolved.db_path, PathBuf::from("/tmp/x.sqlite"));
            assert_eq!(resolved.sources.db_path, ConfigSource::Cli);
        });
    }

    #[test]
    fn unparsable_env_override_is_rejected() {
        let file = write_config("");
        with_env(&[(ENV_BATCH_SIZE, "lots")], || {
            let cli = CliOverrides {
                config_path: Some(file.path().to_path_buf()),
                ..CliOverrides::default()
            };
            let err = ResolvedConfig::resolve(&cli).unwrap_err();
            assert!(matches!(err, StatError::ConfigInvalid { ref key, .. } if key == ENV_BATCH_SIZE));
        });
    }

    #[test]
    fn mailing_webhook_env_enables_marketing() {
        let file = write_config("");
        with_env(&[(ENV_MAILING_WEBHOOK, "http://localhost:9/mail")], || {
            let cli = CliOverrides {
                config_path: Some(file.path().to_path_buf()),
                ..CliOverrides::default()
            };
            let resolved = ResolvedConfig::resolve(&cli).unwrap();
            assert!(resolved.config.marketing.enabled);
            assert_eq!(resolved.sources.mailing_webhook, ConfigSource::Env);
        });
    }
}
