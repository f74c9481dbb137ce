//! Structured logging setup.
//!
//! Pass progress, range completion, alarm decisions and webhook failures are
//! all emitted as `tracing` events with fields; this module only decides where
//! they go and how they are rendered.
//!
//! Settings resolve as: command-line flag, then `USTAT_LOG` /
//! `USTAT_LOG_FORMAT` / `USTAT_LOG_FILE`, then defaults. `RUST_LOG`, when set,
//! replaces the level filter entirely.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const LOG_LEVEL_ENV: &str = "USTAT_LOG";
const LOG_FORMAT_ENV: &str = "USTAT_LOG_FORMAT";
const LOG_FILE_ENV: &str = "USTAT_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line, for log shippers watching the daemon.
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "pretty" => Ok(Self::Human),
            "json" | "jsonl" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Minimum level for `ustat` events.
///
/// Batch jobs default to `Info` so that pass start/end and per-range counts
/// are always recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Resolved logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Combine command-line flags with the environment.
    ///
    /// `verbose` lowers `Info` and above to `Debug`; an explicit `Trace` stays.
    /// Unparsable values fall through to the next source.
    #[must_use]
    pub fn resolve(cli_level: Option<&str>, json_output: bool, verbose: bool) -> Self {
        let level: LogLevel = cli_level
            .and_then(|value| value.parse().ok())
            .or_else(|| non_empty_env(LOG_LEVEL_ENV).and_then(|value| value.parse().ok()))
            .unwrap_or_default();
        let format = if json_output {
            LogFormat::Json
        } else {
            non_empty_env(LOG_FORMAT_ENV)
                .and_then(|value| value.parse().ok())
                .unwrap_or_default()
        };
        Self {
            level: if verbose { level.min(LogLevel::Debug) } else { level },
            format,
            file: non_empty_env(LOG_FILE_ENV).map(PathBuf::from),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("ustat={}", self.level.as_filter())))
    }

    fn writer(&self) -> BoxMakeWriter {
        let file = self.file.as_ref().and_then(|path| {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => Some(file),
                Err(err) => {
                    eprintln!("ustat: cannot open log file {}: {err}; logging to stderr", path.display());
                    None
                }
            }
        });
        file.map_or_else(
            || BoxMakeWriter::new(std::io::stderr),
            |file: File| BoxMakeWriter::new(file),
        )
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(settings: &LogSettings) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter())
        .with_writer(settings.writer())
        .with_ansi(settings.file.is_none());

    let installed = match settings.format {
        LogFormat::Json => builder.json().with_span_events(FmtSpan::CLOSE).try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Human => builder.with_target(false).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("log subscriber already installed");
    }
}
