//! CLI argument definitions using clap.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::core::domain::Domain;
use crate::core::marketing::Segment;
use crate::storage::CliOverrides;
use crate::util::time::parse_instant;

/// Account usage statistics engine.
#[derive(Parser, Debug)]
#[command(name = "ustat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Config file (default: platform config dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Document store file
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }

    /// Settings given on the command line, for config resolution.
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        let (batch_size, max_workers) = match &self.command {
            Commands::Refresh(args) => (args.batch_size, args.workers),
            Commands::Cohort(args) => (None, args.workers),
            _ => (None, None),
        };
        CliOverrides {
            config_path: self.config.clone(),
            db_path: self.db.clone(),
            batch_size,
            max_workers,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild every account's stat
    Refresh(RefreshArgs),

    /// Snapshot weekly population cohorts
    Cohort(CohortArgs),

    /// Check for usage drops and notify
    Alarm(AlarmArgs),

    /// Sync marketing segments to the mailing list
    Marketing(MarketingArgs),

    /// Print one account's stored stat
    Stat(StatArgs),

    /// Load raw collections from a JSON file
    Import(ImportArgs),

    /// Run scheduled jobs until interrupted
    Daemon,
}

/// Parse `--now` / `--week` values.
///
/// # Errors
/// Returns a message when the value is neither RFC 3339 nor `YYYY-MM-DD`.
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    parse_instant(value)
}

/// Arguments for the `refresh` command.
#[derive(Args, Debug, Default)]
pub struct RefreshArgs {
    /// Evaluate as of this instant instead of the current time
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub now: Option<DateTime<Utc>>,

    /// Accounts per range
    #[arg(long, value_name = "N")]
    pub batch_size: Option<u64>,

    /// Concurrent range workers
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
}

/// Arguments for the `cohort` command.
#[derive(Args, Debug, Default)]
pub struct CohortArgs {
    /// Only snapshot the creation week containing this date
    #[arg(long, value_name = "DATE", value_parser = parse_time)]
    pub week: Option<DateTime<Utc>>,

    /// Evaluate as of this instant instead of the current time
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub now: Option<DateTime<Utc>>,

    /// Concurrent week workers
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
}

/// Domain selector for `alarm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DomainArg {
    Ai,
    Connect,
    #[default]
    All,
}

impl DomainArg {
    #[must_use]
    pub fn domains(self) -> Vec<Domain> {
        match self {
            Self::Ai => vec![Domain::Ai],
            Self::Connect => vec![Domain::Connect],
            Self::All => Domain::ALL.to_vec(),
        }
    }
}

/// Arguments for the `alarm` command.
#[derive(Args, Debug, Default)]
pub struct AlarmArgs {
    /// Domain to check
    #[arg(long, value_enum, default_value = "all")]
    pub domain: DomainArg,

    /// Evaluate as of this instant instead of the current time
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub now: Option<DateTime<Utc>>,
}

/// Arguments for the `marketing` command.
#[derive(Args, Debug, Default)]
pub struct MarketingArgs {
    /// Segment to sync (repeatable; default: all)
    #[arg(long = "segment", value_name = "SEGMENT")]
    pub segments: Vec<Segment>,

    /// Select members without tracking or posting
    #[arg(long)]
    pub dry_run: bool,

    /// Evaluate as of this instant instead of the current time
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub now: Option<DateTime<Utc>>,
}

impl MarketingArgs {
    #[must_use]
    pub fn effective_segments(&self) -> Vec<Segment> {
        if self.segments.is_empty() {
            Segment::ALL.to_vec()
        } else {
            self.segments.clone()
        }
    }
}

/// Arguments for the `stat` command.
#[derive(Args, Debug)]
pub struct StatArgs {
    /// Account id
    pub account: String,
}

/// Arguments for the `import` command.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON file with `accounts`, `usage_events`, `quotas`, `payments`, `apps`, `uploads`, `connections`
    pub file: PathBuf,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
}
