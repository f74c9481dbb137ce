//! Storage for configuration and the document store.

pub mod config;
pub mod paths;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use config::{
    CliOverrides, Config, ConfigSource, ConfigSources, ENV_ALARM_WEBHOOK, ENV_BATCH_SIZE,
    ENV_CONFIG, ENV_DB, ENV_MAILING_WEBHOOK, ENV_WORKERS, ResolvedConfig,
};
pub use paths::AppPaths;
pub use schema::{SCHEMA_VERSION, run_migrations};
pub use sqlite::SqliteStore;
pub use store::{DocumentStore, ImportSummary, Lookup, collections};
