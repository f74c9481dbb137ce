//! CLI argument parsing and command dispatch.

pub mod alarm;
pub mod args;
pub mod cohort;
pub mod daemon;
pub mod import;
pub mod marketing;
pub mod output;
pub mod refresh;
pub mod runtime;
pub mod stat;

pub use args::{Cli, Commands, OutputFormat};
pub use runtime::Runtime;
