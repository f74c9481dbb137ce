//! ustat - account usage statistics engine
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use ustat::cli::{self, Cli, Commands, Runtime};
use ustat::core::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(&logging::LogSettings::resolve(
        cli.log_level.as_deref(),
        cli.json_output,
        cli.verbose,
    ));

    let format = cli.effective_format();
    let pretty = cli.pretty;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{}", e);
            eprintln!("{}", cli::output::render_error(&e, format, pretty));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> ustat::Result<()> {
    let format = cli.effective_format();
    let pretty = cli.pretty;
    let runtime = Runtime::open(&cli.overrides())?;

    match &cli.command {
        Commands::Refresh(args) => cli::refresh::execute(&runtime, args, format, pretty).await,
        Commands::Cohort(args) => cli::cohort::execute(&runtime, args, format, pretty).await,
        Commands::Alarm(args) => cli::alarm::execute(&runtime, args, format, pretty).await,
        Commands::Marketing(args) => cli::marketing::execute(&runtime, args, format, pretty).await,
        Commands::Stat(args) => cli::stat::execute(&runtime, args, format, pretty).await,
        Commands::Import(args) => cli::import::execute(&runtime, args, format, pretty).await,
        Commands::Daemon => cli::daemon::execute(&runtime).await,
    }
}
