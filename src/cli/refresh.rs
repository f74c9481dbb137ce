//! `ustat refresh`: one full refresh pass.

use chrono::Utc;

use crate::cli::args::{OutputFormat, RefreshArgs};
use crate::cli::output::emit;
use crate::cli::runtime::Runtime;
use crate::core::refresh::PassReport;
use crate::error::Result;

/// Run a pass and print its report.
///
/// # Errors
/// Returns the store error if the population cannot be counted, and
/// `PartialFailure` (after printing the report) if any account or range failed.
pub async fn execute(
    runtime: &Runtime,
    args: &RefreshArgs,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let now = args.now.unwrap_or_else(Utc::now);
    let report = runtime.refresh_engine().run_pass(now).await?;
    emit("refresh", &report, format, pretty, human_lines)?;
    report.into_result().map(|_| ())
}

fn human_lines(report: &PassReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Refreshed {} of {} accounts in {} range(s) as of {}",
        report.refreshed(),
        report.population,
        report.ranges.len(),
        report.now.format("%Y-%m-%d %H:%M UTC"),
    )];
    for range in report.ranges.iter().filter(|r| !r.is_clean()) {
        if let Some(err) = &range.error {
            lines.push(format!("  range {}: {err}", range.range));
        }
        for failure in &range.failures {
            lines.push(format!(
                "  {} [{}]: {}",
                failure.account_id, failure.code, failure.error
            ));
        }
    }
    for err in &report.worker_errors {
        lines.push(format!("  worker: {err}"));
    }
    lines
}
