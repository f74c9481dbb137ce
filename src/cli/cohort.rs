//! `ustat cohort`: population cohort snapshots.

use chrono::Utc;
use serde::Serialize;

use crate::cli::args::{CohortArgs, OutputFormat};
use crate::cli::output::emit;
use crate::cli::runtime::Runtime;
use crate::core::cohort::CohortReport;
use crate::core::models::WeeklyCohortSnapshot;
use crate::error::{Result, StatError};

#[derive(Serialize)]
#[serde(untagged)]
enum CohortOutput {
    Week(WeeklyCohortSnapshot),
    Run(CohortReport),
}

/// Snapshot one week (`--week`) or every week through `--now`.
///
/// # Errors
/// A single-week run propagates its failure. A full run prints its report
/// and returns `PartialFailure` when any week failed.
pub async fn execute(
    runtime: &Runtime,
    args: &CohortArgs,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let snapshotter = runtime.snapshotter()?;
    if let Some(week) = args.week {
        let snapshot = snapshotter.run_week(week).await?;
        return emit(
            "cohort",
            &CohortOutput::Week(snapshot),
            format,
            pretty,
            human_lines,
        );
    }

    let now = args.now.unwrap_or_else(Utc::now);
    let report = snapshotter.run(now).await;
    let failed = report.failures.len();
    emit("cohort", &CohortOutput::Run(report), format, pretty, human_lines)?;
    if failed > 0 {
        return Err(StatError::PartialFailure { failed });
    }
    Ok(())
}

fn human_lines(output: &CohortOutput) -> Vec<String> {
    match output {
        CohortOutput::Week(snapshot) => {
            let mut lines = vec![format!(
                "Week of {}: {} account(s)",
                snapshot.week.alias, snapshot.total_users
            )];
            // Aliases are calendar dates; print in week order, not name order.
            let mut rows: Vec<_> = snapshot.ai_retention.iter().collect();
            rows.sort_by_key(|(_, r)| r.week.start);
            for (alias, ai) in rows {
                let connect = snapshot
                    .connect_retention
                    .get(alias)
                    .map_or("-", |r| r.ratio.as_str());
                lines.push(format!("  {alias:<20} ai {:>8}  connect {connect:>8}", ai.ratio));
            }
            lines
        }
        CohortOutput::Run(report) => {
            let mut lines = vec![format!(
                "Wrote {} of {} weekly snapshot(s)",
                report.written, report.weeks
            )];
            for failure in &report.failures {
                lines.push(format!("  {} [{}]: {}", failure.week, failure.code, failure.error));
            }
            lines
        }
    }
}
