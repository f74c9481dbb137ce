//! `ustat marketing`: weekly segment sync.

use chrono::Utc;

use crate::cli::args::{MarketingArgs, OutputFormat};
use crate::cli::output::emit;
use crate::cli::runtime::Runtime;
use crate::core::marketing::MarketingReport;
use crate::error::Result;

/// Select, track and post the requested segments.
///
/// # Errors
/// Propagates store failures. Mailing-list failures are only counted.
pub async fn execute(
    runtime: &Runtime,
    args: &MarketingArgs,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let now = args.now.unwrap_or_else(Utc::now);
    let report = runtime
        .marketing_sync()?
        .run(&args.effective_segments(), now, args.dry_run)
        .await?;
    emit("marketing", &report, format, pretty, human_lines)
}

fn human_lines(report: &MarketingReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.segments.len() + 1);
    if report.dry_run {
        lines.push("Dry run: nothing tracked or posted".to_string());
    }
    for segment in &report.segments {
        lines.push(format!(
            "{:<20} selected {:>4}  tracked {:>4}  posted {:>4}  invalid {:>3}  failed {:>3}",
            segment.segment,
            segment.selected,
            segment.tracked,
            segment.posted,
            segment.invalid_emails,
            segment.post_failures,
        ));
    }
    lines
}
