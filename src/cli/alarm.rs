//! `ustat alarm`: day-over-day usage drop check.

use chrono::Utc;
use serde::Serialize;

use crate::cli::args::{AlarmArgs, OutputFormat};
use crate::cli::output::emit;
use crate::cli::runtime::Runtime;
use crate::core::alarm::AlarmOutcome;
use crate::core::domain::Domain;
use crate::error::Result;

#[derive(Serialize)]
struct AlarmRow {
    domain: Domain,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    outcome: Option<AlarmOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Check the selected domains and print one row per domain.
///
/// # Errors
/// Returns the first domain's read failure after every domain was checked
/// and printed. A failed notification is not an error.
pub async fn execute(
    runtime: &Runtime,
    args: &AlarmArgs,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let now = args.now.unwrap_or_else(Utc::now);
    let detector = runtime.alarm_detector()?;

    let mut rows = Vec::new();
    let mut first_error = None;
    for domain in args.domain.domains() {
        match detector.check(domain, now).await {
            Ok(outcome) => rows.push(AlarmRow {
                domain,
                outcome: Some(outcome),
                error: None,
            }),
            Err(err) => {
                tracing::error!(%domain, code = err.error_code(), error = %err, "alarm check failed");
                rows.push(AlarmRow {
                    domain,
                    outcome: None,
                    error: Some(err.to_string()),
                });
                first_error.get_or_insert(err);
            }
        }
    }

    emit("alarm", &rows, format, pretty, |rows| {
        rows.iter().map(human_line).collect()
    })?;
    first_error.map_or(Ok(()), Err)
}

fn human_line(row: &AlarmRow) -> String {
    match (&row.outcome, &row.error) {
        (Some(AlarmOutcome::NoDrop { today, yesterday }), _) => {
            format!("{:<8} no drop ({yesterday} -> {today})", row.domain)
        }
        (
            Some(AlarmOutcome::BelowThreshold {
                today,
                yesterday,
                decrease_pct,
            }),
            _,
        ) => format!(
            "{:<8} down {decrease_pct:.2}% ({yesterday} -> {today}), below threshold",
            row.domain
        ),
        (
            Some(AlarmOutcome::Fired {
                message, delivered, ..
            }),
            _,
        ) => {
            let status = if *delivered { "sent" } else { "not delivered" };
            format!("{:<8} ALARM ({status}): {message}", row.domain)
        }
        (None, error) => format!(
            "{:<8} check failed: {}",
            row.domain,
            error.as_deref().unwrap_or("unknown error")
        ),
    }
}
