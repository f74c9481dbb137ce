//! `ustat import`: load raw collections from a JSON file.

use crate::cli::args::{ImportArgs, OutputFormat};
use crate::cli::output::emit;
use crate::cli::runtime::Runtime;
use crate::core::models::Dataset;
use crate::error::{Result, StatError};
use crate::storage::ImportSummary;

/// # Errors
/// Returns an I/O error for an unreadable file, `Decode` for malformed JSON,
/// or the store's write error.
pub async fn execute(
    runtime: &Runtime,
    args: &ImportArgs,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(&args.file)?;
    let path = args.file.display().to_string();
    let dataset: Dataset =
        serde_json::from_str(&raw).map_err(|e| StatError::decode("import", &path, e))?;
    let summary = runtime.store.import(&dataset).await?;
    tracing::info!(file = %path, documents = summary.total(), "import finished");
    emit("import", &summary, format, pretty, human_lines)
}

fn human_lines(summary: &ImportSummary) -> Vec<String> {
    vec![
        format!("Imported {} document(s)", summary.total()),
        format!("  accounts      {}", summary.accounts),
        format!("  usage events  {}", summary.usage_events),
        format!("  quotas        {}", summary.quotas),
        format!("  payments      {}", summary.payments),
        format!("  apps          {}", summary.apps),
        format!("  uploads       {}", summary.uploads),
        format!("  connections   {}", summary.connections),
    ]
}
