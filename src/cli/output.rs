//! Command output: a versioned JSON envelope or plain text lines.

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::{Result, StatError};

/// Schema tag carried by every JSON document the CLI prints.
pub const SCHEMA_VERSION: &str = "ustat.v1";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    data: &'a T,
}

/// Serialize `data` inside the command envelope.
///
/// # Errors
/// Returns an error if `data` cannot be serialized.
pub fn render_json<T: Serialize>(command: &str, data: &T, pretty: bool) -> Result<String> {
    let envelope = Envelope {
        schema_version: SCHEMA_VERSION,
        command,
        data,
    };
    let rendered = if pretty {
        serde_json::to_string_pretty(&envelope)?
    } else {
        serde_json::to_string(&envelope)?
    };
    Ok(rendered)
}

/// Print a command result: the JSON envelope, or the human lines.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn emit<T: Serialize>(
    command: &str,
    data: &T,
    format: OutputFormat,
    pretty: bool,
    human: impl FnOnce(&T) -> Vec<String>,
) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", render_json(command, data, pretty)?),
        OutputFormat::Human => {
            for line in human(data) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ErrorJson {
    error_code: &'static str,
    category: String,
    message: String,
    is_retryable: bool,
    exit_code: i32,
}

/// Render an error for stderr.
#[must_use]
pub fn render_error(error: &StatError, format: OutputFormat, pretty: bool) -> String {
    match format {
        OutputFormat::Json => {
            let json = ErrorJson {
                error_code: error.error_code(),
                category: error.category().to_string(),
                message: error.to_string(),
                is_retryable: error.is_retryable(),
                exit_code: error.exit_code().into(),
            };
            let rendered = if pretty {
                serde_json::to_string_pretty(&json)
            } else {
                serde_json::to_string(&json)
            };
            rendered.unwrap_or_else(|_| render_simple(error))
        }
        OutputFormat::Human => render_simple(error),
    }
}

fn render_simple(error: &StatError) -> String {
    let mut line = format!("Error [{}]: {}", error.error_code(), error);
    if error.is_retryable() {
        line.push_str("\nThe next scheduled run will retry.");
    }
    line
}
