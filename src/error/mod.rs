//! Error types for ustat.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into five main categories:
//! - **Storage**: Document store queries, writes, and schema migrations
//! - **Data**: Documents that do not match the expected shape, bad inputs
//! - **Notification**: Outbound webhook delivery (alarm, mailing list)
//! - **Configuration**: Config file parsing, validation, or missing values
//! - **Internal**: Unexpected errors, worker panics, or unclassified issues
//!
//! A document that is simply absent is *not* an error. Point lookups return
//! [`crate::storage::Lookup`] and the aggregator resolves `NotFound` into
//! defaults, so only genuine failures ever reach this type.
//!
//! Each error has a stable error code (e.g., `USTAT-S001`) for programmatic handling.

use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Document store failures (connectivity, malformed query, rejected write).
    Storage,
    /// Shape or input failures (undecodable document, unknown domain, bad email).
    Data,
    /// Outbound webhook failures.
    Notification,
    /// Configuration issues (parse errors, invalid values, missing files).
    Configuration,
    /// Internal errors (bugs, panicked workers, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Storage => "Storage error",
            Self::Data => "Data error",
            Self::Notification => "Notification error",
            Self::Configuration => "Configuration error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Storage => "S",
            Self::Data => "D",
            Self::Notification => "N",
            Self::Configuration => "C",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the `ustat` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// The pass completed but some accounts or ranges failed
    PartialFailure = 2,
    /// Config or input could not be parsed/validated
    ParseError = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Main error type for ustat operations.
///
/// Each variant has:
/// - A stable error code (e.g., `USTAT-S001`)
/// - A category for classification
/// - A retryable flag for retry logic
#[derive(Error, Debug)]
pub enum StatError {
    // ==========================================================================
    // Storage errors (Category: Storage)
    // ==========================================================================
    /// A read or aggregation query against a collection failed.
    #[error("query on {collection} failed: {message}")]
    Query {
        collection: String,
        message: String,
    },

    /// An upsert was rejected by the store.
    #[error("write to {collection} for '{key}' failed: {message}")]
    Write {
        collection: String,
        key: String,
        message: String,
    },

    /// The store could not be opened or migrated.
    #[error("storage error: {0}")]
    Storage(String),

    // ==========================================================================
    // Data errors (Category: Data)
    // ==========================================================================
    /// A stored document does not match the expected shape.
    #[error("cannot decode {collection} document '{id}': {message}")]
    Decode {
        collection: String,
        id: String,
        message: String,
    },

    /// Unknown usage domain name.
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    /// Email address rejected by the mailing-list gate.
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    // ==========================================================================
    // Notification errors (Category: Notification)
    // ==========================================================================
    /// Webhook returned a non-success status or could not be reached.
    #[error("webhook {endpoint} failed: {message}")]
    Webhook {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// Request timed out.
    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Configuration file not found at expected path.
    #[error("config file not found: {path}")]
    ConfigNotFound {
        path: String,
    },

    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse {
        path: String,
        line: Option<usize>,
        message: String,
    },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // Pass outcome (Category: Internal)
    // ==========================================================================
    /// Some accounts or ranges in a pass failed; the rest were written.
    #[error("partial failure: {failed} unit(s) failed")]
    PartialFailure { failed: usize },

    /// A range worker panicked or was cancelled before reporting.
    #[error("worker for range {range} aborted: {message}")]
    Worker { range: String, message: String },

    // ==========================================================================
    // I/O errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ==========================================================================
    // Generic wrapper (Category: Internal)
    // ==========================================================================
    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StatError {
    /// Shorthand for a [`StatError::Query`] on `collection`.
    pub fn query(collection: &str, err: impl std::fmt::Display) -> Self {
        Self::Query {
            collection: collection.to_string(),
            message: err.to_string(),
        }
    }

    /// Shorthand for a [`StatError::Write`] on `collection` for `key`.
    pub fn write(collection: &str, key: &str, err: impl std::fmt::Display) -> Self {
        Self::Write {
            collection: collection.to_string(),
            key: key.to_string(),
            message: err.to_string(),
        }
    }

    /// Shorthand for a [`StatError::Decode`] of document `id` in `collection`.
    pub fn decode(collection: &str, id: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            collection: collection.to_string(),
            id: id.to_string(),
            message: err.to_string(),
        }
    }

    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::PartialFailure { .. } => ExitCode::PartialFailure,

            Self::Config(_)
            | Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::InvalidDomain(_)
            | Self::InvalidEmail(_)
            | Self::Decode { .. } => ExitCode::ParseError,

            Self::Timeout(_) => ExitCode::Timeout,

            Self::Query { .. }
            | Self::Write { .. }
            | Self::Storage(_)
            | Self::Webhook { .. }
            | Self::Worker { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Query { .. } | Self::Write { .. } | Self::Storage(_) => ErrorCategory::Storage,

            Self::Decode { .. } | Self::InvalidDomain(_) | Self::InvalidEmail(_) => {
                ErrorCategory::Data
            }

            Self::Webhook { .. } | Self::Timeout(_) => ErrorCategory::Notification,

            Self::Config(_)
            | Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. } => ErrorCategory::Configuration,

            Self::PartialFailure { .. }
            | Self::Worker { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `USTAT-{category}{number}` where category is:
    /// - S: Storage
    /// - D: Data
    /// - N: Notification
    /// - C: Configuration
    /// - X: Internal
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            // Storage errors (S001-S099)
            Self::Query { .. } => "USTAT-S001",
            Self::Write { .. } => "USTAT-S002",
            Self::Storage(_) => "USTAT-S003",

            // Data errors (D001-D099)
            Self::Decode { .. } => "USTAT-D001",
            Self::InvalidDomain(_) => "USTAT-D002",
            Self::InvalidEmail(_) => "USTAT-D003",

            // Notification errors (N001-N099)
            Self::Webhook { .. } => "USTAT-N001",
            Self::Timeout(_) => "USTAT-N002",

            // Configuration errors (C001-C099)
            Self::ConfigNotFound { .. } => "USTAT-C001",
            Self::ConfigParse { .. } => "USTAT-C002",
            Self::ConfigInvalid { .. } => "USTAT-C003",
            Self::Config(_) => "USTAT-C004",

            // Internal errors (X001-X099)
            Self::PartialFailure { .. } => "USTAT-X010",
            Self::Worker { .. } => "USTAT-X011",
            Self::Io(_) => "USTAT-X001",
            Self::Json(_) => "USTAT-X002",
            Self::Other(_) => "USTAT-X099",
        }
    }

    /// Returns whether the error is potentially recoverable by retrying.
    ///
    /// Store queries and writes are retryable: the next scheduled pass
    /// reconciles whatever a failed one left stale. Shape failures are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Query { .. }
                | Self::Write { .. }
                | Self::Timeout(_)
                | Self::Webhook { .. }
                | Self::Worker { .. }
        )
    }
}

/// Result type alias for ustat operations.
pub type Result<T> = std::result::Result<T, StatError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<StatError> {
        vec![
            StatError::query("accounts", "boom"),
            StatError::write("stats", "acct-1", "boom"),
            StatError::Storage(String::new()),
            StatError::decode("stats", "acct-1", "bad"),
            StatError::InvalidDomain(String::new()),
            StatError::InvalidEmail(String::new()),
            StatError::Webhook {
                endpoint: String::new(),
                status: None,
                message: String::new(),
            },
            StatError::Timeout(0),
            StatError::ConfigNotFound {
                path: String::new(),
            },
            StatError::ConfigParse {
                path: String::new(),
                line: None,
                message: String::new(),
            },
            StatError::ConfigInvalid {
                key: String::new(),
                value: String::new(),
                message: String::new(),
            },
            StatError::Config(String::new()),
            StatError::PartialFailure { failed: 1 },
            StatError::Worker {
                range: String::new(),
                message: String::new(),
            },
            StatError::Io(std::io::Error::other("x")),
            StatError::Json(serde_json::from_str::<()>("invalid").unwrap_err()),
            StatError::Other(anyhow::anyhow!("x")),
        ]
    }

    // -------------------------------------------------------------------------
    // ErrorCategory tests
    // -------------------------------------------------------------------------

    #[test]
    fn error_category_code_prefix() {
        assert_eq!(ErrorCategory::Storage.code_prefix(), "S");
        assert_eq!(ErrorCategory::Data.code_prefix(), "D");
        assert_eq!(ErrorCategory::Notification.code_prefix(), "N");
        assert_eq!(ErrorCategory::Configuration.code_prefix(), "C");
        assert_eq!(ErrorCategory::Internal.code_prefix(), "X");
    }

    #[test]
    fn error_category_display() {
        assert_eq!(format!("{}", ErrorCategory::Storage), "Storage error");
        assert_eq!(format!("{}", ErrorCategory::Notification), "Notification error");
    }

    // -------------------------------------------------------------------------
    // StatError tests
    // -------------------------------------------------------------------------

    #[test]
    fn error_codes_follow_category_prefix() {
        for err in all_variants() {
            let code = err.error_code();
            let expected = format!("USTAT-{}", err.category().code_prefix());
            assert!(
                code.starts_with(&expected),
                "{code} should start with {expected}"
            );
            assert_eq!(code.len(), 10, "{code} should be USTAT-XNNN");
        }
    }

    #[test]
    fn error_codes_are_unique() {
        use std::collections::HashSet;

        let codes: Vec<&str> = all_variants().iter().map(StatError::error_code).collect();
        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "Error codes should be unique");
    }

    #[test]
    fn storage_failures_are_retryable() {
        assert!(StatError::query("usage_events", "locked").is_retryable());
        assert!(StatError::write("stats", "a", "locked").is_retryable());
        assert!(!StatError::decode("stats", "a", "missing field").is_retryable());
        assert!(!StatError::Config("x".into()).is_retryable());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(
            StatError::PartialFailure { failed: 3 }.exit_code(),
            ExitCode::PartialFailure
        );
        assert_eq!(
            StatError::InvalidDomain("x".into()).exit_code(),
            ExitCode::ParseError
        );
        assert_eq!(StatError::Timeout(5).exit_code(), ExitCode::Timeout);
        assert_eq!(StatError::Storage("x".into()).exit_code(), ExitCode::GeneralError);
        assert_eq!(i32::from(ExitCode::PartialFailure), 2);
    }

    #[test]
    fn decode_message_names_document() {
        let err = StatError::decode("stats", "acct-42", "missing field `bills`");
        let msg = err.to_string();
        assert!(msg.contains("stats"));
        assert!(msg.contains("acct-42"));
        assert!(msg.contains("missing field"));
    }
}
