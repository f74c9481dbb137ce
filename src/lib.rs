//! ustat - account usage statistics engine
//!
//! Periodically rebuilds per-account usage rollups (bills, subscription
//! class, feature counters and weekly retention cohorts) from raw usage
//! collections, snapshots population cohorts, and runs the sibling usage
//! alarm and marketing-segment jobs.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod storage;
pub mod util;
pub mod webhook;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, Result, StatError};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
