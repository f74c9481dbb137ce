//! Common test utilities and fixtures for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: Scenario datasets and store helpers
//! - `logger`: Structured test logging
//! - `log_capture`: Tracing capture for log assertions

#![allow(dead_code)]

pub mod fixtures;
pub mod log_capture;
pub mod logger;
