//! Utility functions.

pub mod time;

pub use time::{calendar_alias, midnight, monday_of, parse_instant};
