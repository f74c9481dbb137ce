//! Time-bucketing normalizer.
//!
//! The upstream collectors snapshot usage at different points relative to the
//! billing day boundary. These rules map both domains onto one daily key space:
//!
//! - **Connect**: the collector stamps a day's usage at the *following*
//!   boundary, so the bucket is the timestamp moved back exactly 24 hours.
//!   No further truncation is applied.
//! - **AI**: an event stamped exactly at hour 0 belongs to the previous day;
//!   any other hour belongs to its own day. The result is truncated to UTC
//!   midnight.

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::core::domain::Domain;
use crate::core::models::RawUsageEvent;
use crate::util::time::midnight;

/// Map a raw event timestamp to its canonical bucket for `domain`.
#[must_use]
pub fn bucket(domain: Domain, at: DateTime<Utc>) -> DateTime<Utc> {
    match domain {
        Domain::Connect => at - Duration::hours(24),
        Domain::Ai => {
            let shifted = if at.hour() == 0 {
                at - Duration::hours(24)
            } else {
                at
            };
            midnight(shifted)
        }
    }
}

/// Bucket of a raw event, using the event's own domain.
#[must_use]
pub fn event_bucket(event: &RawUsageEvent) -> DateTime<Utc> {
    bucket(event.domain, event.collected_at)
}

/// Daily key of a raw event: its bucket truncated to UTC midnight.
///
/// Bill items, `Yesterday` and the alarm's daily sums all group on this key,
/// so a Connect event keeps one day wherever it is counted.
#[must_use]
pub fn day_bucket(event: &RawUsageEvent) -> DateTime<Utc> {
    midnight(event_bucket(event))
}
