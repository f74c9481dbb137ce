//! Usage-drop alarm.
//!
//! Compares the population usage of the latest complete day bucket with the
//! bucket before it. A drop strictly greater than the threshold produces one
//! notification. Notification failures are logged and never returned.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;

use crate::core::bucket::day_bucket;
use crate::core::domain::Domain;
use crate::error::Result;
use crate::storage::DocumentStore;
use crate::util::time::midnight;
use crate::webhook::AlarmNotifier;

/// Decision for one domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AlarmOutcome {
    /// Usage held or grew (also the case when the previous day had no usage).
    NoDrop { today: u64, yesterday: u64 },
    /// Usage dropped, but not past the threshold.
    BelowThreshold {
        today: u64,
        yesterday: u64,
        decrease_pct: f64,
    },
    /// Usage dropped past the threshold and a notification was attempted.
    Fired {
        today: u64,
        yesterday: u64,
        decrease_pct: f64,
        message: String,
        delivered: bool,
    },
}

impl AlarmOutcome {
    #[must_use]
    pub const fn fired(&self) -> bool {
        matches!(self, Self::Fired { .. })
    }
}

/// Percentage drop from `yesterday` to `today`, or `None` when usage did not drop.
///
/// `yesterday == 0` can never be a drop, so no division by zero occurs.
#[must_use]
pub fn decrease_pct(today: u64, yesterday: u64) -> Option<f64> {
    if today >= yesterday {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let pct = (yesterday - today) as f64 * 100.0 / yesterday as f64;
    Some(pct)
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Alarm text, e.g. `"On March 11th, the usage of connect was 60, decrease of 40.00% ..."`.
#[must_use]
pub fn alarm_message(domain: Domain, now: DateTime<Utc>, today: u64, pct: f64) -> String {
    format!(
        "On {} {}{}, the usage of {} was {}, decrease of {:.2}% compared to the previous day",
        now.format("%B"),
        now.day(),
        ordinal_suffix(now.day()),
        domain.cli_name(),
        today,
        pct
    )
}

/// Checks population usage for drops.
pub struct AlarmDetector {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn AlarmNotifier>,
    threshold_percent: f64,
}

impl AlarmDetector {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn AlarmNotifier>,
        threshold_percent: f64,
    ) -> Self {
        Self {
            store,
            notifier,
            threshold_percent,
        }
    }

    /// Summed usage of every event whose [`day_bucket`] is `day`.
    ///
    /// # Errors
    /// Propagates store read failures.
    pub async fn daily_usage(&self, domain: Domain, day: DateTime<Utc>) -> Result<u64> {
        let day = midnight(day);
        // Connect stamps a day at the following boundary, AI within the day.
        let events = self
            .store
            .population_usage(domain, day, day + Duration::days(2))
            .await?;
        Ok(events
            .iter()
            .filter(|e| day_bucket(e) == day)
            .map(crate::core::models::RawUsageEvent::amount)
            .fold(0u64, u64::saturating_add))
    }

    /// Evaluate `domain` as of `now` and notify when the drop exceeds the threshold.
    ///
    /// # Errors
    /// Propagates store read failures. Notification failures are logged only.
    pub async fn check(&self, domain: Domain, now: DateTime<Utc>) -> Result<AlarmOutcome> {
        let day = midnight(now) - Duration::days(1);
        let today = self.daily_usage(domain, day).await?;
        let yesterday = self.daily_usage(domain, day - Duration::days(1)).await?;

        let Some(pct) = decrease_pct(today, yesterday) else {
            tracing::info!(%domain, today, yesterday, "usage did not drop, no alarm");
            return Ok(AlarmOutcome::NoDrop { today, yesterday });
        };

        if pct <= self.threshold_percent {
            tracing::info!(
                %domain,
                today,
                yesterday,
                decrease_pct = pct,
                threshold = self.threshold_percent,
                "usage drop below alarm threshold"
            );
            return Ok(AlarmOutcome::BelowThreshold {
                today,
                yesterday,
                decrease_pct: pct,
            });
        }

        let message = alarm_message(domain, now, today, pct);
        tracing::warn!(%domain, today, yesterday, decrease_pct = pct, "usage alarm fired");
        let delivered = match self.notifier.notify(&message).await {
            Ok(sent) => sent,
            Err(err) => {
                tracing::error!(%domain, code = err.error_code(), error = %err, "alarm notification failed");
                false
            }
        };

        Ok(AlarmOutcome::Fired {
            today,
            yesterday,
            decrease_pct: pct,
            message,
            delivered,
        })
    }

    /// Check every domain. A domain whose reads fail is logged and skipped.
    pub async fn check_all(&self, now: DateTime<Utc>) -> Vec<(Domain, Result<AlarmOutcome>)> {
        let mut outcomes = Vec::with_capacity(Domain::ALL.len());
        for domain in Domain::ALL {
            let outcome = self.check(domain, now).await;
            if let Err(err) = &outcome {
                tracing::error!(%domain, error = %err, "alarm check failed");
            }
            outcomes.push((domain, outcome));
        }
        outcomes
    }
}
