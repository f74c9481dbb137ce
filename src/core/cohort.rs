//! Weekly cohort and retention calculation.
//!
//! Two views of the same weekly walk:
//!
//! - **Per account**: from the Monday-aligned week containing the account's
//!   creation through the week containing "now", keyed `"week 00"`,
//!   `"week 01"`, ... Each week sums the account's usage whose normalized
//!   bucket lies in `(start, end]`.
//! - **Population**: one [`WeeklyCohortSnapshot`] per creation week (keyed by
//!   its calendar alias, e.g. `"March 6, 2023"`), combining the stored
//!   per-account cohorts of every account created in that week.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::bucket::event_bucket;
use crate::core::models::{Cohort, RawUsageEvent, Retention, Week, WeeklyCohortSnapshot, WeeklyRetention};
use crate::core::writer::Writer;
use crate::error::{Result, StatError};
use crate::storage::{DocumentStore, Lookup};
use crate::util::time::{calendar_alias, monday_of};

const WEEK: Duration = Duration::days(7);

/// Alias of a week counted from an account's creation week.
#[must_use]
pub fn relative_alias(number: u32) -> String {
    format!("week {number:02}")
}

/// The calendar week containing `at`, numbered relative to the week containing `origin`.
#[must_use]
pub fn calendar_week(origin: DateTime<Utc>, at: DateTime<Utc>) -> Week {
    let start = monday_of(at);
    let offset = (start - monday_of(origin)).num_weeks().max(0);
    Week {
        number: u32::try_from(offset).unwrap_or(u32::MAX),
        alias: calendar_alias(start),
        start,
        end: start + WEEK,
    }
}

/// The week after `week`, keeping its aliasing scheme.
#[must_use]
pub fn next_week(week: &Week) -> Week {
    let number = week.number.saturating_add(1);
    let alias = if week.alias.starts_with("week") {
        relative_alias(number)
    } else {
        calendar_alias(week.end)
    };
    Week {
        number,
        alias,
        start: week.end,
        end: week.end + WEEK,
    }
}

/// Contiguous weeks from `first` up to and including the week containing `now`.
///
/// Always contains at least `first`.
#[must_use]
pub fn weeks_through(first: Week, now: DateTime<Utc>) -> Vec<Week> {
    let mut weeks = Vec::new();
    let mut week = first;
    loop {
        let done = week.end > now;
        let next = next_week(&week);
        weeks.push(week);
        if done {
            break;
        }
        week = next;
    }
    weeks
}

/// Relative weeks of an account created at `created_at`.
#[must_use]
pub fn account_weeks(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Vec<Week> {
    let start = monday_of(created_at);
    let first = Week {
        number: 0,
        alias: relative_alias(0),
        start,
        end: start + WEEK,
    };
    weeks_through(first, now)
}

/// Per-week usage of one domain's events.
#[must_use]
pub fn weekly_retention(events: &[RawUsageEvent], weeks: &[Week]) -> BTreeMap<String, Retention> {
    let buckets: Vec<(DateTime<Utc>, u64)> = events
        .iter()
        .map(|e| (event_bucket(e), e.amount()))
        .collect();

    weeks
        .iter()
        .map(|week| {
            let usage = buckets
                .iter()
                .filter(|(bucket, _)| week.start < *bucket && *bucket <= week.end)
                .map(|(_, amount)| *amount)
                .fold(0u64, u64::saturating_add);
            let retention = Retention {
                week: week.clone(),
                active: usage > 0,
                usage,
            };
            (week.alias.clone(), retention)
        })
        .collect()
}

/// Cohort of one account from the same event snapshot used for its bills.
#[must_use]
pub fn account_cohort(
    created_at: DateTime<Utc>,
    ai_events: &[RawUsageEvent],
    connect_events: &[RawUsageEvent],
    now: DateTime<Utc>,
) -> Cohort {
    let weeks = account_weeks(created_at, now);
    Cohort {
        week: calendar_week(created_at, created_at),
        ai: weekly_retention(ai_events, &weeks),
        connect: weekly_retention(connect_events, &weeks),
    }
}

/// Share of active accounts as a two-decimal percentage, e.g. `"33.33%"`.
#[must_use]
pub fn retention_ratio(active: u64, total: u64) -> String {
    if total == 0 {
        return "0.00%".to_string();
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = (active as f64 / total as f64 * 10_000.0).round() / 100.0;
    format!("{ratio:.2}%")
}

#[derive(Default)]
struct Tally {
    weeks: BTreeMap<String, (Week, u64, u64)>,
}

impl Tally {
    fn add(&mut self, cohort: &BTreeMap<String, Retention>) {
        for (alias, retention) in cohort {
            let entry = self
                .weeks
                .entry(alias.clone())
                .or_insert_with(|| (retention.week.clone(), 0, 0));
            entry.1 = entry.1.saturating_add(retention.usage);
            if retention.active {
                entry.2 += 1;
            }
        }
    }

    fn finish(self, total: u64) -> BTreeMap<String, WeeklyRetention> {
        self.weeks
            .into_iter()
            .map(|(alias, (week, usage, active))| {
                let retention = WeeklyRetention {
                    week,
                    ratio: retention_ratio(active, total),
                    usage,
                };
                (alias, retention)
            })
            .collect()
    }
}

/// A creation week whose snapshot could not be computed or written.
#[derive(Debug, Clone, Serialize)]
pub struct WeekFailure {
    pub week: String,
    pub code: &'static str,
    pub error: String,
}

/// Outcome of one population snapshot run.
#[derive(Debug, Clone, Serialize)]
pub struct CohortReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub weeks: usize,
    pub written: usize,
    pub failures: Vec<WeekFailure>,
}

impl CohortReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Computes and writes population cohort snapshots.
#[derive(Clone)]
pub struct CohortSnapshotter {
    store: Arc<dyn DocumentStore>,
    writer: Writer,
    start_at: DateTime<Utc>,
    max_workers: usize,
}

impl CohortSnapshotter {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, start_at: DateTime<Utc>, max_workers: usize) -> Self {
        Self {
            writer: Writer::new(Arc::clone(&store)),
            store,
            start_at,
            max_workers: max_workers.max(1),
        }
    }

    /// Creation weeks covered by a run at `now`.
    ///
    /// The week containing `now` is included; its snapshot is partial until
    /// a later run replaces it.
    #[must_use]
    pub fn weeks(&self, now: DateTime<Utc>) -> Vec<Week> {
        weeks_through(calendar_week(self.start_at, self.start_at), now)
    }

    /// Snapshot of the accounts created in `week`, built from their stored stats.
    ///
    /// # Errors
    /// Propagates store read failures.
    pub async fn compute(&self, week: Week) -> Result<WeeklyCohortSnapshot> {
        let members = self
            .store
            .accounts_created_between(week.start, week.end)
            .await?;

        let mut ai = Tally::default();
        let mut connect = Tally::default();
        for account in &members {
            match self.store.get_stat(&account.id).await? {
                Lookup::Found(stat) => {
                    ai.add(&stat.cohort.ai);
                    connect.add(&stat.cohort.connect);
                }
                Lookup::NotFound => {
                    tracing::warn!(
                        account = %account.id,
                        week = %week.alias,
                        "cohort member has no stat yet, counted as inactive"
                    );
                }
            }
        }

        let total = members.len() as u64;
        Ok(WeeklyCohortSnapshot {
            week,
            total_users: total,
            ai_retention: ai.finish(total),
            connect_retention: connect.finish(total),
            updated_at: Utc::now(),
        })
    }

    /// Compute and write the snapshot of the creation week containing `at`.
    ///
    /// # Errors
    /// Propagates read and write failures.
    pub async fn run_week(&self, at: DateTime<Utc>) -> Result<WeeklyCohortSnapshot> {
        let week = calendar_week(self.start_at, at);
        let snapshot = self.compute(week).await?;
        self.writer.write_snapshot(snapshot).await
    }

    /// Snapshot every creation week from the start week through `now`.
    ///
    /// Weeks run on a bounded pool; a failing week is reported and does not
    /// stop its siblings.
    pub async fn run(&self, now: DateTime<Utc>) -> CohortReport {
        let started_at = Utc::now();
        let weeks = self.weeks(now);
        let total_weeks = weeks.len();
        tracing::info!(weeks = total_weeks, workers = self.max_workers, "cohort snapshot run started");

        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut set = JoinSet::new();
        for week in weeks {
            let this = self.clone();
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let alias = week.alias.clone();
                let Ok(_permit) = permits.acquire_owned().await else {
                    let err = StatError::Worker {
                        range: alias.clone(),
                        message: "worker pool closed".to_string(),
                    };
                    return (alias, Err(err));
                };
                let outcome = AssertUnwindSafe(async {
                    let snapshot = this.compute(week).await?;
                    this.writer.write_snapshot(snapshot).await
                })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(StatError::Worker {
                        range: alias.clone(),
                        message: "cohort worker panicked".to_string(),
                    })
                });
                (alias, outcome)
            });
        }

        let mut written = 0;
        let mut failures = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(snapshot))) => {
                    written += 1;
                    tracing::debug!(week = %snapshot.week.alias, total_users = snapshot.total_users, "cohort snapshot written");
                }
                Ok((week, Err(err))) => {
                    tracing::error!(week = %week, error = %err, "cohort snapshot failed");
                    failures.push(WeekFailure {
                        week,
                        code: err.error_code(),
                        error: err.to_string(),
                    });
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "cohort worker aborted");
                    let err = StatError::Worker {
                        range: String::from("unknown"),
                        message: join_err.to_string(),
                    };
                    failures.push(WeekFailure {
                        week: String::from("unknown"),
                        code: err.error_code(),
                        error: err.to_string(),
                    });
                }
            }
        }
        failures.sort_by(|a, b| a.week.cmp(&b.week));

        let report = CohortReport {
            started_at,
            finished_at: Utc::now(),
            weeks: total_weeks,
            written,
            failures,
        };
        tracing::info!(
            weeks = report.weeks,
            written = report.written,
            failed = report.failures.len(),
            "cohort snapshot run finished"
        );
        report
    }
}
