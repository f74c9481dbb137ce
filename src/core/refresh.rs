//! Refresh pass: partition the account population and rebuild every stat.
//!
//! The population is split into `ceil(N / batch_size)` contiguous ranges of
//! the `(created_at, id)` ordering. Ranges run concurrently on a pool of at
//! most `max_workers` tasks. A failing account is recorded and its worker
//! moves on; a failing or panicking range is recorded and its siblings keep
//! running. The pass always waits for every range before it reports.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::aggregator::{Aggregator, AppSummaryCache};
use crate::core::writer::Writer;
use crate::error::{Result, StatError};
use crate::storage::DocumentStore;

/// One contiguous slice `[start, end)` of the ordered population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Range {
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} [{}, {})", self.index, self.start, self.end)
    }
}

/// Split `total` items into contiguous, non-overlapping ranges of at most `batch_size`.
///
/// A zero batch size is treated as one.
#[must_use]
pub fn partition(total: u64, batch_size: u64) -> Vec<Range> {
    let batch = batch_size.max(1);
    (0..total.div_ceil(batch))
        .map(|i| Range {
            index: usize::try_from(i).unwrap_or(usize::MAX),
            start: i * batch,
            end: ((i + 1) * batch).min(total),
        })
        .collect()
}

/// One account that could not be refreshed.
#[derive(Debug, Clone, Serialize)]
pub struct AccountFailure {
    pub account_id: String,
    pub code: &'static str,
    pub error: String,
}

/// Outcome of one range worker.
#[derive(Debug, Clone, Serialize)]
pub struct RangeReport {
    pub range: Range,
    pub processed: u64,
    pub refreshed: u64,
    pub failures: Vec<AccountFailure>,
    /// Set when the range could not run at all (listing failed, worker panicked).
    pub error: Option<String>,
}

impl RangeReport {
    const fn new(range: Range) -> Self {
        Self {
            range,
            processed: 0,
            refreshed: 0,
            failures: Vec::new(),
            error: None,
        }
    }

    fn aborted(range: Range, err: &StatError) -> Self {
        let mut report = Self::new(range);
        report.error = Some(format!("{}: {err}", err.error_code()));
        report
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.failures.is_empty()
    }
}

/// Aggregated outcome of a refresh pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub now: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub population: u64,
    pub batch_size: u64,
    pub ranges: Vec<RangeReport>,
    /// Workers that ended without returning a report.
    pub worker_errors: Vec<String>,
}

impl PassReport {
    #[must_use]
    pub fn refreshed(&self) -> u64 {
        self.ranges.iter().map(|r| r.refreshed).sum()
    }

    #[must_use]
    pub fn failed_accounts(&self) -> usize {
        self.ranges.iter().map(|r| r.failures.len()).sum()
    }

    #[must_use]
    pub fn failed_ranges(&self) -> usize {
        self.ranges.iter().filter(|r| r.error.is_some()).count() + self.worker_errors.len()
    }

    /// True when every account of every range was written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.worker_errors.is_empty() && self.ranges.iter().all(RangeReport::is_clean)
    }

    /// Convert an incomplete pass into [`StatError::PartialFailure`].
    ///
    /// # Errors
    /// Returns `PartialFailure` when any account or range failed.
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(StatError::PartialFailure {
                failed: self.failed_accounts() + self.failed_ranges(),
            })
        }
    }
}

/// Pass settings.
#[derive(Debug, Clone, Copy)]
pub struct RefreshOptions {
    pub batch_size: u64,
    pub max_workers: usize,
}

/// Runs refresh passes over a store.
#[derive(Clone)]
pub struct RefreshEngine {
    store: Arc<dyn DocumentStore>,
    aggregator: Aggregator,
    writer: Writer,
    cache: Arc<AppSummaryCache>,
    options: RefreshOptions,
}

impl RefreshEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<AppSummaryCache>,
        options: RefreshOptions,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(Arc::clone(&store), Arc::clone(&cache)),
            writer: Writer::new(Arc::clone(&store)),
            store,
            cache,
            options: RefreshOptions {
                batch_size: options.batch_size.max(1),
                max_workers: options.max_workers.max(1),
            },
        }
    }

    /// Rebuild the stat of every account as of `now`.
    ///
    /// # Errors
    /// Returns an error only when the population cannot be counted. Account
    /// and range failures are reported in the [`PassReport`].
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassReport> {
        let started_at = Utc::now();
        self.cache.invalidate_all();

        let population = self.store.count_accounts().await?;
        let ranges = partition(population, self.options.batch_size);
        tracing::info!(
            %now,
            population,
            ranges = ranges.len(),
            workers = self.options.max_workers,
            "refresh pass started"
        );

        let permits = Arc::new(Semaphore::new(self.options.max_workers));
        let mut set = JoinSet::new();
        for range in ranges {
            let this = self.clone();
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    let err = StatError::Worker {
                        range: range.to_string(),
                        message: "worker pool closed".to_string(),
                    };
                    return RangeReport::aborted(range, &err);
                };
                AssertUnwindSafe(this.run_range(range, now))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        let err = StatError::Worker {
                            range: range.to_string(),
                            message: "range worker panicked".to_string(),
                        };
                        tracing::error!(range_start = range.start, range_end = range.end, "range worker panicked");
                        RangeReport::aborted(range, &err)
                    })
            });
        }

        let mut reports = Vec::new();
        let mut worker_errors = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::error!(error = %err, "range worker did not report");
                    worker_errors.push(err.to_string());
                }
            }
        }
        reports.sort_by_key(|r| r.range.index);

        let report = PassReport {
            now,
            started_at,
            finished_at: Utc::now(),
            population,
            batch_size: self.options.batch_size,
            ranges: reports,
            worker_errors,
        };
        tracing::info!(
            refreshed = report.refreshed(),
            failed_accounts = report.failed_accounts(),
            failed_ranges = report.failed_ranges(),
            cache_hits = self.cache.stats().hits(),
            cache_misses = self.cache.stats().misses(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "refresh pass finished"
        );
        Ok(report)
    }

    async fn run_range(&self, range: Range, now: DateTime<Utc>) -> RangeReport {
        let mut report = RangeReport::new(range);
        let accounts = match self.store.list_accounts(range.start, range.len()).await {
            Ok(accounts) => accounts,
            Err(err) => {
                tracing::error!(
                    range_start = range.start,
                    range_end = range.end,
                    error = %err,
                    "listing range failed"
                );
                return RangeReport::aborted(range, &err);
            }
        };

        for account in &accounts {
            report.processed += 1;
            let outcome = match self.aggregator.aggregate(account, now).await {
                Ok(stat) => self.writer.write_stat(stat).await.map(|_| ()),
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => report.refreshed += 1,
                Err(err) => {
                    tracing::warn!(
                        account = %account.id,
                        range_start = range.start,
                        range_end = range.end,
                        code = err.error_code(),
                        error = %err,
                        "account refresh failed"
                    );
                    report.failures.push(AccountFailure {
                        account_id: account.id.clone(),
                        code: err.error_code(),
                        error: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            range_start = range.start,
            range_end = range.end,
            processed = report.processed,
            refreshed = report.refreshed,
            failed = report.failures.len(),
            "range finished"
        );
        report
    }
}
