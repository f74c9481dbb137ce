//! The refresh and cohort engine.
//!
//! Leaf-first: [`bucket`] normalizes timestamps, [`aggregator`] builds one
//! account's stat, [`cohort`] walks weeks, [`writer`] replaces rollups and
//! [`refresh`] fans a pass out over the population. [`alarm`],
//! [`marketing`] and [`schedule`] are the sibling jobs and their trigger.

pub mod aggregator;
pub mod alarm;
pub mod bucket;
pub mod cache;
pub mod cohort;
pub mod domain;
pub mod http;
pub mod logging;
pub mod marketing;
pub mod models;
pub mod refresh;
pub mod schedule;
pub mod writer;

pub use aggregator::{Aggregator, AppSummary, AppSummaryCache, domain_bills};
pub use alarm::{AlarmDetector, AlarmOutcome, decrease_pct};
pub use bucket::{bucket, day_bucket, event_bucket};
pub use cache::ReadThroughCache;
pub use cohort::{CohortReport, CohortSnapshotter, account_cohort, retention_ratio};
pub use domain::Domain;
pub use marketing::{MarketingReport, MarketingSync, Segment};
pub use models::{Account, Dataset, DerivedStat, RawUsageEvent, WeeklyCohortSnapshot};
pub use refresh::{PassReport, Range, RangeReport, RefreshEngine, RefreshOptions, partition};
pub use schedule::{Clock, FixedClock, Job, JobRunner, Scheduler, SystemClock, Trigger};
pub use writer::Writer;
