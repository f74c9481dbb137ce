//! The document store seam.
//!
//! Every engine component reads and writes through [`DocumentStore`]. Point
//! lookups return [`Lookup`] so that "no such document" can never be mistaken
//! for a failed query: `Err` always means the store itself failed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::domain::Domain;
use crate::core::models::{
    Account, App, Dataset, DerivedStat, Payment, Quota, RawUsageEvent, SegmentTrack,
    WeeklyCohortSnapshot,
};
use crate::error::Result;

/// Collection names, shared by the store implementation and error context.
pub mod collections {
    pub const ACCOUNTS: &str = "accounts";
    pub const USAGE_EVENTS: &str = "usage_events";
    pub const QUOTAS: &str = "quotas";
    pub const PAYMENTS: &str = "payments";
    pub const APPS: &str = "apps";
    pub const UPLOADS: &str = "uploads";
    pub const CONNECTIONS: &str = "connections";
    pub const STATS: &str = "stats";
    pub const WEEKLY_COHORTS: &str = "weekly_cohorts";
    pub const SEGMENT_TRACKS: &str = "segment_tracks";
}

/// Result of a point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Resolve absence into a default value.
    pub fn or_else(self, default: impl FnOnce() -> T) -> T {
        match self {
            Self::Found(value) => value,
            Self::NotFound => default(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::NotFound => Lookup::NotFound,
        }
    }

    #[must_use]
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }
}

/// Number of documents written per collection by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ImportSummary {
    pub accounts: usize,
    pub usage_events: usize,
    pub quotas: usize,
    pub payments: usize,
    pub apps: usize,
    pub uploads: usize,
    pub connections: usize,
}

impl ImportSummary {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.accounts
            + self.usage_events
            + self.quotas
            + self.payments
            + self.apps
            + self.uploads
            + self.connections
    }
}

/// Read/write access to the raw and rollup collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ---- accounts -----------------------------------------------------------

    /// Number of accounts in the population.
    async fn count_accounts(&self) -> Result<u64>;

    /// A contiguous slice of accounts ordered by `(created_at, id)`.
    async fn list_accounts(&self, skip: u64, limit: u64) -> Result<Vec<Account>>;

    /// Accounts with `start <= created_at < end`.
    async fn accounts_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Account>>;

    // ---- raw usage ----------------------------------------------------------

    /// Every usage event of one account in one domain.
    async fn usage_events(&self, account_id: &str, domain: Domain) -> Result<Vec<RawUsageEvent>>;

    /// Population usage events of one domain with `from <= collected_at < to`.
    async fn population_usage(
        &self,
        domain: Domain,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawUsageEvent>>;

    // ---- subscription -------------------------------------------------------

    /// The quota of `kind` whose validity window contains `now`.
    async fn active_quota(
        &self,
        account_id: &str,
        kind: &str,
        now: DateTime<Utc>,
    ) -> Result<Lookup<Quota>>;

    /// The most recently created payment of `kind`.
    async fn latest_payment(&self, account_id: &str, kind: &str) -> Result<Lookup<Payment>>;

    // ---- feature counters ---------------------------------------------------

    /// Apps of an account, deleted ones excluded.
    async fn apps(&self, account_id: &str) -> Result<Vec<App>>;

    /// Uploads of an account, deleted ones excluded.
    async fn count_uploads(&self, account_id: &str) -> Result<u64>;

    /// Connections of an account, deleted ones excluded.
    async fn count_connections(&self, account_id: &str) -> Result<u64>;

    // ---- rollups ------------------------------------------------------------

    /// Replace-or-insert the stat keyed by `stat.id`.
    async fn upsert_stat(&self, stat: &DerivedStat) -> Result<()>;

    async fn get_stat(&self, account_id: &str) -> Result<Lookup<DerivedStat>>;

    /// Stats of accounts with `created_at >= since`.
    async fn stats_created_since(&self, since: DateTime<Utc>) -> Result<Vec<DerivedStat>>;

    /// Replace-or-insert the snapshot keyed by `snapshot.week.alias`.
    async fn upsert_cohort_snapshot(&self, snapshot: &WeeklyCohortSnapshot) -> Result<()>;

    async fn get_cohort_snapshot(&self, alias: &str) -> Result<Lookup<WeeklyCohortSnapshot>>;

    /// All snapshots ordered by week start.
    async fn list_cohort_snapshots(&self) -> Result<Vec<WeeklyCohortSnapshot>>;

    /// Replace-or-insert the track keyed by [`SegmentTrack::key`].
    async fn upsert_track(&self, track: &SegmentTrack) -> Result<()>;

    async fn list_tracks(&self) -> Result<Vec<SegmentTrack>>;

    // ---- bulk ---------------------------------------------------------------

    /// Load raw collections. Existing documents with the same id are replaced.
    async fn import(&self, dataset: &Dataset) -> Result<ImportSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_resolves_absence_to_default() {
        let missing: Lookup<u32> = Lookup::NotFound;
        assert_eq!(missing.or_else(|| 7), 7);
        assert_eq!(Lookup::Found(3).or_else(|| 7), 3);
    }

    #[test]
    fn lookup_from_option() {
        assert!(Lookup::from(Some(1)).is_found());
        assert!(!Lookup::<u8>::from(None).is_found());
        assert_eq!(Lookup::Found(2).map(|v| v * 2).found(), Some(4));
    }
}
