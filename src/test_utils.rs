//! Test utilities for ustat.
//!
//! Provides fixture factories, a fault-injecting store wrapper, and
//! assertion macros for use across unit and integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ustat::test_utils::*;
//!
//! let store = memory_store();
//! let account = make_test_account("acct-1", at(2024, 3, 4, 9));
//! let event = make_test_event("e1", "acct-1", Domain::Ai, at(2024, 3, 5, 10), 5);
//! ```

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::core::domain::Domain;
use crate::core::models::{
    Account, App, Connection, Dataset, DerivedStat, Payment, Period, Plan, Quota, RawUsageEvent,
    SegmentTrack, Upload, WeeklyCohortSnapshot,
};
use crate::error::{Result, StatError};
use crate::storage::{DocumentStore, ImportSummary, Lookup, SqliteStore, collections};

// =============================================================================
// Test Data Factories
// =============================================================================

/// UTC instant at the top of `hour`.
///
/// # Panics
///
/// Panics on an invalid date.
#[must_use]
pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid test date")
}

/// An account with a deliverable email derived from its id.
#[must_use]
pub fn make_test_account(id: &str, created_at: DateTime<Utc>) -> Account {
    let mut account = Account::new(id, created_at);
    account.email = format!("{id}@example.com");
    account.given_name = "Test".to_string();
    account.company_name = "Example Inc".to_string();
    account
}

/// A usage event with only standard units.
#[must_use]
pub fn make_test_event(
    id: &str,
    account_id: &str,
    domain: Domain,
    collected_at: DateTime<Utc>,
    usage: u64,
) -> RawUsageEvent {
    RawUsageEvent {
        id: id.to_string(),
        account_id: account_id.to_string(),
        domain,
        collected_at,
        usage,
        advanced_usage: 0,
    }
}

/// A paid quota of `kind` valid over `[start, end]`.
#[must_use]
pub fn make_test_quota(
    id: &str,
    account_id: &str,
    kind: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Quota {
    Quota {
        id: id.to_string(),
        account_id: account_id.to_string(),
        kind: kind.to_string(),
        plan: Plan {
            plan_type: "Pro".to_string(),
            level: 3,
        },
        period_of_validity: Period { start, end },
    }
}

/// A USD payment of `kind`.
#[must_use]
pub fn make_test_payment(
    id: &str,
    account_id: &str,
    kind: &str,
    created_at: DateTime<Utc>,
) -> Payment {
    Payment {
        id: id.to_string(),
        account_id: account_id.to_string(),
        kind: kind.to_string(),
        currency: "USD".to_string(),
        amount: 4_900,
        created_at: Some(created_at),
    }
}

/// A live app referencing `knowledge_bases`.
#[must_use]
pub fn make_test_app(id: &str, account_id: &str, knowledge_bases: &[&str]) -> App {
    App {
        id: id.to_string(),
        account_id: account_id.to_string(),
        status: "active".to_string(),
        knowledge_base_ids: knowledge_bases.iter().map(ToString::to_string).collect(),
    }
}

#[must_use]
pub fn make_test_upload(id: &str, account_id: &str) -> Upload {
    Upload {
        id: id.to_string(),
        account_id: account_id.to_string(),
        status: "active".to_string(),
    }
}

#[must_use]
pub fn make_test_connection(id: &str, account_id: &str) -> Connection {
    Connection {
        id: id.to_string(),
        account_id: account_id.to_string(),
        status: "running".to_string(),
    }
}

/// `count` accounts created one hour apart from `first`, ids `acct-0000`...
#[must_use]
pub fn make_test_population(count: usize, first: DateTime<Utc>) -> Vec<Account> {
    (0..count)
        .map(|i| {
            let offset = chrono::Duration::hours(i64::try_from(i).unwrap_or(i64::MAX));
            make_test_account(&format!("acct-{i:04}"), first + offset)
        })
        .collect()
}

/// A fresh in-memory store.
///
/// # Panics
///
/// Panics if the schema cannot be created.
#[must_use]
pub fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().expect("in-memory store"))
}

/// An in-memory store preloaded with `dataset`.
///
/// # Panics
///
/// Panics if the import fails.
pub async fn seeded_store(dataset: &Dataset) -> Arc<SqliteStore> {
    let store = memory_store();
    store.import(dataset).await.expect("seed import");
    store
}

// =============================================================================
// Fault Injection
// =============================================================================

/// Delegates to an inner store, failing or panicking on chosen accounts.
///
/// Faults fire on `usage_events`, the first per-account read of a refresh.
pub struct FailingStore {
    inner: Arc<dyn DocumentStore>,
    fail_accounts: HashSet<String>,
    panic_accounts: HashSet<String>,
    fail_count: bool,
    fail_stat_writes: bool,
}

impl FailingStore {
    #[must_use]
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            fail_accounts: HashSet::new(),
            panic_accounts: HashSet::new(),
            fail_count: false,
            fail_stat_writes: false,
        }
    }

    /// Reads for `account_id` return a query error.
    #[must_use]
    pub fn failing_on(mut self, account_id: &str) -> Self {
        self.fail_accounts.insert(account_id.to_string());
        self
    }

    /// Reads for `account_id` panic.
    #[must_use]
    pub fn panicking_on(mut self, account_id: &str) -> Self {
        self.panic_accounts.insert(account_id.to_string());
        self
    }

    /// `count_accounts` returns a query error.
    #[must_use]
    pub const fn failing_count(mut self) -> Self {
        self.fail_count = true;
        self
    }

    /// Every `upsert_stat` returns a write error.
    #[must_use]
    pub const fn failing_stat_writes(mut self) -> Self {
        self.fail_stat_writes = true;
        self
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn count_accounts(&self) -> Result<u64> {
        if self.fail_count {
            return Err(StatError::query(collections::ACCOUNTS, "injected failure"));
        }
        self.inner.count_accounts().await
    }

    async fn list_accounts(&self, skip: u64, limit: u64) -> Result<Vec<Account>> {
        self.inner.list_accounts(skip, limit).await
    }

    async fn accounts_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Account>> {
        self.inner.accounts_created_between(start, end).await
    }

    async fn usage_events(&self, account_id: &str, domain: Domain) -> Result<Vec<RawUsageEvent>> {
        assert!(
            !self.panic_accounts.contains(account_id),
            "injected panic for {account_id}"
        );
        if self.fail_accounts.contains(account_id) {
            return Err(StatError::query(collections::USAGE_EVENTS, "injected failure"));
        }
        self.inner.usage_events(account_id, domain).await
    }

    async fn population_usage(
        &self,
        domain: Domain,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawUsageEvent>> {
        self.inner.population_usage(domain, from, to).await
    }

    async fn active_quota(
        &self,
        account_id: &str,
        kind: &str,
        now: DateTime<Utc>,
    ) -> Result<Lookup<Quota>> {
        self.inner.active_quota(account_id, kind, now).await
    }

    async fn latest_payment(&self, account_id: &str, kind: &str) -> Result<Lookup<Payment>> {
        self.inner.latest_payment(account_id, kind).await
    }

    async fn apps(&self, account_id: &str) -> Result<Vec<App>> {
        self.inner.apps(account_id).await
    }

    async fn count_uploads(&self, account_id: &str) -> Result<u64> {
        self.inner.count_uploads(account_id).await
    }

    async fn count_connections(&self, account_id: &str) -> Result<u64> {
        self.inner.count_connections(account_id).await
    }

    async fn upsert_stat(&self, stat: &DerivedStat) -> Result<()> {
        if self.fail_stat_writes {
            return Err(StatError::write(collections::STATS, &stat.id, "injected failure"));
        }
        self.inner.upsert_stat(stat).await
    }

    async fn get_stat(&self, account_id: &str) -> Result<Lookup<DerivedStat>> {
        self.inner.get_stat(account_id).await
    }

    async fn stats_created_since(&self, since: DateTime<Utc>) -> Result<Vec<DerivedStat>> {
        self.inner.stats_created_since(since).await
    }

    async fn upsert_cohort_snapshot(&self, snapshot: &WeeklyCohortSnapshot) -> Result<()> {
        self.inner.upsert_cohort_snapshot(snapshot).await
    }

    async fn get_cohort_snapshot(&self, alias: &str) -> Result<Lookup<WeeklyCohortSnapshot>> {
        self.inner.get_cohort_snapshot(alias).await
    }

    async fn list_cohort_snapshots(&self) -> Result<Vec<WeeklyCohortSnapshot>> {
        self.inner.list_cohort_snapshots().await
    }

    async fn upsert_track(&self, track: &SegmentTrack) -> Result<()> {
        self.inner.upsert_track(track).await
    }

    async fn list_tracks(&self) -> Result<Vec<SegmentTrack>> {
        self.inner.list_tracks().await
    }

    async fn import(&self, dataset: &Dataset) -> Result<ImportSummary> {
        self.inner.import(dataset).await
    }
}

// =============================================================================
// Test Directory Helper
// =============================================================================

/// An isolated temporary directory, removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file, with parent directories as needed.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// A config file body pointing webhooks at `base_url`.
#[must_use]
pub fn make_test_config_toml(base_url: &str) -> String {
    format!(
        r#"[refresh]
batch_size = 2
max_workers = 2

[cohort]
start_at = "2024-03-04"

[alarm]
webhook_url = "{base_url}/alarm"
threshold_percent = 30.0
timeout_seconds = 2

[marketing]
enabled = true
webhook_url = "{base_url}/members"
product_tag = "vanus_ai"
segment_limit = 50
timeout_seconds = 2
"#
    )
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string does NOT contain a substring.
#[macro_export]
macro_rules! assert_not_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            !haystack.contains(needle),
            "Expected string NOT to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Parse a string as JSON, panicking with the input on failure.
#[macro_export]
macro_rules! assert_json_valid {
    ($json:expr) => {{
        let json = $json;
        match serde_json::from_str::<serde_json::Value>(json) {
            Ok(value) => value,
            Err(e) => panic!(
                "Expected valid JSON, but parsing failed: {}\n\nJSON string:\n{}",
                e, json
            ),
        }
    }};
}
