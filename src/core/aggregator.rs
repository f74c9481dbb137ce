//! Per-account aggregation.
//!
//! Reads one account's raw documents and folds them into a [`DerivedStat`].
//! Absence of a quota or payment is resolved here into free-tier defaults;
//! any `Err` from the store aborts this account only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::core::bucket::day_bucket;
use crate::core::cache::ReadThroughCache;
use crate::core::cohort::account_cohort;
use crate::core::domain::Domain;
use crate::core::models::{
    Account, AiUsages, Bills, Class, ConnectUsages, DerivedStat, DomainBills, Level, Payment,
    RawUsageEvent, Usages,
};
use crate::error::Result;
use crate::storage::{DocumentStore, Lookup};
use crate::util::time::midnight;

/// App count and distinct knowledge bases of one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppSummary {
    pub apps: u64,
    pub knowledge_bases: u64,
}

/// Account id to app summary, shared by every worker of a pass.
pub type AppSummaryCache = ReadThroughCache<String, AppSummary>;

/// Fold events into daily buckets and the rolling windows.
///
/// Items are keyed by [`day_bucket`]. `yesterday` is the item at the previous
/// UTC midnight; the weekly
/// and monthly windows take every bucket within 7 / 30 days of `now`.
#[must_use]
pub fn domain_bills(events: &[RawUsageEvent], now: DateTime<Utc>) -> DomainBills {
    let mut items: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
    for event in events {
        let slot = items.entry(day_bucket(event)).or_default();
        *slot = slot.saturating_add(event.amount());
    }

    let week = Duration::days(7);
    let month = Duration::days(30);
    let mut bills = DomainBills::default();
    for (bucket, amount) in &items {
        let age = (now - *bucket).abs();
        bills.total = bills.total.saturating_add(*amount);
        if age <= week {
            bills.last_week = bills.last_week.saturating_add(*amount);
        }
        if age <= month {
            bills.last_month = bills.last_month.saturating_add(*amount);
        }
    }
    bills.yesterday = items
        .get(&(midnight(now) - Duration::days(1)))
        .copied()
        .unwrap_or_default();
    bills.items = items;
    bills
}

/// Builds [`DerivedStat`] records.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn DocumentStore>,
    apps: Arc<AppSummaryCache>,
}

impl Aggregator {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, apps: Arc<AppSummaryCache>) -> Self {
        Self { store, apps }
    }

    /// Compute the rollup of `account` as of `now`.
    ///
    /// Bills and cohort are derived from a single read of each domain's
    /// events. `updated_at` is set to `now`; the writer restamps it.
    ///
    /// # Errors
    /// Propagates any query or decode failure.
    pub async fn aggregate(&self, account: &Account, now: DateTime<Utc>) -> Result<DerivedStat> {
        let ai_events = self.store.usage_events(&account.id, Domain::Ai).await?;
        let connect_events = self.store.usage_events(&account.id, Domain::Connect).await?;

        let bills = Bills {
            ai: domain_bills(&ai_events, now),
            connect: domain_bills(&connect_events, now),
        };
        let cohort = account_cohort(account.created_at, &ai_events, &connect_events, now);
        let class = Class {
            ai: self.level(&account.id, Domain::Ai, now).await?,
            connect: self.level(&account.id, Domain::Connect, now).await?,
        };
        let usages = self.usages(&account.id).await?;

        Ok(DerivedStat {
            id: account.id.clone(),
            created_at: account.created_at,
            updated_at: now,
            email: account.email.clone(),
            company_email: account.company_email.clone(),
            phone: account.phone.clone(),
            country: account.country.clone(),
            given_name: account.given_name.clone(),
            family_name: account.family_name.clone(),
            nickname: account.nickname.clone(),
            company_name: account.company_name.clone(),
            industry: account.resolved_industry().to_string(),
            class,
            bills,
            usages,
            cohort,
        })
    }

    async fn level(&self, account_id: &str, domain: Domain, now: DateTime<Utc>) -> Result<Level> {
        let kind = domain.quota_kind();
        let Lookup::Found(quota) = self.store.active_quota(account_id, kind, now).await? else {
            return Ok(Level::free_tier());
        };
        let payment = self
            .store
            .latest_payment(account_id, kind)
            .await?
            .or_else(Payment::default);

        Ok(Level {
            premium: !payment.is_empty(),
            plan: quota.plan,
            payment: Some(payment),
            period_of_validity: Some(quota.period_of_validity),
        })
    }

    async fn usages(&self, account_id: &str) -> Result<Usages> {
        let store = Arc::clone(&self.store);
        let summary = self
            .apps
            .get_or_load(account_id.to_string(), || async move {
                let apps = store.apps(account_id).await?;
                let knowledge_bases: BTreeSet<&str> = apps
                    .iter()
                    .flat_map(|app| app.knowledge_base_ids.iter().map(String::as_str))
                    .collect();
                Ok(AppSummary {
                    apps: apps.len() as u64,
                    knowledge_bases: knowledge_bases.len() as u64,
                })
            })
            .await?;

        Ok(Usages {
            ai: AiUsages {
                app: summary.apps,
                upload: self.store.count_uploads(account_id).await?,
                knowledge_base: summary.knowledge_bases,
            },
            connect: ConnectUsages {
                connection: self.store.count_connections(account_id).await?,
            },
        })
    }
}
