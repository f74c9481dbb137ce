//! Core data models.
//!
//! Two families live here: the raw documents the engine reads (accounts,
//! usage events, quotas, payments, feature records) and the rollup documents
//! it writes (`DerivedStat`, `WeeklyCohortSnapshot`, `SegmentTrack`).
//!
//! Every map in a rollup is a `BTreeMap` so that serializing the same rollup
//! twice yields the same bytes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::domain::Domain;

/// Weight applied to advanced-model units when computing AI credits.
pub const ADVANCED_USAGE_WEIGHT: u64 = 20;

/// Industry value that defers to the free-text `industry_extra` field.
pub const INDUSTRY_OTHERS: &str = "Others";

/// Status marking a feature record as deleted.
pub const STATUS_DELETED: &str = "deleted";

// =============================================================================
// Raw inputs
// =============================================================================

/// An account owned by the upstream identity system. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company_email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub industry_extra: String,
}

impl Account {
    /// Minimal account with only identity and creation time.
    #[must_use]
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            email: String::new(),
            company_email: String::new(),
            phone: String::new(),
            country: String::new(),
            given_name: String::new(),
            family_name: String::new(),
            nickname: String::new(),
            company_name: String::new(),
            industry: String::new(),
            industry_extra: String::new(),
        }
    }

    /// Industry as shown on the dashboard: "Others" resolves to the free-text value.
    #[must_use]
    pub fn resolved_industry(&self) -> &str {
        if self.industry == INDUSTRY_OTHERS {
            &self.industry_extra
        } else {
            &self.industry
        }
    }
}

/// One append-only billing/action record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawUsageEvent {
    pub id: String,
    pub account_id: String,
    pub domain: Domain,
    pub collected_at: DateTime<Utc>,
    /// Standard units (AI: standard-model calls, Connect: delivered events).
    pub usage: u64,
    /// Advanced-model units, AI only.
    #[serde(default)]
    pub advanced_usage: u64,
}

impl RawUsageEvent {
    /// Billable amount of this event.
    ///
    /// AI credits weigh each advanced-model unit as twenty standard ones.
    #[must_use]
    pub const fn amount(&self) -> u64 {
        match self.domain {
            Domain::Ai => self
                .usage
                .saturating_add(self.advanced_usage.saturating_mul(ADVANCED_USAGE_WEIGHT)),
            Domain::Connect => self.usage,
        }
    }
}

/// Validity window of a quota record. Both ends inclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Subscription plan descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plan {
    #[serde(rename = "type")]
    pub plan_type: String,
    pub level: i64,
}

impl Plan {
    /// The plan every account has when no quota covers "now".
    #[must_use]
    pub fn free() -> Self {
        Self {
            plan_type: "Free".to_string(),
            level: 1,
        }
    }
}

/// A quota/plan record granted to an account for a product kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quota {
    pub id: String,
    pub account_id: String,
    /// Product kind, `"ai"` or `"cloud"`.
    pub kind: String,
    pub plan: Plan,
    pub period_of_validity: Period,
}

/// A payment record. An empty currency marks the zero payment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub currency: String,
    /// Amount in minor units.
    #[serde(default)]
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Payment {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.currency.is_empty()
    }
}

/// An AI application owned by an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub id: String,
    pub account_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub knowledge_base_ids: Vec<String>,
}

/// A file uploaded to an AI application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Upload {
    pub id: String,
    pub account_id: String,
    #[serde(default)]
    pub status: String,
}

/// A Connect pipeline owned by an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub id: String,
    pub account_id: String,
    #[serde(default)]
    pub status: String,
}

/// Everything a raw import file may carry. Missing collections are empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub accounts: Vec<Account>,
    pub usage_events: Vec<RawUsageEvent>,
    pub quotas: Vec<Quota>,
    pub payments: Vec<Payment>,
    pub apps: Vec<App>,
    pub uploads: Vec<Upload>,
    pub connections: Vec<Connection>,
}

// =============================================================================
// Rollups
// =============================================================================

/// Per-domain subscription tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Level {
    pub premium: bool,
    pub plan: Plan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_of_validity: Option<Period>,
}

impl Level {
    #[must_use]
    pub fn free_tier() -> Self {
        Self {
            premium: false,
            plan: Plan::free(),
            payment: None,
            period_of_validity: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Class {
    pub ai: Level,
    pub connect: Level,
}

/// Daily usage buckets for one domain plus precomputed windows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainBills {
    /// Canonical bucket instant to summed amount.
    pub items: BTreeMap<DateTime<Utc>, u64>,
    pub total: u64,
    pub yesterday: u64,
    pub last_week: u64,
    pub last_month: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bills {
    pub ai: DomainBills,
    pub connect: DomainBills,
}

impl Bills {
    #[must_use]
    pub const fn domain(&self, domain: Domain) -> &DomainBills {
        match domain {
            Domain::Ai => &self.ai,
            Domain::Connect => &self.connect,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiUsages {
    pub app: u64,
    pub upload: u64,
    pub knowledge_base: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectUsages {
    pub connection: u64,
}

/// Feature counters, deleted records excluded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usages {
    pub ai: AiUsages,
    pub connect: ConnectUsages,
}

/// A Monday-aligned 7-day window, half-open `[start, end)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Week {
    pub number: u32,
    pub alias: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One account's activity in one week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Retention {
    pub week: Week,
    pub active: bool,
    pub usage: u64,
}

/// An account's weekly retention in both domains, from its creation week on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cohort {
    /// The account's creation week, under its calendar alias.
    pub week: Week,
    pub ai: BTreeMap<String, Retention>,
    pub connect: BTreeMap<String, Retention>,
}

impl Cohort {
    #[must_use]
    pub const fn domain(&self, domain: Domain) -> &BTreeMap<String, Retention> {
        match domain {
            Domain::Ai => &self.ai,
            Domain::Connect => &self.connect,
        }
    }
}

/// The rollup record for one account, keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DerivedStat {
    /// Account identity.
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub email: String,
    pub company_email: String,
    pub phone: String,
    pub country: String,
    pub given_name: String,
    pub family_name: String,
    pub nickname: String,
    pub company_name: String,
    pub industry: String,
    pub class: Class,
    pub bills: Bills,
    pub usages: Usages,
    pub cohort: Cohort,
}

/// Population-level activity for one relative week of a creation cohort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyRetention {
    pub week: Week,
    /// Active accounts over cohort size, e.g. `"33.33%"`.
    pub ratio: String,
    pub usage: u64,
}

/// Retention of every account created in `week`, keyed by the week alias.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyCohortSnapshot {
    pub week: Week,
    pub total_users: u64,
    pub ai_retention: BTreeMap<String, WeeklyRetention>,
    pub connect_retention: BTreeMap<String, WeeklyRetention>,
    pub updated_at: DateTime<Utc>,
}

/// Record of an account being placed in a marketing segment on a given day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentTrack {
    pub account_id: String,
    pub email: String,
    pub tag: String,
    pub count: u64,
    /// Midnight of the day the segment was computed.
    pub time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SegmentTrack {
    /// Natural key: one track per account, tag and day.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.account_id, self.tag, self.time.format("%Y-%m-%d"))
    }
}
