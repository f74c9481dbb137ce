//! Weekly marketing segments.
//!
//! Picks recently created accounts that already use AI credits and pushes
//! them to the mailing list under a segment tag. Each selection is also
//! recorded as a [`SegmentTrack`] so later campaigns can be measured.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::core::models::{DerivedStat, SegmentTrack};
use crate::error::{Result, StatError};
use crate::storage::DocumentStore;
use crate::util::time::midnight;
use crate::webhook::{MailingList, is_valid_email};

/// A marketing segment over freshly created accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    /// Uses AI credits but has no knowledge base yet.
    NoKnowledgeBase,
    /// Has knowledge bases but no paid AI plan.
    HighKnowledgeBase,
}

impl Segment {
    pub const ALL: [Self; 2] = [Self::NoKnowledgeBase, Self::HighKnowledgeBase];

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::NoKnowledgeBase => "no_knowledge_base",
            Self::HighKnowledgeBase => "high_knowledge_base",
        }
    }

    fn admits(self, stat: &DerivedStat) -> bool {
        match self {
            Self::NoKnowledgeBase => stat.usages.ai.knowledge_base == 0,
            Self::HighKnowledgeBase => {
                !stat.class.ai.premium && stat.usages.ai.knowledge_base >= 1
            }
        }
    }

    /// Members of this segment among `stats`, best candidates first.
    #[must_use]
    pub fn select<'a>(self, stats: &'a [DerivedStat], limit: usize) -> Vec<&'a DerivedStat> {
        let mut members: Vec<&DerivedStat> = stats
            .iter()
            .filter(|s| s.bills.ai.total != 0 && self.admits(s))
            .collect();
        match self {
            Self::NoKnowledgeBase => members.sort_by(|a, b| {
                b.bills
                    .ai
                    .last_week
                    .cmp(&a.bills.ai.last_week)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            Self::HighKnowledgeBase => members.sort_by(|a, b| {
                b.usages
                    .ai
                    .knowledge_base
                    .cmp(&a.usages.ai.knowledge_base)
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }
        members.truncate(limit);
        members
    }
}

impl FromStr for Segment {
    type Err = StatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "no_knowledge_base" | "nkb" => Ok(Self::NoKnowledgeBase),
            "high_knowledge_base" | "hkb" => Ok(Self::HighKnowledgeBase),
            other => Err(StatError::ConfigInvalid {
                key: "segment".to_string(),
                value: other.to_string(),
                message: "expected no_knowledge_base or high_knowledge_base".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Per-segment result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SegmentReport {
    pub segment: String,
    pub selected: usize,
    pub tracked: usize,
    pub posted: usize,
    pub invalid_emails: usize,
    pub post_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketingReport {
    pub now: DateTime<Utc>,
    pub dry_run: bool,
    pub segments: Vec<SegmentReport>,
}

/// Runs segment selection and mailing-list sync.
pub struct MarketingSync {
    store: Arc<dyn DocumentStore>,
    list: Arc<dyn MailingList>,
    product_tag: String,
    limit: usize,
}

impl MarketingSync {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        list: Arc<dyn MailingList>,
        product_tag: impl Into<String>,
        limit: usize,
    ) -> Self {
        Self {
            store,
            list,
            product_tag: product_tag.into(),
            limit,
        }
    }

    /// Select, track and post `segments` as of `now`.
    ///
    /// With `dry_run` only the selection is computed.
    ///
    /// # Errors
    /// Propagates the stats read and track writes. Mailing-list failures are
    /// counted and logged, never returned.
    pub async fn run(
        &self,
        segments: &[Segment],
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<MarketingReport> {
        let recent = self
            .store
            .stats_created_since(now - Duration::days(7))
            .await?;
        tracing::info!(candidates = recent.len(), dry_run, "marketing sync started");

        let mut reports = Vec::with_capacity(segments.len());
        for segment in segments {
            let members = segment.select(&recent, self.limit);
            let mut report = SegmentReport {
                segment: segment.tag().to_string(),
                selected: members.len(),
                ..SegmentReport::default()
            };
            if !dry_run {
                for stat in members {
                    self.sync_member(*segment, stat, now, &mut report).await?;
                }
            }
            tracing::info!(
                segment = %segment,
                selected = report.selected,
                posted = report.posted,
                invalid_emails = report.invalid_emails,
                post_failures = report.post_failures,
                "segment synced"
            );
            reports.push(report);
        }

        Ok(MarketingReport {
            now,
            dry_run,
            segments: reports,
        })
    }

    async fn sync_member(
        &self,
        segment: Segment,
        stat: &DerivedStat,
        now: DateTime<Utc>,
        report: &mut SegmentReport,
    ) -> Result<()> {
        let email = if stat.email.is_empty() {
            &stat.company_email
        } else {
            &stat.email
        };

        self.store
            .upsert_track(&SegmentTrack {
                account_id: stat.id.clone(),
                email: email.clone(),
                tag: segment.tag().to_string(),
                count: 0,
                time: midnight(now),
                updated_at: Utc::now(),
            })
            .await?;
        report.tracked += 1;

        if !is_valid_email(email) {
            tracing::warn!(account = %stat.id, email = %email, "skipping invalid email");
            report.invalid_emails += 1;
            return Ok(());
        }

        let tags = [self.product_tag.clone(), segment.tag().to_string()];
        match self.list.add_member(email, &tags).await {
            Ok(true) => report.posted += 1,
            Ok(false) => {}
            Err(err) => {
                tracing::error!(
                    account = %stat.id,
                    code = err.error_code(),
                    error = %err,
                    "mailing list call failed"
                );
                report.post_failures += 1;
            }
        }
        Ok(())
    }
}
