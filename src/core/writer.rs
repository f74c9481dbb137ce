//! Idempotent rollup writer.
//!
//! Every write is a whole-document replace keyed by account id (stats) or
//! week alias (cohort snapshots). Apart from `updated_at`, the stored
//! document is exactly what the caller computed, so re-running a pass over
//! unchanged inputs leaves the same documents behind.

use std::sync::Arc;

use chrono::Utc;

use crate::core::models::{DerivedStat, WeeklyCohortSnapshot};
use crate::error::Result;
use crate::storage::DocumentStore;

#[derive(Clone)]
pub struct Writer {
    store: Arc<dyn DocumentStore>,
}

impl Writer {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Stamp `updated_at` and replace the stored stat for `stat.id`.
    ///
    /// # Errors
    /// Returns `Write` when the store rejects the upsert.
    pub async fn write_stat(&self, mut stat: DerivedStat) -> Result<DerivedStat> {
        stat.updated_at = Utc::now();
        self.store.upsert_stat(&stat).await?;
        tracing::trace!(account = %stat.id, "stat written");
        Ok(stat)
    }

    /// Stamp `updated_at` and replace the stored snapshot for its week alias.
    ///
    /// # Errors
    /// Returns `Write` when the store rejects the upsert.
    pub async fn write_snapshot(
        &self,
        mut snapshot: WeeklyCohortSnapshot,
    ) -> Result<WeeklyCohortSnapshot> {
        snapshot.updated_at = Utc::now();
        self.store.upsert_cohort_snapshot(&snapshot).await?;
        tracing::trace!(week = %snapshot.week.alias, "cohort snapshot written");
        Ok(snapshot)
    }
}
