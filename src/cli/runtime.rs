//! Wiring shared by every command: resolved config, the opened store, and
//! builders for the engines.

use std::sync::Arc;

use crate::core::aggregator::AppSummaryCache;
use crate::core::alarm::AlarmDetector;
use crate::core::cache::ReadThroughCache;
use crate::core::cohort::CohortSnapshotter;
use crate::core::marketing::MarketingSync;
use crate::core::refresh::{RefreshEngine, RefreshOptions};
use crate::error::Result;
use crate::storage::{CliOverrides, DocumentStore, ResolvedConfig, SqliteStore};
use crate::webhook::{
    AlarmNotifier, DisabledMailingList, LogOnlyNotifier, MailingList, WebhookAlarmNotifier,
    WebhookMailingList,
};

pub struct Runtime {
    pub config: ResolvedConfig,
    pub store: Arc<dyn DocumentStore>,
}

impl Runtime {
    /// Resolve configuration and open the store it names.
    ///
    /// # Errors
    /// Returns configuration errors, or a storage error if the store cannot
    /// be opened or migrated.
    pub fn open(overrides: &CliOverrides) -> Result<Self> {
        let config = ResolvedConfig::resolve(overrides)?;
        tracing::debug!(
            db = %config.db_path.display(),
            db_source = %config.sources.db_path,
            batch_size = config.config.refresh.batch_size,
            batch_source = %config.sources.batch_size,
            max_workers = config.config.refresh.max_workers,
            workers_source = %config.sources.max_workers,
            "configuration resolved"
        );
        let store = SqliteStore::open(&config.db_path)?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Use an already opened store.
    #[must_use]
    pub fn with_store(config: ResolvedConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self { config, store }
    }

    #[must_use]
    pub fn refresh_engine(&self) -> RefreshEngine {
        let settings = &self.config.config;
        let cache: Arc<AppSummaryCache> = Arc::new(ReadThroughCache::new(
            settings.cache.ttl(),
            settings.cache.max_entries,
        ));
        RefreshEngine::new(
            Arc::clone(&self.store),
            cache,
            RefreshOptions {
                batch_size: settings.refresh.batch_size,
                max_workers: settings.refresh.max_workers,
            },
        )
    }

    /// # Errors
    /// Returns `ConfigInvalid` for an unparsable `cohort.start_at`.
    pub fn snapshotter(&self) -> Result<CohortSnapshotter> {
        let settings = &self.config.config;
        Ok(CohortSnapshotter::new(
            Arc::clone(&self.store),
            settings.cohort.start()?,
            settings.refresh.max_workers,
        ))
    }

    /// # Errors
    /// Returns an error if the webhook HTTP client cannot be built.
    pub fn alarm_detector(&self) -> Result<AlarmDetector> {
        let alarm = &self.config.config.alarm;
        let notifier: Arc<dyn AlarmNotifier> = match &alarm.webhook_url {
            Some(url) => Arc::new(WebhookAlarmNotifier::new(url.clone(), alarm.timeout())?),
            None => {
                tracing::debug!("no alarm webhook configured, alarms are only logged");
                Arc::new(LogOnlyNotifier)
            }
        };
        Ok(AlarmDetector::new(
            Arc::clone(&self.store),
            notifier,
            alarm.threshold_percent,
        ))
    }

    /// # Errors
    /// Returns an error if the webhook HTTP client cannot be built.
    pub fn marketing_sync(&self) -> Result<MarketingSync> {
        let marketing = &self.config.config.marketing;
        let list: Arc<dyn MailingList> = match (&marketing.webhook_url, marketing.enabled) {
            (Some(url), true) => {
                Arc::new(WebhookMailingList::new(url.clone(), marketing.timeout())?)
            }
            _ => {
                tracing::debug!("mailing list disabled, segments are tracked only");
                Arc::new(DisabledMailingList)
            }
        };
        Ok(MarketingSync::new(
            Arc::clone(&self.store),
            list,
            marketing.product_tag.clone(),
            marketing.segment_limit,
        ))
    }
}
