//! `ustat daemon`: run the scheduled jobs until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::cli::runtime::Runtime;
use crate::core::alarm::AlarmDetector;
use crate::core::cohort::CohortSnapshotter;
use crate::core::marketing::{MarketingSync, Segment};
use crate::core::refresh::RefreshEngine;
use crate::core::schedule::{Job, JobRunner, Scheduler, SystemClock, Trigger};
use crate::error::{Result, StatError};
use crate::storage::config::ScheduleConfig;

/// Runs each [`Job`] with engines built once at startup.
pub struct DaemonRunner {
    refresh: RefreshEngine,
    cohort: CohortSnapshotter,
    alarm: AlarmDetector,
    marketing: MarketingSync,
}

impl DaemonRunner {
    /// # Errors
    /// Returns configuration or HTTP client errors from the engine builders.
    pub fn new(runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            refresh: runtime.refresh_engine(),
            cohort: runtime.snapshotter()?,
            alarm: runtime.alarm_detector()?,
            marketing: runtime.marketing_sync()?,
        })
    }
}

#[async_trait]
impl JobRunner for DaemonRunner {
    async fn run_job(&self, job: Job, now: DateTime<Utc>) -> Result<()> {
        match job {
            Job::Refresh => self.refresh.run_pass(now).await?.into_result().map(|_| ()),
            Job::CohortSnapshots => {
                let report = self.cohort.run(now).await;
                if report.is_complete() {
                    Ok(())
                } else {
                    Err(StatError::PartialFailure {
                        failed: report.failures.len(),
                    })
                }
            }
            Job::Alarm => {
                for (_, outcome) in self.alarm.check_all(now).await {
                    outcome?;
                }
                Ok(())
            }
            Job::Marketing => self
                .marketing
                .run(&Segment::ALL, now, false)
                .await
                .map(|_| ()),
        }
    }
}

/// Scheduler with the configured triggers. Marketing is registered only
/// when the mailing list is enabled.
///
/// # Errors
/// Returns `ConfigInvalid` for an unknown weekday.
pub fn build_scheduler(schedule: &ScheduleConfig, marketing_enabled: bool) -> Result<Scheduler> {
    let mut scheduler = Scheduler::new(Arc::new(SystemClock))
        .with_job(
            Job::Refresh,
            Trigger::Daily {
                hour: schedule.refresh_hour,
            },
        )
        .with_job(
            Job::CohortSnapshots,
            Trigger::Weekly {
                weekday: schedule.cohort_weekday()?,
                hour: schedule.cohort_hour,
            },
        )
        .with_job(
            Job::Alarm,
            Trigger::Daily {
                hour: schedule.alarm_hour,
            },
        );
    if marketing_enabled {
        scheduler = scheduler.with_job(
            Job::Marketing,
            Trigger::Weekly {
                weekday: schedule.marketing_weekday()?,
                hour: schedule.marketing_hour,
            },
        );
    }
    Ok(scheduler)
}

/// # Errors
/// Returns an error if the engines or the scheduler cannot be built.
pub async fn execute(runtime: &Runtime) -> Result<()> {
    let settings = &runtime.config.config;
    let runner: Arc<dyn JobRunner> = Arc::new(DaemonRunner::new(runtime)?);
    let scheduler = build_scheduler(&settings.schedule, settings.marketing.enabled)?;
    let tick = Duration::from_secs(settings.schedule.tick_seconds);

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(err) => tracing::error!(error = %err, "cannot listen for interrupt"),
        }
        let _ = tx.send(true);
    });

    scheduler.run(runner, tick, rx).await;
    Ok(())
}
