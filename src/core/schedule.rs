//! Periodic job scheduling.
//!
//! Triggers are pure predicates over an instant, and "now" comes from an
//! injectable [`Clock`], so trigger behaviour is testable without waiting on
//! the wall clock. The daemon loop ticks on an interval and runs every job
//! whose trigger matches the current hour, at most once per hour.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, DurationRound, TimeDelta, Timelike, Utc, Weekday};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::Result;

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// When a job fires. Hours are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trigger {
    Daily { hour: u32 },
    Weekly { weekday: Weekday, hour: u32 },
}

impl Trigger {
    #[must_use]
    pub fn fires_at(&self, now: DateTime<Utc>) -> bool {
        match *self {
            Self::Daily { hour } => now.hour() == hour,
            Self::Weekly { weekday, hour } => now.weekday() == weekday && now.hour() == hour,
        }
    }
}

/// Jobs the daemon knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    Refresh,
    CohortSnapshots,
    Alarm,
    Marketing,
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Refresh => "refresh",
            Self::CohortSnapshots => "cohort",
            Self::Alarm => "alarm",
            Self::Marketing => "marketing",
        };
        f.write_str(name)
    }
}

/// Executes jobs on behalf of the scheduler.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, job: Job, now: DateTime<Utc>) -> Result<()>;
}

pub struct Scheduler {
    clock: Arc<dyn Clock>,
    entries: Vec<(Job, Trigger)>,
    last_fired: HashMap<Job, DateTime<Utc>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Vec::new(),
            last_fired: HashMap::new(),
        }
    }

    /// Register `job`. Jobs due in the same tick run in registration order.
    #[must_use]
    pub fn with_job(mut self, job: Job, trigger: Trigger) -> Self {
        self.entries.push((job, trigger));
        self
    }

    /// Jobs whose trigger matches `now` and that have not run in `now`'s hour.
    /// Returned jobs are marked as fired.
    pub fn due_jobs(&mut self, now: DateTime<Utc>) -> Vec<Job> {
        let hour = now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now);
        let mut due = Vec::new();
        for (job, trigger) in &self.entries {
            if !trigger.fires_at(now) || self.last_fired.get(job) == Some(&hour) {
                continue;
            }
            self.last_fired.insert(*job, hour);
            due.push(*job);
        }
        due
    }

    /// Tick every `tick` until `shutdown` turns true, running due jobs.
    ///
    /// A failing job is logged; the loop keeps going.
    pub async fn run(
        mut self,
        runner: Arc<dyn JobRunner>,
        tick: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(jobs = self.entries.len(), tick_secs = tick.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = self.clock.now();
                    for job in self.due_jobs(now) {
                        tracing::info!(%job, %now, "job started");
                        match runner.run_job(job, now).await {
                            Ok(()) => tracing::info!(%job, "job finished"),
                            Err(err) => tracing::error!(%job, code = err.error_code(), error = %err, "job failed"),
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("scheduler stopped");
    }
}
