//! Scheduled jobs through the daemon runner.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use ustat::cli::Runtime;
use ustat::cli::daemon::DaemonRunner;
use ustat::core::schedule::{FixedClock, Job, JobRunner, Scheduler, Trigger};
use ustat::storage::{Config, ConfigSources, DocumentStore, ResolvedConfig};
use ustat::test_utils::{FailingStore, seeded_store};

mod common;

use common::fixtures::{at, mixed_population};

fn runtime(store: Arc<dyn DocumentStore>) -> Runtime {
    let mut config = Config::default();
    config.cohort.start_at = "2024-03-04".to_string();
    config.refresh.batch_size = 2;
    Runtime::with_store(
        ResolvedConfig {
            config,
            db_path: ":memory:".into(),
            sources: ConfigSources::default(),
        },
        store,
    )
}

#[tokio::test]
async fn each_job_runs_against_the_store() {
    let store = seeded_store(&mixed_population()).await;
    let runner = DaemonRunner::new(&runtime(store.clone())).unwrap();
    let now = at(2024, 3, 14, 2);

    runner.run_job(Job::Refresh, now).await.unwrap();
    assert_eq!(store.stats_created_since(at(2024, 1, 1, 0)).await.unwrap().len(), 5);

    runner.run_job(Job::CohortSnapshots, now).await.unwrap();
    assert_eq!(store.list_cohort_snapshots().await.unwrap().len(), 2);

    runner.run_job(Job::Alarm, now).await.unwrap();

    // Mailing list is disabled by default: members are tracked, never posted.
    runner.run_job(Job::Marketing, now).await.unwrap();
    assert_eq!(store.list_tracks().await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_refresh_surfaces_as_partial_failure() {
    let inner = seeded_store(&mixed_population()).await;
    let store = Arc::new(FailingStore::new(inner).failing_on("acct-0003"));
    let runner = DaemonRunner::new(&runtime(store)).unwrap();

    let err = runner
        .run_job(Job::Refresh, at(2024, 3, 14, 2))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "USTAT-X010");
}

#[tokio::test]
async fn scheduler_drives_the_runner_on_its_trigger() {
    let store = seeded_store(&mixed_population()).await;
    let runner: Arc<dyn JobRunner> = Arc::new(DaemonRunner::new(&runtime(store.clone())).unwrap());
    let clock = Arc::new(FixedClock::new(at(2024, 3, 14, 1)));
    let scheduler = Scheduler::new(clock.clone()).with_job(Job::Refresh, Trigger::Daily { hour: 1 });
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(scheduler.run(runner, Duration::from_millis(10), rx));
    let mut written = 0;
    for _ in 0..200 {
        written = store.stats_created_since(at(2024, 1, 1, 0)).await.unwrap().len();
        if written == 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(written, 5);
}
