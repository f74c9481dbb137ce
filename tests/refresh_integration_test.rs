//! Refresh pass against a real SQLite store.
//!
//! Covers:
//! - Stat contents for a mixed population
//! - Idempotence of repeated passes
//! - Contiguous, complete partitioning at several batch sizes
//! - Isolation of failing and panicking accounts
//! - Cache invalidation between passes

use std::sync::Arc;

use ustat::core::aggregator::AppSummaryCache;
use ustat::core::cache::ReadThroughCache;
use ustat::core::refresh::{RefreshEngine, RefreshOptions};
use ustat::storage::{DocumentStore, Lookup};
use ustat::test_utils::{FailingStore, make_test_app, seeded_store};

mod common;

use common::fixtures::{at, mixed_population, without_write_stamp};
use common::logger::TestLogger;

fn engine(store: Arc<dyn DocumentStore>, batch_size: u64, max_workers: usize) -> RefreshEngine {
    let cache: Arc<AppSummaryCache> = Arc::new(ReadThroughCache::new(
        ustat::core::cache::DEFAULT_TTL,
        1_000,
    ));
    RefreshEngine::new(
        store,
        cache,
        RefreshOptions {
            batch_size,
            max_workers,
        },
    )
}

async fn stat(store: &dyn DocumentStore, id: &str) -> ustat::core::models::DerivedStat {
    match store.get_stat(id).await.unwrap() {
        Lookup::Found(stat) => stat,
        Lookup::NotFound => panic!("no stat for {id}"),
    }
}

#[tokio::test]
async fn pass_builds_expected_rollups() {
    let log = TestLogger::new("pass_builds_expected_rollups");
    log.phase("setup");
    let store = seeded_store(&mixed_population()).await;
    let now = at(2024, 3, 14, 0);

    log.phase("execute");
    let report = engine(store.clone(), 2, 2).run_pass(now).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.population, 5);
    assert_eq!(report.refreshed(), 5);

    log.phase("verify");
    let paid = stat(store.as_ref(), "acct-0000").await;
    assert_eq!(paid.bills.ai.total, 42);
    assert_eq!(paid.bills.ai.last_week, 12);
    assert_eq!(paid.bills.ai.last_month, 42);
    assert_eq!(paid.bills.ai.yesterday, 0);
    assert_eq!(paid.bills.ai.items.get(&at(2024, 3, 5, 0)), Some(&30));
    assert!(paid.class.ai.premium);
    assert_eq!(paid.class.ai.plan.plan_type, "Pro");
    assert!(!paid.class.connect.premium);
    assert_eq!(paid.class.connect.plan.plan_type, "Free");
    assert_eq!(paid.usages.ai.app, 2);
    assert_eq!(paid.usages.ai.knowledge_base, 2);
    assert_eq!(paid.usages.ai.upload, 1);
    assert_eq!(paid.cohort.week.alias, "March 4, 2024");
    assert_eq!(paid.cohort.ai["week 00"].usage, 30);
    assert_eq!(paid.cohort.ai["week 01"].usage, 12);

    let connect = stat(store.as_ref(), "acct-0001").await;
    assert_eq!(connect.bills.connect.items.get(&at(2024, 3, 5, 0)), Some(&400));
    assert!(connect.cohort.connect["week 00"].active);
    assert_eq!(connect.usages.connect.connection, 1);

    let idle = stat(store.as_ref(), "acct-0002").await;
    assert_eq!(idle.bills.ai.total, 0);
    assert!(idle.cohort.ai.values().all(|r| !r.active));

    let recent = stat(store.as_ref(), "acct-0004").await;
    assert_eq!(recent.bills.ai.yesterday, 1);
    assert_eq!(recent.cohort.week.alias, "March 11, 2024");

    log.finish_ok();
}

#[tokio::test]
async fn repeated_passes_are_idempotent() {
    let store = seeded_store(&mixed_population()).await;
    let now = at(2024, 3, 14, 0);
    let refresh = engine(store.clone(), 3, 4);

    refresh.run_pass(now).await.unwrap();
    let first = without_write_stamp(stat(store.as_ref(), "acct-0000").await);
    refresh.run_pass(now).await.unwrap();
    let second = without_write_stamp(stat(store.as_ref(), "acct-0000").await);

    assert_eq!(first, second);
    let recent = store.stats_created_since(at(2024, 1, 1, 0)).await.unwrap();
    assert_eq!(recent.len(), 5, "upserts must not duplicate stats");
}

#[tokio::test]
async fn every_batch_size_covers_the_population_once() {
    for batch_size in [1, 2, 3, 4, 5, 6, 100] {
        let store = seeded_store(&mixed_population()).await;
        let report = engine(store.clone(), batch_size, 3)
            .run_pass(at(2024, 3, 14, 0))
            .await
            .unwrap();

        let ranges: Vec<_> = report.ranges.iter().map(|r| r.range).collect();
        assert_eq!(ranges.first().map(|r| r.start), Some(0));
        assert_eq!(ranges.last().map(|r| r.end), Some(5));
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "batch {batch_size}");
        }
        assert_eq!(
            report.ranges.iter().map(|r| r.processed).sum::<u64>(),
            5,
            "batch {batch_size}"
        );
        assert_eq!(report.refreshed(), 5);
    }
}

#[tokio::test]
async fn failing_account_does_not_stop_its_range() {
    let inner = seeded_store(&mixed_population()).await;
    let store = Arc::new(FailingStore::new(inner.clone()).failing_on("acct-0001"));

    let report = engine(store, 5, 1).run_pass(at(2024, 3, 14, 0)).await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.failed_accounts(), 1);
    assert_eq!(report.refreshed(), 4);
    assert_eq!(report.ranges[0].failures[0].account_id, "acct-0001");
    assert_eq!(report.ranges[0].failures[0].code, "USTAT-S001");
    assert!(matches!(inner.get_stat("acct-0001").await.unwrap(), Lookup::NotFound));
    assert!(inner.get_stat("acct-0002").await.unwrap().is_found());

    let err = report.into_result().unwrap_err();
    assert_eq!(err.exit_code(), ustat::ExitCode::PartialFailure);
}

#[tokio::test]
async fn panicking_range_leaves_siblings_intact() {
    let inner = seeded_store(&mixed_population()).await;
    let store = Arc::new(FailingStore::new(inner.clone()).panicking_on("acct-0000"));

    let report = engine(store, 2, 2).run_pass(at(2024, 3, 14, 0)).await.unwrap();

    assert_eq!(report.ranges.len(), 3);
    assert!(report.ranges[0].error.is_some());
    assert!(report.ranges[1].is_clean());
    assert!(report.ranges[2].is_clean());
    assert_eq!(report.failed_ranges(), 1);
    for id in ["acct-0002", "acct-0003", "acct-0004"] {
        assert!(inner.get_stat(id).await.unwrap().is_found(), "{id}");
    }
}

#[tokio::test]
async fn uncountable_population_fails_the_pass() {
    let inner = seeded_store(&mixed_population()).await;
    let store = Arc::new(FailingStore::new(inner).failing_count());
    let err = engine(store, 2, 2)
        .run_pass(at(2024, 3, 14, 0))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "USTAT-S001");
}

#[tokio::test]
async fn new_pass_sees_apps_added_since_the_last() {
    let store = seeded_store(&mixed_population()).await;
    let refresh = engine(store.clone(), 5, 1);
    let now = at(2024, 3, 14, 0);

    refresh.run_pass(now).await.unwrap();
    assert_eq!(stat(store.as_ref(), "acct-0002").await.usages.ai.knowledge_base, 0);

    store
        .import(&ustat::core::models::Dataset {
            apps: vec![make_test_app("app-9", "acct-0002", &["kb-9"])],
            ..Default::default()
        })
        .await
        .unwrap();
    refresh.run_pass(now).await.unwrap();

    let updated = stat(store.as_ref(), "acct-0002").await;
    assert_eq!(updated.usages.ai.app, 1);
    assert_eq!(updated.usages.ai.knowledge_base, 1);
}
