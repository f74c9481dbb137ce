//! Population cohort snapshots built from refreshed stats.

use std::sync::Arc;

use ustat::core::aggregator::AppSummaryCache;
use ustat::core::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL, ReadThroughCache};
use ustat::core::cohort::CohortSnapshotter;
use ustat::core::refresh::{RefreshEngine, RefreshOptions};
use ustat::storage::{DocumentStore, Lookup};
use ustat::core::models::Dataset;
use ustat::test_utils::{make_test_account, seeded_store};

mod common;

use common::fixtures::{at, mixed_population};
use common::logger::TestLogger;

async fn refreshed_store() -> Arc<ustat::storage::SqliteStore> {
    let store = seeded_store(&mixed_population()).await;
    let cache: Arc<AppSummaryCache> = Arc::new(ReadThroughCache::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES));
    RefreshEngine::new(
        store.clone(),
        cache,
        RefreshOptions {
            batch_size: 2,
            max_workers: 2,
        },
    )
    .run_pass(at(2024, 3, 14, 0))
    .await
    .unwrap();
    store
}

#[tokio::test]
async fn snapshots_cover_every_creation_week() {
    let log = TestLogger::new("snapshots_cover_every_creation_week");
    let store = refreshed_store().await;
    let snapshotter = CohortSnapshotter::new(store.clone(), at(2024, 3, 4, 0), 2);

    log.phase("execute");
    let report = snapshotter.run(at(2024, 3, 14, 0)).await;
    assert!(report.is_complete());
    assert_eq!(report.weeks, 2);
    assert_eq!(report.written, 2);

    log.phase("verify");
    let snapshots = store.list_cohort_snapshots().await.unwrap();
    let aliases: Vec<_> = snapshots.iter().map(|s| s.week.alias.as_str()).collect();
    assert_eq!(aliases, vec!["March 4, 2024", "March 11, 2024"]);
    let covered: u64 = snapshots.iter().map(|s| s.total_users).sum();
    assert_eq!(covered, store.count_accounts().await.unwrap());

    let first = &snapshots[0];
    assert_eq!(first.total_users, 3);
    assert_eq!(first.ai_retention["week 00"].ratio, "33.33%");
    assert_eq!(first.ai_retention["week 00"].usage, 30);
    assert_eq!(first.ai_retention["week 01"].ratio, "33.33%");
    assert_eq!(first.connect_retention["week 00"].ratio, "33.33%");
    assert_eq!(first.connect_retention["week 01"].ratio, "0.00%");

    let second = &snapshots[1];
    assert_eq!(second.total_users, 2);
    assert_eq!(second.ai_retention["week 00"].ratio, "100.00%");
    assert_eq!(second.ai_retention["week 00"].usage, 8);
    log.finish_ok();
}

#[tokio::test]
async fn single_week_run_replaces_its_snapshot() {
    let store = refreshed_store().await;
    let snapshotter = CohortSnapshotter::new(store.clone(), at(2024, 3, 4, 0), 1);

    let first = snapshotter.run_week(at(2024, 3, 6, 12)).await.unwrap();
    let second = snapshotter.run_week(at(2024, 3, 8, 0)).await.unwrap();
    assert_eq!(first.week.alias, "March 4, 2024");
    assert_eq!(first.week, second.week);
    assert_eq!(first.ai_retention, second.ai_retention);
    assert_eq!(store.list_cohort_snapshots().await.unwrap().len(), 1);
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
async fn empty_week_has_zero_ratios() {
    let store = refreshed_store().await;
    let snapshotter = CohortSnapshotter::new(store.clone(), at(2024, 2, 26, 0), 1);

    let empty = snapshotter.run_week(at(2024, 2, 27, 0)).await.unwrap();
    assert_eq!(empty.total_users, 0);
    assert!(empty.ai_retention.is_empty());
    let Lookup::Found(stored) = store.get_cohort_snapshot("February 26, 2024").await.unwrap() else {
        panic!("empty week must still be written");
    };
    assert_eq!(stored.total_users, 0);
}

#[tokio::test]
async fn members_without_stats_count_as_inactive() {
    let store = seeded_store(&mixed_population()).await;
    let snapshotter = CohortSnapshotter::new(store.clone(), at(2024, 3, 4, 0), 1);

    let snapshot = snapshotter.run_week(at(2024, 3, 4, 0)).await.unwrap();
    assert_eq!(snapshot.total_users, 3);
    assert!(snapshot.ai_retention.is_empty());
}

#[tokio::test]
async fn week_membership_is_half_open() {
    let store = seeded_store(&Dataset {
        accounts: vec![
            make_test_account("on-monday", at(2024, 3, 4, 0)),
            make_test_account("next-monday", at(2024, 3, 11, 0)),
        ],
        ..Dataset::default()
    })
    .await;
    let snapshotter = CohortSnapshotter::new(store.clone(), at(2024, 3, 4, 0), 2);

    let report = snapshotter.run(at(2024, 3, 14, 0)).await;
    assert!(report.is_complete());

    let first = store.get_cohort_snapshot("March 4, 2024").await.unwrap();
    let second = store.get_cohort_snapshot("March 11, 2024").await.unwrap();
    let (Lookup::Found(first), Lookup::Found(second)) = (first, second) else {
        panic!("both creation weeks should be snapshotted");
    };
    assert_eq!(first.total_users, 1, "an account created at week start belongs to that week");
    assert_eq!(second.total_users, 1, "week end is exclusive");
}
