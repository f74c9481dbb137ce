//! Scenario datasets for integration tests.
//!
//! Factories for single documents live in `ustat::test_utils`; this module
//! composes them into whole populations.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};

pub use ustat::core::domain::Domain;
pub use ustat::core::models::{Account, Dataset, DerivedStat, RawUsageEvent};
pub use ustat::test_utils::{
    at, make_test_account, make_test_app, make_test_connection, make_test_event,
    make_test_payment, make_test_population, make_test_quota, make_test_upload,
};

/// Monday 2024-03-11 02:00 UTC, the instant most scenarios are evaluated at.
#[must_use]
pub fn evaluation_time() -> DateTime<Utc> {
    at(2024, 3, 11, 2)
}

/// Population-level usage for the alarm: `yesterday` units on Mar 9 and
/// `today` units on Mar 10, split across two accounts.
///
/// Connect events are stamped at the following midnight; AI events mid-day.
#[must_use]
pub fn daily_usage_dataset(domain: Domain, yesterday: u64, today: u64) -> Dataset {
    let stamp = |day: DateTime<Utc>| match domain {
        Domain::Connect => day + Duration::days(1),
        Domain::Ai => day + Duration::hours(12),
    };
    let mut events = Vec::new();
    for (label, day, total) in [
        ("y", at(2024, 3, 9, 0), yesterday),
        ("t", at(2024, 3, 10, 0), today),
    ] {
        let first = total / 2;
        for (account, amount) in [("acct-a", first), ("acct-b", total - first)] {
            if amount > 0 {
                events.push(make_test_event(
                    &format!("{label}-{account}"),
                    account,
                    domain,
                    stamp(day),
                    amount,
                ));
            }
        }
    }
    Dataset {
        accounts: vec![
            make_test_account("acct-a", at(2024, 1, 1, 9)),
            make_test_account("acct-b", at(2024, 1, 2, 9)),
        ],
        usage_events: events,
        ..Dataset::default()
    }
}

/// Five accounts across two creation weeks with a mix of usage, plans and
/// feature records.
///
/// - `acct-0000`..`acct-0002` created in the week of March 4, 2024
/// - `acct-0003`, `acct-0004` created in the week of March 11, 2024
/// - `acct-0000` has a paid AI quota and payment, two apps sharing a
///   knowledge base, one deleted upload and one live one
/// - `acct-0001` uses Connect and has one connection
/// - `acct-0002` never used anything
#[must_use]
pub fn mixed_population() -> Dataset {
    let mut accounts = make_test_population(3, at(2024, 3, 4, 9));
    accounts.extend([
        make_test_account("acct-0003", at(2024, 3, 11, 1)),
        make_test_account("acct-0004", at(2024, 3, 12, 8)),
    ]);

    let mut deleted = make_test_upload("up-2", "acct-0000");
    deleted.status = "deleted".to_string();

    Dataset {
        accounts,
        usage_events: vec![
            make_test_event("e1", "acct-0000", Domain::Ai, at(2024, 3, 5, 10), 30),
            make_test_event("e2", "acct-0000", Domain::Ai, at(2024, 3, 12, 10), 12),
            make_test_event("e3", "acct-0001", Domain::Connect, at(2024, 3, 6, 0), 400),
            make_test_event("e4", "acct-0003", Domain::Ai, at(2024, 3, 12, 10), 7),
            make_test_event("e5", "acct-0004", Domain::Ai, at(2024, 3, 13, 15), 1),
        ],
        quotas: vec![make_test_quota(
            "q1",
            "acct-0000",
            "ai",
            at(2024, 3, 1, 0),
            at(2024, 4, 1, 0),
        )],
        payments: vec![make_test_payment("p1", "acct-0000", "ai", at(2024, 3, 1, 0))],
        apps: vec![
            make_test_app("app-1", "acct-0000", &["kb-1", "kb-2"]),
            make_test_app("app-2", "acct-0000", &["kb-2"]),
        ],
        uploads: vec![make_test_upload("up-1", "acct-0000"), deleted],
        connections: vec![make_test_connection("conn-1", "acct-0001")],
    }
}

/// Write `dataset` as an import file under `dir`.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_import_file(dir: &std::path::Path, dataset: &Dataset) -> PathBuf {
    let path = dir.join("import.json");
    let body = serde_json::to_string_pretty(dataset).expect("serialize dataset");
    std::fs::write(&path, body).expect("write import file");
    path
}

/// Zero the write stamp so two passes over the same inputs compare equal.
#[must_use]
pub fn without_write_stamp(mut stat: DerivedStat) -> DerivedStat {
    stat.updated_at = DateTime::<Utc>::UNIX_EPOCH;
    stat
}
