//! `SQLite`-backed document store.
//!
//! Documents are stored as JSON text next to the handful of columns the
//! engine filters or orders on. Timestamps in key columns use a fixed-width
//! RFC 3339 form so that text comparison matches time order.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Params, params};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::core::domain::Domain;
use crate::core::models::{
    Account, App, Dataset, DerivedStat, Payment, Quota, RawUsageEvent, SegmentTrack,
    WeeklyCohortSnapshot,
};
use crate::error::{Result, StatError};
use crate::storage::schema::run_migrations;
use crate::storage::store::{DocumentStore, ImportSummary, Lookup, collections};

/// Document store over a single `SQLite` connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at `path`, creating parent directories and
    /// applying pending migrations.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created, the database
    /// cannot be opened, or a migration fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(path)
            .map_err(|e| StatError::Storage(format!("open {}: {e}", path.display())))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| StatError::Storage(format!("enable WAL: {e}")))?;
        let version = run_migrations(&mut conn)?;

        tracing::debug!(path = %path.display(), schema_version = version, "opened document store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a fresh in-memory store.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created or migrated.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| StatError::Storage(format!("open in-memory: {e}")))?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Run a query whose first two columns are `(key, doc)` and decode every doc.
fn query_docs<T: DeserializeOwned>(
    conn: &Connection,
    collection: &str,
    sql: &str,
    params: impl Params,
) -> Result<Vec<T>> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| StatError::query(collection, e))?;
    let rows = stmt
        .query_map(params, |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| StatError::query(collection, e))?;

    let mut docs = Vec::new();
    for row in rows {
        let (key, doc) = row.map_err(|e| StatError::query(collection, e))?;
        let decoded =
            serde_json::from_str(&doc).map_err(|e| StatError::decode(collection, &key, e))?;
        docs.push(decoded);
    }
    Ok(docs)
}

fn query_one<T: DeserializeOwned>(
    conn: &Connection,
    collection: &str,
    sql: &str,
    params: impl Params,
) -> Result<Lookup<T>> {
    let docs: Vec<T> = query_docs(conn, collection, sql, params)?;
    Ok(docs.into_iter().next().into())
}

fn count(conn: &Connection, collection: &str, sql: &str, params: impl Params) -> Result<u64> {
    let n: i64 = conn
        .query_row(sql, params, |row| row.get(0))
        .map_err(|e| StatError::query(collection, e))?;
    Ok(u64::try_from(n).unwrap_or_default())
}

fn payment_key(payment: &Payment) -> String {
    if payment.id.is_empty() {
        format!(
            "{}:{}:{}",
            payment.account_id,
            payment.kind,
            payment.created_at.map(ts).unwrap_or_default()
        )
    } else {
        payment.id.clone()
    }
}

fn import_into(conn: &Connection, dataset: &Dataset) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for account in &dataset.accounts {
        conn.execute(
            "INSERT OR REPLACE INTO accounts (id, created_at, doc) VALUES (?1, ?2, ?3)",
            params![account.id, ts(account.created_at), serde_json::to_string(account)?],
        )
        .map_err(|e| StatError::write(collections::ACCOUNTS, &account.id, e))?;
        summary.accounts += 1;
    }

    for event in &dataset.usage_events {
        conn.execute(
            "INSERT OR REPLACE INTO usage_events (id, account_id, domain, collected_at, doc) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id,
                event.account_id,
                event.domain.cli_name(),
                ts(event.collected_at),
                serde_json::to_string(event)?
            ],
        )
        .map_err(|e| StatError::write(collections::USAGE_EVENTS, &event.id, e))?;
        summary.usage_events += 1;
    }

    for quota in &dataset.quotas {
        conn.execute(
            "INSERT OR REPLACE INTO quotas (id, account_id, kind, valid_from, valid_to, doc) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                quota.id,
                quota.account_id,
                quota.kind,
                ts(quota.period_of_validity.start),
                ts(quota.period_of_validity.end),
                serde_json::to_string(quota)?
            ],
        )
        .map_err(|e| StatError::write(collections::QUOTAS, &quota.id, e))?;
        summary.quotas += 1;
    }

    for payment in &dataset.payments {
        let key = payment_key(payment);
        conn.execute(
            "INSERT OR REPLACE INTO payments (id, account_id, kind, created_at, doc) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key,
                payment.account_id,
                payment.kind,
                payment.created_at.map(ts).unwrap_or_default(),
                serde_json::to_string(payment)?
            ],
        )
        .map_err(|e| StatError::write(collections::PAYMENTS, &key, e))?;
        summary.payments += 1;
    }

    for app in &dataset.apps {
        conn.execute(
            "INSERT OR REPLACE INTO apps (id, account_id, status, doc) VALUES (?1, ?2, ?3, ?4)",
            params![app.id, app.account_id, app.status, serde_json::to_string(app)?],
        )
        .map_err(|e| StatError::write(collections::APPS, &app.id, e))?;
        summary.apps += 1;
    }

    for upload in &dataset.uploads {
        conn.execute(
            "INSERT OR REPLACE INTO uploads (id, account_id, status, doc) VALUES (?1, ?2, ?3, ?4)",
            params![upload.id, upload.account_id, upload.status, serde_json::to_string(upload)?],
        )
        .map_err(|e| StatError::write(collections::UPLOADS, &upload.id, e))?;
        summary.uploads += 1;
    }

    for connection in &dataset.connections {
        conn.execute(
            "INSERT OR REPLACE INTO connections (id, account_id, status, doc) VALUES (?1, ?2, ?3, ?4)",
            params![
                connection.id,
                connection.account_id,
                connection.status,
                serde_json::to_string(connection)?
            ],
        )
        .map_err(|e| StatError::write(collections::CONNECTIONS, &connection.id, e))?;
        summary.connections += 1;
    }

    Ok(summary)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn count_accounts(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        count(&conn, collections::ACCOUNTS, "SELECT COUNT(*) FROM accounts", [])
    }

    async fn list_accounts(&self, skip: u64, limit: u64) -> Result<Vec<Account>> {
        let conn = self.conn.lock().await;
        query_docs(
            &conn,
            collections::ACCOUNTS,
            "SELECT id, doc FROM accounts ORDER BY created_at, id LIMIT ?1 OFFSET ?2",
            params![to_i64(limit), to_i64(skip)],
        )
    }

    async fn accounts_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Account>> {
        let conn = self.conn.lock().await;
        query_docs(
            &conn,
            collections::ACCOUNTS,
            "SELECT id, doc FROM accounts WHERE created_at >= ?1 AND created_at < ?2 \
             ORDER BY created_at, id",
            params![ts(start), ts(end)],
        )
    }

    async fn usage_events(&self, account_id: &str, domain: Domain) -> Result<Vec<RawUsageEvent>> {
        let conn = self.conn.lock().await;
        query_docs(
            &conn,
            collections::USAGE_EVENTS,
            "SELECT id, doc FROM usage_events WHERE account_id = ?1 AND domain = ?2 \
             ORDER BY collected_at, id",
            params![account_id, domain.cli_name()],
        )
    }

    async fn population_usage(
        &self,
        domain: Domain,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawUsageEvent>> {
        let conn = self.conn.lock().await;
        query_docs(
            &conn,
            collections::USAGE_EVENTS,
            "SELECT id, doc FROM usage_events \
             WHERE domain = ?1 AND collected_at >= ?2 AND collected_at < ?3 \
             ORDER BY collected_at, id",
            params![domain.cli_name(), ts(from), ts(to)],
        )
    }

    async fn active_quota(
        &self,
        account_id: &str,
        kind: &str,
        now: DateTime<Utc>,
    ) -> Result<Lookup<Quota>> {
        let conn = self.conn.lock().await;
        query_one(
            &conn,
            collections::QUOTAS,
            "SELECT id, doc FROM quotas \
             WHERE account_id = ?1 AND kind = ?2 AND valid_from <= ?3 AND valid_to >= ?3 \
             ORDER BY valid_from DESC, id LIMIT 1",
            params![account_id, kind, ts(now)],
        )
    }

    async fn latest_payment(&self, account_id: &str, kind: &str) -> Result<Lookup<Payment>> {
        let conn = self.conn.lock().await;
        query_one(
            &conn,
            collections::PAYMENTS,
            "SELECT id, doc FROM payments WHERE account_id = ?1 AND kind = ?2 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![account_id, kind],
        )
    }

    async fn apps(&self, account_id: &str) -> Result<Vec<App>> {
        let conn = self.conn.lock().await;
        query_docs(
            &conn,
            collections::APPS,
            "SELECT id, doc FROM apps WHERE account_id = ?1 AND status != 'deleted' ORDER BY id",
            params![account_id],
        )
    }

    async fn count_uploads(&self, account_id: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        count(
            &conn,
            collections::UPLOADS,
            "SELECT COUNT(*) FROM uploads WHERE account_id = ?1 AND status != 'deleted'",
            params![account_id],
        )
    }

    async fn count_connections(&self, account_id: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        count(
            &conn,
            collections::CONNECTIONS,
            "SELECT COUNT(*) FROM connections WHERE account_id = ?1 AND status != 'deleted'",
            params![account_id],
        )
    }

    async fn upsert_stat(&self, stat: &DerivedStat) -> Result<()> {
        let doc = serde_json::to_string(stat)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO stats (id, created_at, updated_at, doc) VALUES (?1, ?2, ?3, ?4)",
            params![stat.id, ts(stat.created_at), ts(stat.updated_at), doc],
        )
        .map_err(|e| StatError::write(collections::STATS, &stat.id, e))?;
        Ok(())
    }

    async fn get_stat(&self, account_id: &str) -> Result<Lookup<DerivedStat>> {
        let conn = self.conn.lock().await;
        query_one(
            &conn,
            collections::STATS,
            "SELECT id, doc FROM stats WHERE id = ?1",
            params![account_id],
        )
    }

    async fn stats_created_since(&self, since: DateTime<Utc>) -> Result<Vec<DerivedStat>> {
        let conn = self.conn.lock().await;
        query_docs(
            &conn,
            collections::STATS,
            "SELECT id, doc FROM stats WHERE created_at >= ?1 ORDER BY created_at, id",
            params![ts(since)],
        )
    }

    async fn upsert_cohort_snapshot(&self, snapshot: &WeeklyCohortSnapshot) -> Result<()> {
        let doc = serde_json::to_string(snapshot)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO weekly_cohorts (alias, week_start, doc) VALUES (?1, ?2, ?3)",
            params![snapshot.week.alias, ts(snapshot.week.start), doc],
        )
        .map_err(|e| StatError::write(collections::WEEKLY_COHORTS, &snapshot.week.alias, e))?;
        Ok(())
    }

    async fn get_cohort_snapshot(&self, alias: &str) -> Result<Lookup<WeeklyCohortSnapshot>> {
        let conn = self.conn.lock().await;
        query_one(
            &conn,
            collections::WEEKLY_COHORTS,
            "SELECT alias, doc FROM weekly_cohorts WHERE alias = ?1",
            params![alias],
        )
    }

    async fn list_cohort_snapshots(&self) -> Result<Vec<WeeklyCohortSnapshot>> {
        let conn = self.conn.lock().await;
        query_docs(
            &conn,
            collections::WEEKLY_COHORTS,
            "SELECT alias, doc FROM weekly_cohorts ORDER BY week_start",
            [],
        )
    }

    async fn upsert_track(&self, track: &SegmentTrack) -> Result<()> {
        let key = track.key();
        let doc = serde_json::to_string(track)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO segment_tracks (key, account_id, tag, day, doc) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, track.account_id, track.tag, ts(track.time), doc],
        )
        .map_err(|e| StatError::write(collections::SEGMENT_TRACKS, &key, e))?;
        Ok(())
    }

    async fn list_tracks(&self) -> Result<Vec<SegmentTrack>> {
        let conn = self.conn.lock().await;
        query_docs(
            &conn,
            collections::SEGMENT_TRACKS,
            "SELECT key, doc FROM segment_tracks ORDER BY day, tag, account_id",
            [],
        )
    }

    async fn import(&self, dataset: &Dataset) -> Result<ImportSummary> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| StatError::Storage(format!("begin import: {e}")))?;
        let summary = import_into(&tx, dataset)?;
        tx.commit()
            .map_err(|e| StatError::Storage(format!("commit import: {e}")))?;

        tracing::info!(documents = summary.total(), "imported dataset");
        Ok(summary)
    }
}
