//! Document store schema and migrations.
//!
//! Each collection is a `SQLite` table with the JSON document in a `doc`
//! column and a few extracted key columns for filtering and ordering.

use rusqlite::Connection;

use crate::error::{Result, StatError};

const STORE_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("../../migrations/001_raw_collections.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("../../migrations/002_rollups.sql"),
    },
    Migration {
        version: 3,
        sql: include_str!("../../migrations/003_segment_tracks.sql"),
    },
];

/// Latest schema version known to this build.
pub const SCHEMA_VERSION: i32 = 3;

/// Run schema migrations for the document store.
///
/// Returns the latest schema version applied.
///
/// # Errors
/// Returns an error if creating the migrations table, reading the schema version,
/// or applying any migration fails.
pub fn run_migrations(conn: &mut Connection) -> Result<i32> {
    ensure_schema_migrations_table(conn)?;

    let mut current_version = get_schema_version(conn)?;

    for migration in STORE_MIGRATIONS {
        if migration.version > current_version {
            apply_migration(conn, migration)?;
            tracing::debug!(version = migration.version, "applied store migration");
            current_version = migration.version;
        }
    }

    Ok(current_version)
}

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i32,
    sql: &'static str,
}

fn ensure_schema_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version INTEGER PRIMARY KEY,\
            applied_at TEXT DEFAULT (datetime('now'))\
        );",
    )
    .map_err(|e| StatError::Storage(format!("create schema_migrations: {e}")))?;

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| StatError::Storage(format!("read schema version: {e}")))?;

    Ok(version.unwrap_or(0))
}

fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| StatError::Storage(format!("begin migration: {e}")))?;

    tx.execute_batch(migration.sql)
        .map_err(|e| StatError::Storage(format!("apply migration {}: {e}", migration.version)))?;

    tx.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [migration.version],
    )
    .map_err(|e| StatError::Storage(format!("record migration {}: {e}", migration.version)))?;

    tx.commit()
        .map_err(|e| StatError::Storage(format!("commit migration {}: {e}", migration.version)))?;

    Ok(())
}
