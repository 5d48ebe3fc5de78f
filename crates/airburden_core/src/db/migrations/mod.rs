//! Schema migrations for the durable pipeline tables.
//!
//! # Responsibility
//! - Create the ingestion tables (stations, observations, pollutant readings)
//!   and the burden record table.
//! - Bring an older store up to the current schema in one transaction.
//!
//! # Invariants
//! - Versions are strictly increasing; the store's `PRAGMA user_version`
//!   holds the last applied one.
//! - A store written by a newer binary is refused, never downgraded.
//! - `merged_series` and `joined_burden_aqi` are absent here; their stages
//!   own them and rebuild them on every run.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "ingestion_tables",
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        name: "burden_records",
        sql: include_str!("0002_burden_records.sql"),
    },
];

/// Schema version this binary writes.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies every migration newer than the store's `user_version`.
///
/// # Errors
/// - `DbError::UnsupportedSchemaVersion` when the store is ahead of this binary.
/// - `DbError::Sqlite` when a migration fails; nothing is committed then.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let store_version = store_version(conn)?;
    let target = latest_version();

    if store_version > target {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: store_version,
            latest_supported: target,
        });
    }
    if store_version == target {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS
        .iter()
        .filter(|migration| migration.version > store_version)
    {
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;
    Ok(())
}

fn store_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, latest_version, MIGRATIONS};
    use rusqlite::Connection;

    #[test]
    fn versions_are_strictly_increasing() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
        assert_eq!(latest_version(), 2);
    }

    #[test]
    fn upgrades_a_store_left_at_the_first_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].sql).unwrap();
        conn.pragma_update(None, "user_version", 1u32).unwrap();

        apply_migrations(&mut conn).unwrap();

        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, latest_version());
        let burden_tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'burden_records';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(burden_tables, 1);
    }
}
