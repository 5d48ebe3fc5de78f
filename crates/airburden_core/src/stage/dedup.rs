//! Observation deduplication.
//!
//! # Invariants
//! - Within each (station_id, datetime) group the smallest observation id
//!   survives; every other member is deleted together with its readings.
//! - Readings are deleted before their observations, both in one commit.
//! - A missing `observations` table is a no-op, not a failure.

use crate::db::table_exists;
use crate::model::observation::ObservationId;
use crate::repo::RepoResult;
use log::info;
use rusqlite::Connection;
use serde::Serialize;
use std::time::Instant;

/// Outcome of one deduplication run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    /// Nothing was ingested yet, so there was nothing to inspect.
    pub skipped_missing_table: bool,
    pub observations_deleted: usize,
    pub readings_deleted: usize,
}

/// Deletes duplicate observations, keeping the earliest-ingested row per key.
///
/// Idempotent: a second call without new duplicates deletes nothing.
pub fn remove_duplicate_observations(conn: &mut Connection) -> RepoResult<DedupReport> {
    let started_at = Instant::now();
    if !table_exists(conn, "observations")? {
        info!("event=dedup module=stage status=skip reason=missing_table table=observations");
        return Ok(DedupReport {
            skipped_missing_table: true,
            ..DedupReport::default()
        });
    }
    let has_readings = table_exists(conn, "pollutant_readings")?;

    let tx = conn.transaction()?;
    let duplicate_ids = find_duplicate_ids(&tx)?;

    let mut report = DedupReport::default();
    if !duplicate_ids.is_empty() {
        if has_readings {
            let mut delete_readings =
                tx.prepare("DELETE FROM pollutant_readings WHERE observation_id = ?1;")?;
            for id in &duplicate_ids {
                report.readings_deleted += delete_readings.execute([id])?;
            }
        }

        let mut delete_observation = tx.prepare("DELETE FROM observations WHERE id = ?1;")?;
        for id in &duplicate_ids {
            report.observations_deleted += delete_observation.execute([id])?;
        }
    }
    tx.commit()?;

    info!(
        "event=dedup module=stage status=ok observations_deleted={} readings_deleted={} duration_ms={}",
        report.observations_deleted,
        report.readings_deleted,
        started_at.elapsed().as_millis()
    );
    Ok(report)
}

/// Ids of observations that share their key with a smaller id.
fn find_duplicate_ids(conn: &Connection) -> RepoResult<Vec<ObservationId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT a.id
         FROM observations a
         INNER JOIN observations b
            ON a.station_id = b.station_id
           AND a.datetime = b.datetime
         WHERE a.id > b.id
         ORDER BY a.id ASC;",
    )?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}
