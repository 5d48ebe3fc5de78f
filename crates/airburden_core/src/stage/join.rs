//! Burden joiner: yearly station AQI × burden-of-disease records.
//!
//! # Invariants
//! - Aggregation is the arithmetic mean of non-null overall AQI per
//!   (station, calendar year); years without any AQI value are not emitted.
//! - Burden records get their station from the fixed country mapping; the
//!   join is inner on (station_id, year).
//! - Statistics must convert to `f64`; a failing row is skipped, not fatal.
//! - `joined_burden_aqi` is fully replaced on every run.

use crate::db::table_exists;
use crate::model::burden::{BurdenRecord, BurdenStats, JoinedBurdenAqi, YearlyAqi};
use crate::model::station::StationId;
use crate::normalize::parse_number;
use crate::repo::burden_repo::{BurdenRepository, SqliteBurdenRepository};
use crate::repo::{RepoError, RepoResult};
use log::{info, warn};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

const JOINED_TABLE_DDL: &str = "DROP TABLE IF EXISTS joined_burden_aqi;
CREATE TABLE joined_burden_aqi (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    station_id INTEGER NOT NULL,
    year INTEGER NOT NULL,
    country TEXT NOT NULL,
    cause TEXT NOT NULL,
    mean_value REAL NOT NULL,
    mean_lower_value REAL NOT NULL,
    mean_upper_value REAL NOT NULL,
    age_standardized_rate REAL NOT NULL,
    age_standardized_rate_lower REAL NOT NULL,
    age_standardized_rate_upper REAL NOT NULL,
    avg_aqi REAL NOT NULL
);";

/// Outcome of one join stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinReport {
    pub aggregates: usize,
    pub burden_records: usize,
    pub joined: usize,
    /// Burden rows whose country has no configured station.
    pub skipped_unmapped: usize,
    /// Matched rows whose statistics failed numeric conversion.
    pub skipped_invalid: usize,
}

/// Join output before persistence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BurdenJoin {
    pub rows: Vec<JoinedBurdenAqi>,
    pub skipped_unmapped: usize,
    pub skipped_invalid: usize,
}

/// Station of a burden country; exact match first, then case-insensitive.
pub fn station_for_country(
    country_stations: &BTreeMap<String, StationId>,
    country: &str,
) -> Option<StationId> {
    let country = country.trim();
    country_stations.get(country).copied().or_else(|| {
        country_stations
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(country))
            .map(|(_, station_id)| *station_id)
    })
}

/// Averages the merged series per station and calendar year.
pub fn yearly_aqi(conn: &Connection) -> RepoResult<Vec<YearlyAqi>> {
    if !table_exists(conn, "merged_series")? {
        return Err(RepoError::MissingRequiredTable("merged_series"));
    }

    let mut stmt = conn.prepare(
        "SELECT
            station_id,
            CAST(strftime('%Y', datetime) AS INTEGER) AS year,
            AVG(aqi) AS avg_aqi
         FROM merged_series
         GROUP BY station_id, year
         HAVING AVG(aqi) IS NOT NULL
         ORDER BY station_id ASC, year ASC;",
    )?;
    let aggregates = stmt
        .query_map([], |row| {
            Ok(YearlyAqi {
                station_id: row.get("station_id")?,
                year: row.get("year")?,
                avg_aqi: row.get("avg_aqi")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(aggregates)
}

fn parse_stats(record: &BurdenRecord) -> Result<BurdenStats, &'static str> {
    let field = |value: &Option<String>, name: &'static str| {
        value.as_deref().and_then(parse_number).ok_or(name)
    };
    Ok(BurdenStats {
        mean_value: field(&record.mean_value, "mean_value")?,
        mean_lower_value: field(&record.mean_lower_value, "mean_lower_value")?,
        mean_upper_value: field(&record.mean_upper_value, "mean_upper_value")?,
        age_standardized_rate: field(&record.age_standardized_rate, "age_standardized_rate")?,
        age_standardized_rate_lower: field(
            &record.age_standardized_rate_lower,
            "age_standardized_rate_lower",
        )?,
        age_standardized_rate_upper: field(
            &record.age_standardized_rate_upper,
            "age_standardized_rate_upper",
        )?,
    })
}

/// Inner-joins burden records with yearly aggregates (pure; no I/O).
///
/// Output follows burden record order.
pub fn join_burden(
    aggregates: &[YearlyAqi],
    records: &[BurdenRecord],
    country_stations: &BTreeMap<String, StationId>,
) -> BurdenJoin {
    let by_key: HashMap<(StationId, i32), f64> = aggregates
        .iter()
        .map(|aggregate| ((aggregate.station_id, aggregate.year), aggregate.avg_aqi))
        .collect();

    let mut join = BurdenJoin::default();
    for record in records {
        let Some(station_id) = station_for_country(country_stations, &record.country) else {
            warn!(
                "event=burden_join module=stage status=skip reason=unmapped_country country={}",
                record.country
            );
            join.skipped_unmapped += 1;
            continue;
        };
        let Some(avg_aqi) = by_key.get(&(station_id, record.year)).copied() else {
            continue;
        };
        let stats = match parse_stats(record) {
            Ok(stats) => stats,
            Err(field) => {
                warn!(
                    "event=burden_join module=stage status=skip reason=non_numeric field={} country={} cause={} year={}",
                    field, record.country, record.cause, record.year
                );
                join.skipped_invalid += 1;
                continue;
            }
        };

        join.rows.push(JoinedBurdenAqi {
            station_id,
            year: record.year,
            country: record.country.clone(),
            cause: record.cause.clone(),
            stats,
            avg_aqi,
        });
    }
    join
}

/// Drops, recreates and fills `joined_burden_aqi` in one transaction.
pub fn replace_joined(conn: &mut Connection, rows: &[JoinedBurdenAqi]) -> RepoResult<usize> {
    let tx = conn.transaction()?;
    tx.execute_batch(JOINED_TABLE_DDL)?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO joined_burden_aqi (
                station_id,
                year,
                country,
                cause,
                mean_value,
                mean_lower_value,
                mean_upper_value,
                age_standardized_rate,
                age_standardized_rate_lower,
                age_standardized_rate_upper,
                avg_aqi
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
        )?;
        for row in rows {
            stmt.execute(params![
                row.station_id,
                row.year,
                row.country.as_str(),
                row.cause.as_str(),
                row.stats.mean_value,
                row.stats.mean_lower_value,
                row.stats.mean_upper_value,
                row.stats.age_standardized_rate,
                row.stats.age_standardized_rate_lower,
                row.stats.age_standardized_rate_upper,
                row.avg_aqi,
            ])?;
        }
    }
    tx.commit()?;
    Ok(rows.len())
}

/// Reads `joined_burden_aqi` back in stored order.
pub fn list_joined(conn: &Connection) -> RepoResult<Vec<JoinedBurdenAqi>> {
    if !table_exists(conn, "joined_burden_aqi")? {
        return Err(RepoError::MissingRequiredTable("joined_burden_aqi"));
    }
    let mut stmt = conn.prepare(
        "SELECT
            station_id,
            year,
            country,
            cause,
            mean_value,
            mean_lower_value,
            mean_upper_value,
            age_standardized_rate,
            age_standardized_rate_lower,
            age_standardized_rate_upper,
            avg_aqi
         FROM joined_burden_aqi
         ORDER BY id ASC;",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(JoinedBurdenAqi {
                station_id: row.get("station_id")?,
                year: row.get("year")?,
                country: row.get("country")?,
                cause: row.get("cause")?,
                stats: BurdenStats {
                    mean_value: row.get("mean_value")?,
                    mean_lower_value: row.get("mean_lower_value")?,
                    mean_upper_value: row.get("mean_upper_value")?,
                    age_standardized_rate: row.get("age_standardized_rate")?,
                    age_standardized_rate_lower: row.get("age_standardized_rate_lower")?,
                    age_standardized_rate_upper: row.get("age_standardized_rate_upper")?,
                },
                avg_aqi: row.get("avg_aqi")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Runs the join stage against the committed merged series.
pub fn run_burden_join(
    conn: &mut Connection,
    country_stations: &BTreeMap<String, StationId>,
) -> RepoResult<JoinReport> {
    let started_at = Instant::now();
    let aggregates = yearly_aqi(conn)?;
    let records = SqliteBurdenRepository::new(conn).list_records()?;
    let join = join_burden(&aggregates, &records, country_stations);
    let joined = replace_joined(conn, &join.rows)?;

    let report = JoinReport {
        aggregates: aggregates.len(),
        burden_records: records.len(),
        joined,
        skipped_unmapped: join.skipped_unmapped,
        skipped_invalid: join.skipped_invalid,
    };
    info!(
        "event=burden_join module=stage status=ok aggregates={} burden_records={} joined={} skipped_unmapped={} skipped_invalid={} duration_ms={}",
        report.aggregates,
        report.burden_records,
        report.joined,
        report.skipped_unmapped,
        report.skipped_invalid,
        started_at.elapsed().as_millis()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(country: &str, year: i32, mean: &str) -> BurdenRecord {
        BurdenRecord {
            country: country.to_string(),
            cause: "Stroke".to_string(),
            year,
            mean_value: Some(mean.to_string()),
            mean_lower_value: Some("1.0".to_string()),
            mean_upper_value: Some("3.0".to_string()),
            age_standardized_rate: Some("20".to_string()),
            age_standardized_rate_lower: Some("18".to_string()),
            age_standardized_rate_upper: Some("22".to_string()),
        }
    }

    fn mapping() -> BTreeMap<String, StationId> {
        BTreeMap::from([("China".to_string(), 3)])
    }

    #[test]
    fn inner_join_keeps_only_matching_years() {
        let aggregates = [
            YearlyAqi {
                station_id: 3,
                year: 2019,
                avg_aqi: 80.0,
            },
            YearlyAqi {
                station_id: 3,
                year: 2020,
                avg_aqi: 90.0,
            },
        ];
        let records = [record("China", 2019, "2.0"), record("China", 2018, "2.5")];
        let join = join_burden(&aggregates, &records, &mapping());
        assert_eq!(join.rows.len(), 1);
        assert_eq!(join.rows[0].year, 2019);
        assert_eq!(join.rows[0].avg_aqi, 80.0);
        assert_eq!(join.rows[0].stats.mean_value, 2.0);
    }

    #[test]
    fn non_numeric_and_unmapped_rows_are_skipped() {
        let aggregates = [YearlyAqi {
            station_id: 3,
            year: 2019,
            avg_aqi: 80.0,
        }];
        let records = [
            record("China", 2019, "n/a"),
            record("Atlantis", 2019, "1.0"),
            record("china", 2019, "4.0"),
        ];
        let join = join_burden(&aggregates, &records, &mapping());
        assert_eq!(join.skipped_invalid, 1);
        assert_eq!(join.skipped_unmapped, 1);
        assert_eq!(join.rows.len(), 1);
        assert_eq!(join.rows[0].station_id, 3);
        assert_eq!(join.rows[0].stats.mean_value, 4.0);
    }

    #[test]
    fn country_lookup_falls_back_to_case_insensitive() {
        let map = mapping();
        assert_eq!(station_for_country(&map, "China"), Some(3));
        assert_eq!(station_for_country(&map, " CHINA "), Some(3));
        assert_eq!(station_for_country(&map, "France"), None);
    }
}
