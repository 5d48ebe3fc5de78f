//! Source merger: live feed + historical archive into one series.
//!
//! # Responsibility
//! - Normalize both inputs to the unified column set (`LIVE_V1`).
//! - Apply the AQI calculator uniformly and attach the category.
//! - Replace `merged_series` with the concatenation of every station.
//!
//! # Invariants
//! - Provenance is tagged explicitly: store rows are `live`, archive rows
//!   are `csv`.
//! - Rows without a parseable timestamp are dropped, never stored with a
//!   null key.
//! - No deduplication here; the series is a plain union.
//! - Output order is station ascending, then timestamp descending. Rows with
//!   equal keys keep input order (live before csv).

use crate::aqi::{category, overall_aqi, AqiCategory};
use crate::db::table_exists;
use crate::model::merged::MergedRecord;
use crate::model::observation::{Concentrations, Pollutant, Source};
use crate::model::station::StationId;
use crate::model::{format_datetime, parse_stored_datetime};
use crate::normalize::registry::{SchemaError, HISTORICAL_V1, LIVE_V1};
use crate::normalize::{parse_number, parse_timestamp, RawTable};
use crate::repo::observation_repo::{
    LiveSeriesRow, ObservationRepository, SqliteObservationRepository,
};
use crate::repo::{RepoError, RepoResult};
use chrono::NaiveDateTime;
use log::{info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use std::time::Instant;

const MERGED_TABLE_DDL: &str = "DROP TABLE IF EXISTS merged_series;
CREATE TABLE merged_series (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    station_id INTEGER NOT NULL,
    datetime TEXT NOT NULL,
    source TEXT NOT NULL,
    pm25 REAL,
    pm10 REAL,
    o3 REAL,
    no2 REAL,
    so2 REAL,
    co REAL,
    aqi INTEGER,
    aqi_category TEXT
);";

/// Historical archive of one station, already read from its source file.
#[derive(Debug, Clone, PartialEq)]
pub struct StationArchive {
    pub station_id: StationId,
    pub table: Option<RawTable>,
}

/// Merged rows of one station plus input accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationMerge {
    pub records: Vec<MergedRecord>,
    pub live_rows: usize,
    pub historical_rows: usize,
    /// Rows dropped because their timestamp did not parse.
    pub dropped_rows: usize,
}

/// Outcome of one merge stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub stations: usize,
    pub live_rows: usize,
    pub historical_rows: usize,
    pub dropped_rows: usize,
    /// Archives ignored because their headers failed registry validation.
    pub rejected_archives: usize,
    pub inserted: usize,
}

fn score(
    station_id: StationId,
    datetime: NaiveDateTime,
    source: Source,
    concentrations: Concentrations,
) -> MergedRecord {
    let aqi = overall_aqi(&concentrations);
    MergedRecord {
        station_id,
        datetime,
        source,
        concentrations,
        aqi,
        category: aqi.map(category),
    }
}

/// Normalizes live store rows; returns the records and the dropped count.
pub fn normalize_live(rows: &[LiveSeriesRow]) -> (Vec<MergedRecord>, usize) {
    let mut records = Vec::with_capacity(rows.len());
    let mut dropped = 0;
    for row in rows {
        let Some(datetime) =
            parse_stored_datetime(&row.datetime).or_else(|| parse_timestamp(&row.datetime))
        else {
            dropped += 1;
            continue;
        };
        records.push(score(
            row.station_id,
            datetime,
            Source::Live,
            row.concentrations,
        ));
    }
    (records, dropped)
}

/// Normalizes a historical archive table for `station_id`.
///
/// Blank or non-numeric cells become missing values; absent pollutant
/// columns read as missing. Rows whose field count differs from the header
/// are dropped.
pub fn normalize_historical(
    station_id: StationId,
    table: &RawTable,
) -> Result<(Vec<MergedRecord>, usize), SchemaError> {
    let columns = HISTORICAL_V1.resolve(&table.headers)?;
    let mut records = Vec::with_capacity(table.rows.len());
    let mut dropped = 0;

    for row in &table.rows {
        if row.values.len() != columns.width() {
            warn!(
                "event=merge_row module=stage status=skip station_id={station_id} line={} reason=column_count expected={} got={}",
                row.line,
                columns.width(),
                row.values.len()
            );
            dropped += 1;
            continue;
        }
        let Some(datetime) = columns.get(row, "date").and_then(parse_timestamp) else {
            dropped += 1;
            continue;
        };
        let mut concentrations = Concentrations::default();
        for pollutant in Pollutant::ALL {
            let value = columns.get(row, pollutant.as_str()).and_then(parse_number);
            concentrations.set(pollutant, value);
        }
        records.push(score(station_id, datetime, Source::Csv, concentrations));
    }

    Ok((records, dropped))
}

/// Merges one station's live rows with its archive (pure; no I/O).
pub fn merge_station(
    station_id: StationId,
    live: &[LiveSeriesRow],
    historical: Option<&RawTable>,
) -> Result<StationMerge, SchemaError> {
    let (mut records, live_dropped) = normalize_live(live);
    let live_rows = records.len();

    let (historical_records, historical_dropped) = match historical {
        Some(table) => normalize_historical(station_id, table)?,
        None => (Vec::new(), 0),
    };
    let historical_rows = historical_records.len();
    records.extend(historical_records);

    Ok(StationMerge {
        records,
        live_rows,
        historical_rows,
        dropped_rows: live_dropped + historical_dropped,
    })
}

/// Sorts records by station ascending, then timestamp descending.
pub fn sort_merged(records: &mut [MergedRecord]) {
    records.sort_by(|a, b| {
        a.station_id
            .cmp(&b.station_id)
            .then_with(|| b.datetime.cmp(&a.datetime))
    });
}

fn column_value(record: &MergedRecord, column: &str) -> RepoResult<Value> {
    let value = match column {
        "station_id" => Value::Integer(record.station_id),
        "datetime" => Value::Text(format_datetime(&record.datetime)),
        "source" => Value::Text(record.source.as_str().to_string()),
        other => {
            let pollutant = Pollutant::parse(other).ok_or_else(|| {
                RepoError::InvalidData(format!("unknown merged_series column `{other}`"))
            })?;
            record
                .concentrations
                .get(pollutant)
                .map_or(Value::Null, Value::Real)
        }
    };
    Ok(value)
}

/// Drops, recreates and fills `merged_series` in one transaction.
///
/// Records are stored in the order given; callers sort first.
pub fn replace_merged_series(conn: &mut Connection, records: &[MergedRecord]) -> RepoResult<usize> {
    let column_names: Vec<&str> = LIVE_V1.columns.iter().map(|column| column.name).collect();
    let placeholders = vec!["?"; column_names.len() + 2].join(", ");
    let insert_sql = format!(
        "INSERT INTO merged_series ({}, aqi, aqi_category) VALUES ({placeholders});",
        column_names.join(", ")
    );

    let tx = conn.transaction()?;
    tx.execute_batch(MERGED_TABLE_DDL)?;
    {
        let mut stmt = tx.prepare(&insert_sql)?;
        for record in records {
            let mut values = Vec::with_capacity(column_names.len() + 2);
            for column in &column_names {
                values.push(column_value(record, column)?);
            }
            values.push(record.aqi.map_or(Value::Null, |aqi| Value::Integer(i64::from(aqi))));
            values.push(
                record
                    .category
                    .map_or(Value::Null, |category| Value::Text(category.label().to_string())),
            );
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}

/// Reads `merged_series` back in stored order.
pub fn list_merged_series(conn: &Connection) -> RepoResult<Vec<MergedRecord>> {
    if !table_exists(conn, "merged_series")? {
        return Err(RepoError::MissingRequiredTable("merged_series"));
    }

    let mut stmt = conn.prepare(
        "SELECT station_id, datetime, source, pm25, pm10, o3, no2, so2, co, aqi, aqi_category
         FROM merged_series
         ORDER BY id ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let datetime_text: String = row.get("datetime")?;
        let datetime = parse_stored_datetime(&datetime_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid datetime `{datetime_text}` in merged_series.datetime"
            ))
        })?;
        let source_text: String = row.get("source")?;
        let source = Source::parse(&source_text).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid source `{source_text}` in merged_series.source"))
        })?;
        let category = match row.get::<_, Option<String>>("aqi_category")? {
            Some(label) => Some(AqiCategory::from_label(&label).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "invalid category `{label}` in merged_series.aqi_category"
                ))
            })?),
            None => None,
        };

        let mut concentrations = Concentrations::default();
        for pollutant in Pollutant::ALL {
            concentrations.set(pollutant, row.get(pollutant.as_str())?);
        }
        records.push(MergedRecord {
            station_id: row.get("station_id")?,
            datetime,
            source,
            concentrations,
            aqi: row.get("aqi")?,
            category,
        });
    }
    Ok(records)
}

/// Runs the merge stage for every configured station and replaces
/// `merged_series` once with the combined, sorted result.
///
/// An archive whose headers fail validation is logged and ignored; the
/// station is still merged from its live rows.
pub fn run_merge(conn: &mut Connection, archives: &[StationArchive]) -> RepoResult<MergeReport> {
    let started_at = Instant::now();
    let mut report = MergeReport::default();
    let mut all_records = Vec::new();

    for archive in archives {
        let live = SqliteObservationRepository::new(conn).live_series(archive.station_id)?;
        let merged = match merge_station(archive.station_id, &live, archive.table.as_ref()) {
            Ok(merged) => merged,
            Err(err) => {
                warn!(
                    "event=merge_station module=stage status=skip_archive station_id={} error={}",
                    archive.station_id, err
                );
                report.rejected_archives += 1;
                let (records, dropped_rows) = normalize_live(&live);
                StationMerge {
                    live_rows: records.len(),
                    records,
                    historical_rows: 0,
                    dropped_rows,
                }
            }
        };

        info!(
            "event=merge_station module=stage status=ok station_id={} live_rows={} historical_rows={} dropped_rows={}",
            archive.station_id, merged.live_rows, merged.historical_rows, merged.dropped_rows
        );
        report.stations += 1;
        report.live_rows += merged.live_rows;
        report.historical_rows += merged.historical_rows;
        report.dropped_rows += merged.dropped_rows;
        all_records.extend(merged.records);
    }

    sort_merged(&mut all_records);
    report.inserted = replace_merged_series(conn, &all_records)?;

    info!(
        "event=merge module=stage status=ok stations={} inserted={} dropped_rows={} duration_ms={}",
        report.stations,
        report.inserted,
        report.dropped_rows,
        started_at.elapsed().as_millis()
    );
    Ok(report)
}
