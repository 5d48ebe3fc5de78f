use airburden_core::db::open_db_in_memory;
use airburden_core::ingest::burden::import_burden_file;
use airburden_core::repo::burden_repo::{BurdenRepository, SqliteBurdenRepository};
use airburden_core::repo::RepoError;
use airburden_core::stage::join::{list_joined, run_burden_join, yearly_aqi};
use airburden_core::stage::merge::{run_merge, StationArchive};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;

const BURDEN_HEADER: &str = "Country / Territory / Area,GHE cause,Year,Mean value,Mean lower value,Mean upper value,Age-standardized rate,Age-standardized rate lower value,Age-standardized rate upper value";

fn seed_station(conn: &Connection) -> i64 {
    conn.execute(
        "INSERT INTO stations (name, city, country) VALUES ('Beijing', 'Beijing', 'China');",
        [],
    )
    .unwrap();
    conn.last_insert_rowid()
}

fn seed_live(conn: &Connection, station_id: i64, datetime: &str, pm25: f64) {
    conn.execute(
        "INSERT INTO observations (station_id, datetime, source) VALUES (?1, ?2, 'live');",
        params![station_id, datetime],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO pollutant_readings (observation_id, name, value) VALUES (?1, 'pm25', ?2);",
        params![conn.last_insert_rowid(), pm25],
    )
    .unwrap();
}

fn write_burden(dir: &Path, rows: &[&str]) -> std::path::PathBuf {
    let path = dir.join("burden.csv");
    let mut text = String::from(BURDEN_HEADER);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    std::fs::write(&path, text).unwrap();
    path
}

fn merged_store() -> (Connection, i64) {
    let mut conn = open_db_in_memory().unwrap();
    let station_id = seed_station(&conn);
    seed_live(&conn, station_id, "2019-05-01 08:00:00", 10.0);
    seed_live(&conn, station_id, "2019-06-01 08:00:00", 10.0);
    seed_live(&conn, station_id, "2020-05-01 08:00:00", 10.0);
    run_merge(
        &mut conn,
        &[StationArchive {
            station_id,
            table: None,
        }],
    )
    .unwrap();
    (conn, station_id)
}

#[test]
fn yearly_aggregate_averages_per_station_and_year() {
    let (conn, station_id) = merged_store();

    let aggregates = yearly_aqi(&conn).unwrap();

    assert_eq!(aggregates.len(), 2);
    assert_eq!(aggregates[0].station_id, station_id);
    assert_eq!(aggregates[0].year, 2019);
    assert_eq!(aggregates[0].avg_aqi, 42.0);
    assert_eq!(aggregates[1].year, 2020);
}

#[test]
fn only_years_present_on_both_sides_are_joined() {
    let (mut conn, station_id) = merged_store();
    let dir = tempfile::tempdir().unwrap();
    let path = write_burden(
        dir.path(),
        &[
            "China,Stroke,2018,1.0,0.5,1.5,10,9,11",
            "China,Stroke,2019,2.0,1.5,2.5,20,19,21",
        ],
    );
    import_burden_file(&mut conn, &path, "China").unwrap();

    let report = run_burden_join(&mut conn, &BTreeMap::from([("China".to_string(), station_id)]))
        .unwrap();

    assert_eq!(report.aggregates, 2);
    assert_eq!(report.burden_records, 2);
    assert_eq!(report.joined, 1);
    let joined = list_joined(&conn).unwrap();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].year, 2019);
    assert_eq!(joined[0].cause, "Stroke");
    assert_eq!(joined[0].stats.mean_value, 2.0);
    assert_eq!(joined[0].stats.age_standardized_rate_upper, 21.0);
    assert_eq!(joined[0].avg_aqi, 42.0);
}

#[test]
fn non_numeric_statistics_skip_the_row_and_the_run_continues() {
    let (mut conn, station_id) = merged_store();
    let dir = tempfile::tempdir().unwrap();
    let path = write_burden(
        dir.path(),
        &[
            "China,Stroke,2019,2.0,1.5,2.5,20,19,21",
            "China,Lung cancer,2019,n/a,1.5,2.5,20,19,21",
            "China,COPD [b],2020,3.0,2.5,3.5,30,29,31",
        ],
    );
    import_burden_file(&mut conn, &path, "China").unwrap();

    let report = run_burden_join(&mut conn, &BTreeMap::from([("China".to_string(), station_id)]))
        .unwrap();

    assert_eq!(report.skipped_invalid, 1);
    assert_eq!(report.joined, 2);
    let causes: Vec<String> = list_joined(&conn)
        .unwrap()
        .into_iter()
        .map(|row| row.cause)
        .collect();
    assert_eq!(causes, vec!["Stroke".to_string(), "COPD".to_string()]);
}

#[test]
fn unmapped_countries_are_dropped() {
    let (mut conn, _station_id) = merged_store();
    let dir = tempfile::tempdir().unwrap();
    let path = write_burden(dir.path(), &["India,Stroke,2019,2.0,1.5,2.5,20,19,21"]);
    import_burden_file(&mut conn, &path, "India").unwrap();

    let report = run_burden_join(&mut conn, &BTreeMap::new()).unwrap();

    assert_eq!(report.skipped_unmapped, 1);
    assert_eq!(report.joined, 0);
    assert!(list_joined(&conn).unwrap().is_empty());
}

#[test]
fn reimporting_a_country_replaces_its_records() {
    let mut conn = open_db_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = write_burden(
        dir.path(),
        &[
            "China,Stroke,2019,2.0,1.5,2.5,20,19,21",
            "China,Stroke,not-a-year,2.0,1.5,2.5,20,19,21",
            "China,Stroke,2019,2.0",
        ],
    );

    let first = import_burden_file(&mut conn, &path, "China").unwrap();
    let second = import_burden_file(&mut conn, &path, "China").unwrap();

    assert_eq!(first.inserted, 1);
    assert_eq!(first.skipped_rows, 2);
    assert_eq!(second.inserted, 1);
    let records = SqliteBurdenRepository::new(&conn).list_records().unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn join_without_merged_series_fails_with_missing_table() {
    let mut conn = open_db_in_memory().unwrap();
    let err = run_burden_join(&mut conn, &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, RepoError::MissingRequiredTable("merged_series")));
}
