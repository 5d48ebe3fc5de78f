use airburden_core::config::{BurdenSource, FeedConfig, PipelineConfig, StationConfig};
use airburden_core::db::open_db_in_memory;
use airburden_core::ingest::feed::{FeedClient, FeedError, FeedReading, FeedResult};
use airburden_core::model::observation::{Pollutant, PollutantReading, Weather};
use airburden_core::model::station::NewStation;
use airburden_core::service::pipeline::Pipeline;
use airburden_core::stage::join::list_joined;
use airburden_core::stage::merge::list_merged_series;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

struct StubFeed;

impl FeedClient for StubFeed {
    fn fetch(&self, location: &str) -> FeedResult<FeedReading> {
        if location != "beijing" {
            return Err(FeedError::Status {
                location: location.to_string(),
                message: "Unknown station".to_string(),
            });
        }
        Ok(FeedReading {
            station: NewStation {
                name: "Beijing".to_string(),
                city: "Beijing".to_string(),
                country: "China".to_string(),
                latitude: Some(39.95),
                longitude: Some(116.46),
            },
            observed_at: NaiveDate::from_ymd_opt(2019, 3, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            aqi: Some(42),
            dominant_pollutant: Some("pm25".to_string()),
            weather: Weather::default(),
            readings: vec![PollutantReading::new(Pollutant::Pm25, 10.0).unwrap()],
        })
    }
}

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn config(dir: &Path) -> PipelineConfig {
    let archive = write(
        dir,
        "beijing.csv",
        "date,pm25,pm10\n2019-01-01,10,\n2019-01-02,10,\nbad-date,10,\n",
    );
    let burden = write(
        dir,
        "china.csv",
        "Country / Territory / Area,GHE cause,Year,Mean value,Mean lower value,Mean upper value,Age-standardized rate,Age-standardized rate lower value,Age-standardized rate upper value\n\
         China,Stroke,2019,2.0,1.5,2.5,20,19,21\n\
         China,Stroke,2015,2.0,1.5,2.5,20,19,21\n",
    );
    PipelineConfig {
        database_path: dir.join("unused.db"),
        feed: FeedConfig::default(),
        cities: vec![
            "beijing".to_string(),
            "nowhere".to_string(),
            "beijing".to_string(),
        ],
        stations: vec![StationConfig {
            station_id: 1,
            name: Some("Beijing".to_string()),
            archive_path: Some(archive),
        }],
        burden_sources: vec![
            BurdenSource {
                country: "China".to_string(),
                path: burden,
            },
            BurdenSource {
                country: "India".to_string(),
                path: dir.join("missing.csv"),
            },
        ],
        country_stations: BTreeMap::from([("China".to_string(), 1)]),
    }
}

#[test]
fn full_run_isolates_unit_failures_and_produces_join() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = open_db_in_memory().unwrap();
    let mut pipeline = Pipeline::new(&mut conn, config(dir.path()));

    let report = pipeline.run(&StubFeed).unwrap();

    assert_eq!(report.run_id, pipeline.run_id());
    assert_eq!(report.live.inserted, 1);
    assert_eq!(report.live.already_present, 1);
    assert_eq!(report.live.failed, 1);
    assert_eq!(report.burden.imported.len(), 1);
    assert_eq!(report.burden.failed, 1);
    assert_eq!(report.dedup.observations_deleted, 0);
    assert_eq!(report.merge.live_rows, 1);
    assert_eq!(report.merge.historical_rows, 2);
    assert_eq!(report.merge.dropped_rows, 1);
    assert_eq!(report.join.joined, 1);
    drop(pipeline);

    assert_eq!(list_merged_series(&conn).unwrap().len(), 3);
    let joined = list_joined(&conn).unwrap();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].year, 2019);
    assert_eq!(joined[0].avg_aqi, 42.0);
}

#[test]
fn rerunning_the_pipeline_converges() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = open_db_in_memory().unwrap();

    Pipeline::new(&mut conn, config(dir.path()))
        .run(&StubFeed)
        .unwrap();
    let first_merged = list_merged_series(&conn).unwrap();
    let first_joined = list_joined(&conn).unwrap();

    let second = Pipeline::new(&mut conn, config(dir.path()))
        .run(&StubFeed)
        .unwrap();

    assert_eq!(second.live.inserted, 0);
    assert_eq!(second.live.already_present, 2);
    assert_eq!(list_merged_series(&conn).unwrap(), first_merged);
    assert_eq!(list_joined(&conn).unwrap(), first_joined);
}

#[test]
fn merge_without_configured_stations_uses_stored_stations() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = open_db_in_memory().unwrap();
    let mut config = config(dir.path());
    config.stations.clear();
    config.country_stations.clear();
    let mut pipeline = Pipeline::new(&mut conn, config);

    pipeline.ingest_live(&StubFeed).unwrap();
    let report = pipeline.merge().unwrap();

    assert_eq!(report.stations, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.historical_rows, 0);
}
