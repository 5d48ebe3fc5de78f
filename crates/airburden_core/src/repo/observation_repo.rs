//! Observation and pollutant-reading repository.
//!
//! # Responsibility
//! - Persist observations with their pollutant readings.
//! - Provide the pivoted live series consumed by the source merger.
//!
//! # Invariants
//! - A pollutant reading always references an existing observation
//!   (`foreign_keys=ON`); deletes must remove readings first.
//! - Read paths reject unknown `source` / pollutant names.

use crate::model::observation::{
    Concentrations, Observation, ObservationId, Pollutant, PollutantReading, Source, Weather,
};
use crate::model::station::StationId;
use crate::model::{format_datetime, parse_stored_datetime};
use crate::repo::{RepoError, RepoResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const OBSERVATION_SELECT_SQL: &str = "SELECT
    id,
    station_id,
    datetime,
    aqi,
    dominant_pollutant,
    source,
    temperature,
    humidity,
    pressure,
    wind
FROM observations";

/// Observation fields supplied before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewObservation {
    pub station_id: StationId,
    pub datetime: NaiveDateTime,
    pub aqi: Option<i32>,
    pub dominant_pollutant: Option<String>,
    pub source: Source,
    pub weather: Weather,
}

/// One live observation pivoted to one column per pollutant.
///
/// `datetime` is the stored text; the merger decides what to do with values
/// that fail to parse.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSeriesRow {
    pub observation_id: ObservationId,
    pub station_id: StationId,
    pub datetime: String,
    pub concentrations: Concentrations,
}

/// Repository interface for observation persistence and queries.
pub trait ObservationRepository {
    fn find_observation(
        &self,
        station_id: StationId,
        datetime: &NaiveDateTime,
    ) -> RepoResult<Option<ObservationId>>;
    fn insert_observation(&self, observation: &NewObservation) -> RepoResult<ObservationId>;
    fn insert_reading(
        &self,
        observation_id: ObservationId,
        reading: &PollutantReading,
    ) -> RepoResult<()>;
    fn get_observation(&self, id: ObservationId) -> RepoResult<Option<Observation>>;
    fn list_observations(&self, station_id: StationId) -> RepoResult<Vec<Observation>>;
    fn list_readings(&self, observation_id: ObservationId) -> RepoResult<Vec<PollutantReading>>;
    /// Live observations of one station with readings pivoted into columns,
    /// in observation id order. Observations without readings are kept with
    /// every concentration missing.
    fn live_series(&self, station_id: StationId) -> RepoResult<Vec<LiveSeriesRow>>;
}

/// SQLite-backed observation repository.
pub struct SqliteObservationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteObservationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ObservationRepository for SqliteObservationRepository<'_> {
    fn find_observation(
        &self,
        station_id: StationId,
        datetime: &NaiveDateTime,
    ) -> RepoResult<Option<ObservationId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id
                 FROM observations
                 WHERE station_id = ?1 AND datetime = ?2
                 ORDER BY id ASC
                 LIMIT 1;",
                params![station_id, format_datetime(datetime)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn insert_observation(&self, observation: &NewObservation) -> RepoResult<ObservationId> {
        self.conn.execute(
            "INSERT INTO observations (
                station_id,
                datetime,
                aqi,
                dominant_pollutant,
                source,
                temperature,
                humidity,
                pressure,
                wind
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                observation.station_id,
                format_datetime(&observation.datetime),
                observation.aqi,
                observation.dominant_pollutant.as_deref(),
                observation.source.as_str(),
                observation.weather.temperature,
                observation.weather.humidity,
                observation.weather.pressure,
                observation.weather.wind,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_reading(
        &self,
        observation_id: ObservationId,
        reading: &PollutantReading,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO pollutant_readings (observation_id, name, value)
             VALUES (?1, ?2, ?3);",
            params![observation_id, reading.pollutant.as_str(), reading.value],
        )?;
        Ok(())
    }

    fn get_observation(&self, id: ObservationId) -> RepoResult<Option<Observation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{OBSERVATION_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_observation_row(row)?));
        }
        Ok(None)
    }

    fn list_observations(&self, station_id: StationId) -> RepoResult<Vec<Observation>> {
        let mut stmt = self.conn.prepare(&format!(
            "{OBSERVATION_SELECT_SQL} WHERE station_id = ?1 ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([station_id])?;
        let mut observations = Vec::new();
        while let Some(row) = rows.next()? {
            observations.push(parse_observation_row(row)?);
        }
        Ok(observations)
    }

    fn list_readings(&self, observation_id: ObservationId) -> RepoResult<Vec<PollutantReading>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, value
             FROM pollutant_readings
             WHERE observation_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([observation_id])?;
        let mut readings = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get("name")?;
            let pollutant = parse_pollutant_name(&name)?;
            readings.push(PollutantReading {
                pollutant,
                value: row.get("value")?,
            });
        }
        Ok(readings)
    }

    fn live_series(&self, station_id: StationId) -> RepoResult<Vec<LiveSeriesRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                o.id AS observation_id,
                o.station_id AS station_id,
                o.datetime AS datetime,
                MAX(CASE WHEN p.name = 'pm25' THEN p.value END) AS pm25,
                MAX(CASE WHEN p.name = 'pm10' THEN p.value END) AS pm10,
                MAX(CASE WHEN p.name = 'o3' THEN p.value END) AS o3,
                MAX(CASE WHEN p.name = 'no2' THEN p.value END) AS no2,
                MAX(CASE WHEN p.name = 'so2' THEN p.value END) AS so2,
                MAX(CASE WHEN p.name = 'co' THEN p.value END) AS co
             FROM observations o
             LEFT JOIN pollutant_readings p ON p.observation_id = o.id
             WHERE o.station_id = ?1
               AND o.source = 'live'
             GROUP BY o.id, o.station_id, o.datetime
             ORDER BY o.id ASC;",
        )?;
        let rows = stmt
            .query_map([station_id], |row| {
                let mut concentrations = Concentrations::default();
                for pollutant in Pollutant::ALL {
                    concentrations.set(pollutant, row.get(pollutant.as_str())?);
                }
                Ok(LiveSeriesRow {
                    observation_id: row.get("observation_id")?,
                    station_id: row.get("station_id")?,
                    datetime: row.get("datetime")?,
                    concentrations,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn parse_observation_row(row: &Row<'_>) -> RepoResult<Observation> {
    let datetime_text: String = row.get("datetime")?;
    let datetime = parse_stored_datetime(&datetime_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid datetime `{datetime_text}` in observations.datetime"
        ))
    })?;

    let source_text: String = row.get("source")?;
    let source = Source::parse(&source_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid source `{source_text}` in observations.source"))
    })?;

    Ok(Observation {
        id: row.get("id")?,
        station_id: row.get("station_id")?,
        datetime,
        aqi: row.get("aqi")?,
        dominant_pollutant: row.get("dominant_pollutant")?,
        source,
        weather: Weather {
            temperature: row.get("temperature")?,
            humidity: row.get("humidity")?,
            pressure: row.get("pressure")?,
            wind: row.get("wind")?,
        },
    })
}

fn parse_pollutant_name(value: &str) -> RepoResult<Pollutant> {
    Pollutant::parse(value).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid pollutant `{value}` in pollutant_readings.name"
        ))
    })
}
