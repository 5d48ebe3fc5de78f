//! Station repository.
//!
//! # Invariants
//! - Stations are insert-if-absent by unique `name` and never updated.

use crate::model::station::{NewStation, Station, StationId};
use crate::repo::RepoResult;
use rusqlite::{params, Connection, OptionalExtension, Row};

const STATION_SELECT_SQL: &str = "SELECT
    id,
    name,
    city,
    country,
    latitude,
    longitude
FROM stations";

/// Repository interface for station lookups and registration.
pub trait StationRepository {
    /// Returns the id of the station named `station.name`, creating it first
    /// when absent. Existing rows keep their original attributes.
    fn ensure_station(&self, station: &NewStation) -> RepoResult<StationId>;
    fn get_station_by_name(&self, name: &str) -> RepoResult<Option<Station>>;
    fn list_stations(&self) -> RepoResult<Vec<Station>>;
}

/// SQLite-backed station repository.
pub struct SqliteStationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl StationRepository for SqliteStationRepository<'_> {
    fn ensure_station(&self, station: &NewStation) -> RepoResult<StationId> {
        self.conn.execute(
            "INSERT OR IGNORE INTO stations (name, city, country, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                station.name.as_str(),
                station.city.as_str(),
                station.country.as_str(),
                station.latitude,
                station.longitude,
            ],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM stations WHERE name = ?1;",
            [station.name.as_str()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_station_by_name(&self, name: &str) -> RepoResult<Option<Station>> {
        let station = self
            .conn
            .query_row(
                &format!("{STATION_SELECT_SQL} WHERE name = ?1;"),
                [name],
                parse_station_row,
            )
            .optional()?;
        Ok(station)
    }

    fn list_stations(&self) -> RepoResult<Vec<Station>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{STATION_SELECT_SQL} ORDER BY id ASC;"))?;
        let stations = stmt
            .query_map([], parse_station_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stations)
    }
}

fn parse_station_row(row: &Row<'_>) -> rusqlite::Result<Station> {
    Ok(Station {
        id: row.get("id")?,
        name: row.get("name")?,
        city: row.get("city")?,
        country: row.get("country")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
    })
}
