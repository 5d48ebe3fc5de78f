//! Persistence of decoded live readings.

use crate::ingest::feed::FeedReading;
use crate::model::observation::{ObservationId, Source};
use crate::model::station::StationId;
use crate::repo::observation_repo::{
    NewObservation, ObservationRepository, SqliteObservationRepository,
};
use crate::repo::station_repo::{SqliteStationRepository, StationRepository};
use crate::repo::RepoResult;
use log::info;
use rusqlite::Connection;

/// Result of storing one live reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted {
        station_id: StationId,
        observation_id: ObservationId,
        readings: usize,
    },
    /// An observation for the same station and time already exists.
    AlreadyPresent {
        station_id: StationId,
        observation_id: ObservationId,
    },
}

/// Stores one live reading in a single transaction.
///
/// The station is registered when absent. A reading whose (station, time)
/// key is already stored is a no-op, not an error.
pub fn store_feed_reading(conn: &mut Connection, reading: &FeedReading) -> RepoResult<IngestOutcome> {
    let tx = conn.transaction()?;
    let outcome = {
        let stations = SqliteStationRepository::new(&tx);
        let observations = SqliteObservationRepository::new(&tx);

        let station_id = stations.ensure_station(&reading.station)?;
        if let Some(observation_id) =
            observations.find_observation(station_id, &reading.observed_at)?
        {
            IngestOutcome::AlreadyPresent {
                station_id,
                observation_id,
            }
        } else {
            let observation_id = observations.insert_observation(&NewObservation {
                station_id,
                datetime: reading.observed_at,
                aqi: reading.aqi,
                dominant_pollutant: reading.dominant_pollutant.clone(),
                source: Source::Live,
                weather: reading.weather,
            })?;
            for pollutant_reading in &reading.readings {
                observations.insert_reading(observation_id, pollutant_reading)?;
            }
            IngestOutcome::Inserted {
                station_id,
                observation_id,
                readings: reading.readings.len(),
            }
        }
    };
    tx.commit()?;

    match outcome {
        IngestOutcome::Inserted {
            station_id,
            observation_id,
            readings,
        } => info!(
            "event=live_store module=ingest status=ok station_id={station_id} observation_id={observation_id} readings={readings}"
        ),
        IngestOutcome::AlreadyPresent {
            station_id,
            observation_id,
        } => info!(
            "event=live_store module=ingest status=skip reason=already_present station_id={station_id} observation_id={observation_id}"
        ),
    }
    Ok(outcome)
}
