//! Pipeline orchestrator.
//!
//! # Responsibility
//! - Run the stages strictly in sequence: live ingestion, burden import,
//!   deduplication, merge, burden join.
//! - Isolate per-city and per-file failures; abort only on store failures.
//!
//! # Invariants
//! - Each stage commits before the next one starts.
//! - Every log line of a run carries the same `run_id`.
//! - Nothing is retried automatically; retryable failures are reported.

use crate::config::{BurdenSource, ConfigError, PipelineConfig};
use crate::db::DbError;
use crate::ingest::archive::read_csv_table;
use crate::ingest::burden::{import_burden_file, BurdenImportReport};
use crate::ingest::feed::{FeedClient, FeedError};
use crate::ingest::live::{store_feed_reading, IngestOutcome};
use crate::ingest::IngestError;
use crate::logging::{sanitize_message, MAX_LOGGED_ERROR_CHARS};
use crate::normalize::registry::SchemaError;
use crate::repo::station_repo::{SqliteStationRepository, StationRepository};
use crate::repo::RepoError;
use crate::stage::dedup::{remove_duplicate_observations, DedupReport};
use crate::stage::join::{run_burden_join, JoinReport};
use crate::stage::merge::{run_merge, MergeReport, StationArchive};
use log::{error, info, warn};
use rusqlite::Connection;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// How a caller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient connectivity or lock contention; a later run may succeed.
    Retryable,
    /// Affects one unit (city, file, row); the run continues.
    Skippable,
    /// The run cannot proceed.
    Fatal,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::Skippable => "skippable",
            Self::Fatal => "fatal",
        }
    }
}

#[derive(Debug)]
pub enum PipelineError {
    Config(ConfigError),
    Db(DbError),
    Repo(RepoError),
    Feed(FeedError),
    Ingest(IngestError),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_) => ErrorClass::Fatal,
            Self::Db(err) if err.is_busy() => ErrorClass::Retryable,
            Self::Db(_) => ErrorClass::Fatal,
            Self::Repo(err) => repo_class(err),
            Self::Feed(FeedError::Transport(_)) => ErrorClass::Retryable,
            Self::Feed(_) => ErrorClass::Skippable,
            Self::Ingest(IngestError::Io { .. } | IngestError::Csv(_)) => ErrorClass::Skippable,
            Self::Ingest(IngestError::Schema(_)) => ErrorClass::Fatal,
            Self::Ingest(IngestError::Repo(err)) => repo_class(err),
        }
    }

    /// Failures of the store itself; a unit-level loop must not swallow these.
    pub fn is_store_failure(&self) -> bool {
        match self {
            Self::Db(_) => true,
            Self::Repo(err) | Self::Ingest(IngestError::Repo(err)) => {
                matches!(err, RepoError::Db(_) | RepoError::MissingRequiredTable(_))
            }
            _ => false,
        }
    }
}

fn repo_class(err: &RepoError) -> ErrorClass {
    match err {
        RepoError::Db(db) if db.is_busy() => ErrorClass::Retryable,
        RepoError::Db(_) | RepoError::MissingRequiredTable(_) => ErrorClass::Fatal,
        RepoError::Validation(_) | RepoError::InvalidData(_) => ErrorClass::Skippable,
    }
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Feed(err) => write!(f, "{err}"),
            Self::Ingest(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Feed(err) => Some(err),
            Self::Ingest(err) => Some(err),
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for PipelineError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for PipelineError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<FeedError> for PipelineError {
    fn from(value: FeedError) -> Self {
        Self::Feed(value)
    }
}

impl From<IngestError> for PipelineError {
    fn from(value: IngestError) -> Self {
        Self::Ingest(value)
    }
}

impl From<SchemaError> for PipelineError {
    fn from(value: SchemaError) -> Self {
        Self::Ingest(IngestError::Schema(value))
    }
}

/// Live ingestion totals over all configured cities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LiveIngestReport {
    pub inserted: usize,
    pub already_present: usize,
    pub readings: usize,
    pub failed: usize,
}

/// Burden import totals over all configured sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BurdenImportSummary {
    pub imported: Vec<BurdenImportReport>,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub live: LiveIngestReport,
    pub burden: BurdenImportSummary,
    pub dedup: DedupReport,
    pub merge: MergeReport,
    pub join: JoinReport,
}

/// Runs pipeline stages against one store connection.
pub struct Pipeline<'conn> {
    conn: &'conn mut Connection,
    config: PipelineConfig,
    run_id: Uuid,
}

impl<'conn> Pipeline<'conn> {
    pub fn new(conn: &'conn mut Connection, config: PipelineConfig) -> Self {
        Self {
            conn,
            config,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage in order.
    pub fn run(&mut self, client: &impl FeedClient) -> PipelineResult<PipelineReport> {
        let started_at = Instant::now();
        info!(
            "event=pipeline_run module=service status=start run_id={} cities={} stations={} burden_sources={}",
            self.run_id,
            self.config.cities.len(),
            self.config.stations.len(),
            self.config.burden_sources.len()
        );

        let result = self.run_stages(client);
        match &result {
            Ok(_) => info!(
                "event=pipeline_run module=service status=ok run_id={} duration_ms={}",
                self.run_id,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=pipeline_run module=service status=error run_id={} class={} error={}",
                self.run_id,
                err.class().as_str(),
                sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
            ),
        }
        result
    }

    fn run_stages(&mut self, client: &impl FeedClient) -> PipelineResult<PipelineReport> {
        let live = self.ingest_live(client)?;
        let burden = self.import_burden()?;
        let dedup = self.dedup()?;
        let merge = self.merge()?;
        let join = self.join()?;
        Ok(PipelineReport {
            run_id: self.run_id,
            live,
            burden,
            dedup,
            merge,
            join,
        })
    }

    /// Fetches and stores one reading per configured city.
    pub fn ingest_live(&mut self, client: &impl FeedClient) -> PipelineResult<LiveIngestReport> {
        let mut report = LiveIngestReport::default();
        for city in &self.config.cities {
            let outcome = match client.fetch(city) {
                Ok(reading) => store_feed_reading(self.conn, &reading).map_err(PipelineError::from),
                Err(err) => Err(PipelineError::from(err)),
            };

            match outcome {
                Ok(IngestOutcome::Inserted {
                    station_id,
                    readings,
                    ..
                }) => {
                    info!(
                        "event=live_ingest module=service status=ok run_id={} city={} station_id={} readings={}",
                        self.run_id, city, station_id, readings
                    );
                    report.inserted += 1;
                    report.readings += readings;
                }
                Ok(IngestOutcome::AlreadyPresent { station_id, .. }) => {
                    info!(
                        "event=live_ingest module=service status=already_present run_id={} city={} station_id={}",
                        self.run_id, city, station_id
                    );
                    report.already_present += 1;
                }
                Err(err) if err.is_store_failure() => return Err(err),
                Err(err) => {
                    warn!(
                        "event=live_ingest module=service status=error run_id={} city={} class={} error={}",
                        self.run_id,
                        city,
                        err.class().as_str(),
                        sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Imports every configured burden table, replacing prior records per country.
    pub fn import_burden(&mut self) -> PipelineResult<BurdenImportSummary> {
        let mut summary = BurdenImportSummary::default();
        let sources = self.config.burden_sources.clone();
        for source in &sources {
            match self.import_burden_source(source) {
                Ok(report) => summary.imported.push(report),
                Err(err) if err.is_store_failure() => return Err(err),
                Err(err) => {
                    warn!(
                        "event=burden_import module=service status=error run_id={} country={} path={} class={} error={}",
                        self.run_id,
                        source.country,
                        source.path.display(),
                        err.class().as_str(),
                        sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
                    );
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Imports one burden table, replacing the prior records of its country.
    pub fn import_burden_source(
        &mut self,
        source: &BurdenSource,
    ) -> PipelineResult<BurdenImportReport> {
        Ok(import_burden_file(self.conn, &source.path, &source.country)?)
    }

    pub fn dedup(&mut self) -> PipelineResult<DedupReport> {
        Ok(remove_duplicate_observations(self.conn)?)
    }

    /// Merges live and archive series of the configured stations.
    ///
    /// Without configured stations every stored station is merged from its
    /// live rows alone.
    pub fn merge(&mut self) -> PipelineResult<MergeReport> {
        let archives = self.load_archives()?;
        Ok(run_merge(self.conn, &archives)?)
    }

    pub fn join(&mut self) -> PipelineResult<JoinReport> {
        Ok(run_burden_join(self.conn, &self.config.country_stations)?)
    }

    fn load_archives(&self) -> PipelineResult<Vec<StationArchive>> {
        if self.config.stations.is_empty() {
            let stations = SqliteStationRepository::new(&*self.conn).list_stations()?;
            return Ok(stations
                .into_iter()
                .map(|station| StationArchive {
                    station_id: station.id,
                    table: None,
                })
                .collect());
        }

        let mut archives = Vec::with_capacity(self.config.stations.len());
        for station in &self.config.stations {
            let table = match station.archive_path.as_ref() {
                None => None,
                Some(path) => match read_csv_table(path) {
                    Ok(table) => Some(table),
                    Err(err) => {
                        warn!(
                            "event=archive_read module=service status=skip run_id={} station_id={} path={} error={}",
                            self.run_id,
                            station.station_id,
                            path.display(),
                            sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
                        );
                        None
                    }
                },
            };
            archives.push(StationArchive {
                station_id: station.station_id,
                table,
            });
        }
        Ok(archives)
    }
}
