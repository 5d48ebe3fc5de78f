//! Pipeline configuration file.
//!
//! # Responsibility
//! - Load the JSON run configuration and fill defaults.
//! - Reject configurations the stages cannot run against.
//!
//! # Invariants
//! - Station ids are unique across `stations`.
//! - Every `country_stations` target names a configured station.
//! - The feed token itself never lives in the file; only the name of the
//!   environment variable that holds it.

use crate::model::station::StationId;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_FEED_BASE_URL: &str = "https://api.waqi.info";
pub const DEFAULT_TOKEN_ENV: &str = "WAQI_TOKEN";
pub const DEFAULT_FEED_TIMEOUT_SECS: u64 = 20;

/// Country name -> station id used by the burden join.
pub type CountryStations = BTreeMap<String, StationId>;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    EmptyDatabasePath,
    DuplicateStation(StationId),
    UnknownMappedStation {
        country: String,
        station_id: StationId,
    },
    MissingToken(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config `{}`: {source}", path.display())
            }
            Self::EmptyDatabasePath => write!(f, "database_path cannot be empty"),
            Self::DuplicateStation(id) => write!(f, "station id {id} is configured twice"),
            Self::UnknownMappedStation {
                country,
                station_id,
            } => write!(
                f,
                "country `{country}` maps to unconfigured station id {station_id}"
            ),
            Self::MissingToken(var) => {
                write!(f, "feed token environment variable `{var}` is not set")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Upstream feed settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    /// Environment variable holding the API token.
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FEED_BASE_URL.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            timeout_secs: DEFAULT_FEED_TIMEOUT_SECS,
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reads the token from the configured environment variable.
    pub fn token_from_env(&self) -> Result<String, ConfigError> {
        match std::env::var(&self.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(ConfigError::MissingToken(self.token_env.clone())),
        }
    }
}

/// Merge target: a station plus its optional historical archive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StationConfig {
    pub station_id: StationId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub archive_path: Option<PathBuf>,
}

/// One burden table and the country its rows describe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BurdenSource {
    pub country: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineConfig {
    pub database_path: PathBuf,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub stations: Vec<StationConfig>,
    #[serde(default)]
    pub burden_sources: Vec<BurdenSource>,
    #[serde(default)]
    pub country_stations: CountryStations,
}

impl PipelineConfig {
    /// Reads, parses and validates a config file.
    ///
    /// Relative `database_path`, `archive_path` and burden `path` entries are
    /// resolved against the directory containing the config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        let mut seen = HashSet::new();
        for station in &self.stations {
            if !seen.insert(station.station_id) {
                return Err(ConfigError::DuplicateStation(station.station_id));
            }
        }

        for (country, station_id) in &self.country_stations {
            if !seen.contains(station_id) {
                return Err(ConfigError::UnknownMappedStation {
                    country: country.clone(),
                    station_id: *station_id,
                });
            }
        }
        Ok(())
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() && !path.as_os_str().is_empty() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.database_path);
        for station in &mut self.stations {
            if let Some(archive) = station.archive_path.as_mut() {
                resolve(archive);
            }
        }
        for source in &mut self.burden_sources {
            resolve(&mut source.path);
        }
    }
}
