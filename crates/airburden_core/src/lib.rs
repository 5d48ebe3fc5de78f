//! Core pipeline for airburden.
//! This crate is the single source of truth for reconciliation and index
//! invariants: deduplication, AQI computation, source merge, burden join.

pub mod aqi;
pub mod config;
pub mod db;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod repo;
pub mod service;
pub mod stage;

pub use aqi::{category, overall_aqi, subindex, AqiCategory};
pub use config::{ConfigError, CountryStations, PipelineConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use ingest::feed::{FeedClient, FeedError, FeedReading, WaqiClient};
pub use logging::{default_log_level, init_logging, logging_status};
pub use repo::{RepoError, RepoResult};
pub use service::pipeline::{ErrorClass, Pipeline, PipelineError, PipelineReport};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
