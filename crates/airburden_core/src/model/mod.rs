//! Domain model for stations, observations and derived pipeline records.
//!
//! # Responsibility
//! - Define canonical data structures shared by ingestion, stages and storage.
//! - Keep value invariants (pollutant clamping, provenance tags) in one place.
//!
//! # Invariants
//! - Timestamps are second-precision `NaiveDateTime` values and are stored as
//!   `YYYY-MM-DD HH:MM:SS` text, so text ordering equals time ordering.
//! - Derived records (`MergedRecord`, `JoinedBurdenAqi`) are rebuildable and
//!   never updated in place.

pub mod burden;
pub mod merged;
pub mod observation;
pub mod station;

use chrono::NaiveDateTime;

/// Storage format for observation and merged-series timestamps.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats a timestamp the way it is stored.
pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// Parses a stored timestamp.
pub fn parse_stored_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).ok()
}
