//! Burden-of-disease records and their join with yearly AQI.

use crate::model::station::StationId;

/// Externally supplied burden statistics for one country, cause and year.
///
/// Statistic fields hold the source text; they are converted to `f64` only
/// when the record is joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurdenRecord {
    pub country: String,
    pub cause: String,
    pub year: i32,
    pub mean_value: Option<String>,
    pub mean_lower_value: Option<String>,
    pub mean_upper_value: Option<String>,
    pub age_standardized_rate: Option<String>,
    pub age_standardized_rate_lower: Option<String>,
    pub age_standardized_rate_upper: Option<String>,
}

/// Burden statistics after numeric validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurdenStats {
    pub mean_value: f64,
    pub mean_lower_value: f64,
    pub mean_upper_value: f64,
    pub age_standardized_rate: f64,
    pub age_standardized_rate_lower: f64,
    pub age_standardized_rate_upper: f64,
}

/// Mean overall AQI of one station for one calendar year.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearlyAqi {
    pub station_id: StationId,
    pub year: i32,
    pub avg_aqi: f64,
}

/// Output row of the burden joiner.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedBurdenAqi {
    pub station_id: StationId,
    pub year: i32,
    pub country: String,
    pub cause: String,
    pub stats: BurdenStats,
    pub avg_aqi: f64,
}
