//! Merged series record produced by the source merger.

use crate::aqi::AqiCategory;
use crate::model::observation::{Concentrations, Source};
use crate::model::station::StationId;
use chrono::NaiveDateTime;

/// One row of the unified per-station series.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub station_id: StationId,
    pub datetime: NaiveDateTime,
    pub source: Source,
    pub concentrations: Concentrations,
    /// Max of the per-pollutant sub-indices.
    pub aqi: Option<i32>,
    pub category: Option<AqiCategory>,
}
