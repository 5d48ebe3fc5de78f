//! Observation and pollutant reading model.
//!
//! # Invariants
//! - A pollutant reading value is finite and within `[0, 1000]`; larger values
//!   are sensor artifacts and are clamped at construction.
//! - `Source` is the provenance tag of a row and is never inferred.

use crate::model::station::StationId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ObservationId = i64;

/// Upper clamp for pollutant concentrations.
pub const MAX_POLLUTANT_VALUE: f64 = 1000.0;

/// The six tracked pollutants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pollutant {
    Pm25,
    Pm10,
    O3,
    No2,
    So2,
    Co,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::O3,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::Co,
    ];

    /// Stable storage/column name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pm25 => "pm25",
            Self::Pm10 => "pm10",
            Self::O3 => "o3",
            Self::No2 => "no2",
            Self::So2 => "so2",
            Self::Co => "co",
        }
    }

    /// Parses a pollutant code leniently (`PM2.5`, `pm_25`, ` pm25 `).
    pub fn parse(value: &str) -> Option<Self> {
        let key: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '.'))
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| p.as_str() == key)
    }
}

impl Display for Pollutant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of an observation or merged row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Upstream live feed.
    Live,
    /// Historical CSV archive.
    Csv,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Csv => "csv",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "live" => Some(Self::Live),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// Optional weather attributes reported alongside an observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind: Option<f64>,
}

/// One station reading at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: ObservationId,
    pub station_id: StationId,
    pub datetime: NaiveDateTime,
    /// Index as reported by the upstream feed.
    pub aqi: Option<i32>,
    /// Informational label from the feed; never derived locally.
    pub dominant_pollutant: Option<String>,
    pub source: Source,
    pub weather: Weather,
}

/// Invalid pollutant reading input.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingValidationError {
    NonFinite { pollutant: Pollutant },
}

impl Display for ReadingValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite { pollutant } => {
                write!(f, "reading for {pollutant} is not a finite number")
            }
        }
    }
}

impl Error for ReadingValidationError {}

/// One pollutant value attached to an observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollutantReading {
    pub pollutant: Pollutant,
    pub value: f64,
}

impl PollutantReading {
    /// Builds a reading, clamping the value into `[0, MAX_POLLUTANT_VALUE]`.
    pub fn new(pollutant: Pollutant, value: f64) -> Result<Self, ReadingValidationError> {
        if !value.is_finite() {
            return Err(ReadingValidationError::NonFinite { pollutant });
        }
        Ok(Self {
            pollutant,
            value: value.clamp(0.0, MAX_POLLUTANT_VALUE),
        })
    }
}

/// Per-pollutant concentrations of one row; `None` marks a missing value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Concentrations {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
}

impl Concentrations {
    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        match pollutant {
            Pollutant::Pm25 => self.pm25,
            Pollutant::Pm10 => self.pm10,
            Pollutant::O3 => self.o3,
            Pollutant::No2 => self.no2,
            Pollutant::So2 => self.so2,
            Pollutant::Co => self.co,
        }
    }

    pub fn set(&mut self, pollutant: Pollutant, value: Option<f64>) {
        let slot = match pollutant {
            Pollutant::Pm25 => &mut self.pm25,
            Pollutant::Pm10 => &mut self.pm10,
            Pollutant::O3 => &mut self.o3,
            Pollutant::No2 => &mut self.no2,
            Pollutant::So2 => &mut self.so2,
            Pollutant::Co => &mut self.co,
        };
        *slot = value;
    }

    /// Iterates `(pollutant, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Pollutant, Option<f64>)> + '_ {
        Pollutant::ALL.into_iter().map(|p| (p, self.get(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::{Concentrations, Pollutant, PollutantReading, ReadingValidationError, Source};

    #[test]
    fn pollutant_parse_is_lenient_about_case_and_separators() {
        assert_eq!(Pollutant::parse("PM2.5"), Some(Pollutant::Pm25));
        assert_eq!(Pollutant::parse(" pm_10 "), Some(Pollutant::Pm10));
        assert_eq!(Pollutant::parse("CO"), Some(Pollutant::Co));
        assert_eq!(Pollutant::parse("t"), None);
    }

    #[test]
    fn reading_values_are_clamped() {
        let high = PollutantReading::new(Pollutant::Pm10, 2500.0).unwrap();
        assert_eq!(high.value, 1000.0);
        let negative = PollutantReading::new(Pollutant::O3, -3.0).unwrap();
        assert_eq!(negative.value, 0.0);
        let err = PollutantReading::new(Pollutant::Co, f64::NAN).unwrap_err();
        assert_eq!(
            err,
            ReadingValidationError::NonFinite {
                pollutant: Pollutant::Co
            }
        );
    }

    #[test]
    fn concentrations_get_and_set_follow_pollutant() {
        let mut values = Concentrations::default();
        values.set(Pollutant::So2, Some(4.0));
        assert_eq!(values.so2, Some(4.0));
        assert_eq!(values.get(Pollutant::So2), Some(4.0));
        assert_eq!(values.iter().filter(|(_, v)| v.is_some()).count(), 1);
    }

    #[test]
    fn source_tags_roundtrip_through_text() {
        assert_eq!(Source::parse(Source::Csv.as_str()), Some(Source::Csv));
        assert_eq!(Source::parse("waqi"), None);
    }
}
