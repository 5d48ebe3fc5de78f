//! Piecewise-linear air-quality index calculator.
//!
//! # Responsibility
//! - Map one pollutant concentration to a sub-index via fixed breakpoint tables.
//! - Combine sub-indices into the overall index and its category.
//!
//! # Invariants
//! - Breakpoint tables are monotonically increasing per pollutant and end at
//!   index 300, so the ceiling always sits above the top band.
//! - Concentrations above the highest tabulated breakpoint clamp to
//!   `CEILING_INDEX` instead of extrapolating.
//! - Missing, non-finite or negative concentrations yield `None`; nothing here
//!   panics on input data.

use crate::model::observation::{Concentrations, Pollutant};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Sub-index reported for concentrations above every tabulated band.
pub const CEILING_INDEX: i32 = 301;

/// One `(conc_low, conc_high) -> (index_low, index_high)` band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub conc_low: f64,
    pub conc_high: f64,
    pub index_low: i32,
    pub index_high: i32,
}

const fn bp(conc_low: f64, conc_high: f64, index_low: i32, index_high: i32) -> Breakpoint {
    Breakpoint {
        conc_low,
        conc_high,
        index_low,
        index_high,
    }
}

const PM25: &[Breakpoint] = &[
    bp(0.0, 12.0, 0, 50),
    bp(12.1, 35.4, 51, 100),
    bp(35.5, 55.4, 101, 150),
    bp(55.5, 150.4, 151, 200),
    bp(150.5, 250.4, 201, 300),
];

const PM10: &[Breakpoint] = &[
    bp(0.0, 54.0, 0, 50),
    bp(55.0, 154.0, 51, 100),
    bp(155.0, 254.0, 101, 150),
    bp(255.0, 354.0, 151, 200),
    bp(355.0, 424.0, 201, 300),
];

const O3: &[Breakpoint] = &[
    bp(0.0, 0.054, 0, 50),
    bp(0.055, 0.070, 51, 100),
    bp(0.071, 0.085, 101, 150),
    bp(0.086, 0.105, 151, 200),
    bp(0.106, 0.200, 201, 300),
];

const NO2: &[Breakpoint] = &[
    bp(0.0, 53.0, 0, 50),
    bp(54.0, 100.0, 51, 100),
    bp(101.0, 360.0, 101, 150),
    bp(361.0, 649.0, 151, 200),
    bp(650.0, 1249.0, 201, 300),
];

const SO2: &[Breakpoint] = &[
    bp(0.0, 35.0, 0, 50),
    bp(36.0, 75.0, 51, 100),
    bp(76.0, 185.0, 101, 150),
    bp(186.0, 304.0, 151, 200),
    bp(305.0, 604.0, 201, 300),
];

const CO: &[Breakpoint] = &[
    bp(0.0, 4.4, 0, 50),
    bp(4.5, 9.4, 51, 100),
    bp(9.5, 12.4, 101, 150),
    bp(12.5, 15.4, 151, 200),
    bp(15.5, 30.4, 201, 300),
];

/// Returns the breakpoint table of one pollutant.
pub fn breakpoints(pollutant: Pollutant) -> &'static [Breakpoint] {
    match pollutant {
        Pollutant::Pm25 => PM25,
        Pollutant::Pm10 => PM10,
        Pollutant::O3 => O3,
        Pollutant::No2 => NO2,
        Pollutant::So2 => SO2,
        Pollutant::Co => CO,
    }
}

/// Computes the sub-index of one pollutant concentration.
///
/// The first band whose upper bound covers the value is interpolated, so a
/// value in the gap between two tabulated bands (e.g. pm2.5 `12.05`) falls
/// into the upper band. Rounding is half-to-even.
pub fn subindex(pollutant: Pollutant, concentration: Option<f64>) -> Option<i32> {
    let value = concentration?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    let table = breakpoints(pollutant);
    let Some(band) = table.iter().find(|band| value <= band.conc_high) else {
        return Some(CEILING_INDEX);
    };

    let slope = f64::from(band.index_high - band.index_low) / (band.conc_high - band.conc_low);
    let index = slope * (value - band.conc_low) + f64::from(band.index_low);
    Some(index.round_ties_even() as i32)
}

/// Sub-index of a raw text cell; blank or non-numeric text yields `None`.
pub fn subindex_str(pollutant: Pollutant, raw: &str) -> Option<i32> {
    subindex(pollutant, raw.trim().parse::<f64>().ok())
}

/// Overall index of a row: the worst (maximum) available sub-index.
pub fn overall_aqi(concentrations: &Concentrations) -> Option<i32> {
    concentrations
        .iter()
        .filter_map(|(pollutant, value)| subindex(pollutant, value))
        .max()
}

/// Health category band of an overall index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
    /// Index outside every band; surfaces calculation bugs.
    OutOfRange,
}

const CATEGORY_BANDS: &[(i32, i32, AqiCategory)] = &[
    (0, 50, AqiCategory::Good),
    (51, 100, AqiCategory::Moderate),
    (101, 150, AqiCategory::UnhealthyForSensitiveGroups),
    (151, 200, AqiCategory::Unhealthy),
    (201, 300, AqiCategory::VeryUnhealthy),
    (301, 500, AqiCategory::Hazardous),
];

impl AqiCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very Unhealthy",
            Self::Hazardous => "Hazardous",
            Self::OutOfRange => "Out of Range",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        CATEGORY_BANDS
            .iter()
            .map(|(_, _, category)| *category)
            .chain(std::iter::once(Self::OutOfRange))
            .find(|category| category.label() == label)
    }
}

impl Display for AqiCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Maps an overall index to its category band.
pub fn category(aqi: i32) -> AqiCategory {
    CATEGORY_BANDS
        .iter()
        .find(|(low, high, _)| (*low..=*high).contains(&aqi))
        .map_or(AqiCategory::OutOfRange, |(_, _, category)| *category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pm25_interpolates_within_first_band() {
        assert_eq!(subindex(Pollutant::Pm25, Some(10.0)), Some(42));
        assert_eq!(subindex(Pollutant::Pm25, Some(0.0)), Some(0));
        assert_eq!(subindex(Pollutant::Pm25, Some(12.0)), Some(50));
    }

    #[test]
    fn pm25_above_table_clamps_to_ceiling() {
        assert_eq!(subindex(Pollutant::Pm25, Some(500.0)), Some(CEILING_INDEX));
        assert_eq!(subindex(Pollutant::Pm25, Some(250.5)), Some(CEILING_INDEX));
    }

    #[test]
    fn gap_between_bands_uses_upper_band() {
        assert_eq!(subindex(Pollutant::Pm25, Some(12.05)), Some(51));
        assert_eq!(subindex(Pollutant::Pm10, Some(54.5)), Some(51));
    }

    #[test]
    fn ceiling_never_drops_below_top_band() {
        for pollutant in Pollutant::ALL {
            let top = breakpoints(pollutant)
                .last()
                .expect("every pollutant has a table");
            assert!(top.index_high < CEILING_INDEX, "{pollutant} tops out above ceiling");

            let at_edge = subindex(pollutant, Some(top.conc_high));
            let past_edge = subindex(pollutant, Some(top.conc_high + 0.001));
            let far_past = subindex(pollutant, Some(top.conc_high * 10.0));
            assert!(at_edge <= past_edge, "{pollutant} drops past the top band");
            assert_eq!(past_edge, Some(CEILING_INDEX));
            assert_eq!(far_past, Some(CEILING_INDEX));
        }
        assert_eq!(subindex(Pollutant::Pm10, Some(600.0)), Some(CEILING_INDEX));
    }

    #[test]
    fn other_pollutants_interpolate() {
        assert_eq!(subindex(Pollutant::Pm10, Some(73.0)), Some(60));
        assert_eq!(subindex(Pollutant::Co, Some(4.4)), Some(50));
        assert_eq!(subindex(Pollutant::No2, Some(100.0)), Some(100));
        assert_eq!(subindex(Pollutant::Pm10, Some(700.0)), Some(CEILING_INDEX));
    }

    #[test]
    fn missing_or_invalid_concentration_yields_none() {
        assert_eq!(subindex(Pollutant::Pm25, None), None);
        assert_eq!(subindex(Pollutant::Pm25, Some(f64::NAN)), None);
        assert_eq!(subindex(Pollutant::Pm25, Some(-1.0)), None);
        assert_eq!(subindex_str(Pollutant::O3, "  "), None);
        assert_eq!(subindex_str(Pollutant::O3, "n/a"), None);
        assert_eq!(subindex_str(Pollutant::Pm25, " 10 "), Some(42));
    }

    #[test]
    fn overall_aqi_takes_worst_pollutant() {
        let row = Concentrations {
            pm25: Some(10.0),
            pm10: Some(73.0),
            ..Concentrations::default()
        };
        assert_eq!(overall_aqi(&row), Some(60));
        assert_eq!(overall_aqi(&Concentrations::default()), None);
    }

    #[test]
    fn category_boundaries() {
        assert_eq!(category(0), AqiCategory::Good);
        assert_eq!(category(50), AqiCategory::Good);
        assert_eq!(category(51), AqiCategory::Moderate);
        assert_eq!(category(150), AqiCategory::UnhealthyForSensitiveGroups);
        assert_eq!(category(301), AqiCategory::Hazardous);
        assert_eq!(category(500), AqiCategory::Hazardous);
        assert_eq!(category(-5), AqiCategory::OutOfRange);
        assert_eq!(category(501).label(), "Out of Range");
    }

    #[test]
    fn category_labels_roundtrip() {
        for aqi in [0, 75, 120, 180, 250, 400, -1] {
            let cat = category(aqi);
            assert_eq!(AqiCategory::from_label(cat.label()), Some(cat));
        }
    }
}
