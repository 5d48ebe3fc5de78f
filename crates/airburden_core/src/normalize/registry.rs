//! Versioned column registries per data domain.
//!
//! Incoming tables are validated against a registry fixed at build time
//! instead of deriving schema from file headers.
//!
//! # Invariants
//! - Header matching is case-insensitive and ignores spaces, `_`, `.`, `-`,
//!   `/` and bracketed annotations.
//! - A missing `required` column rejects the whole table; a missing optional
//!   column reads as an empty cell.

use crate::normalize::{RawRow, BRACKETED};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Data domain a registry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Live,
    Historical,
    Burden,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Historical => "historical",
            Self::Burden => "burden",
        }
    }
}

/// One logical column and the header spellings that map to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub required: bool,
}

const fn required(name: &'static str, aliases: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec {
        name,
        aliases,
        required: true,
    }
}

const fn optional(name: &'static str, aliases: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec {
        name,
        aliases,
        required: false,
    }
}

/// Column registry of one domain at one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRegistry {
    pub domain: Domain,
    pub version: u32,
    pub columns: &'static [ColumnSpec],
}

/// Unified merged-series columns; both merge inputs are normalized to these.
pub const LIVE_V1: ColumnRegistry = ColumnRegistry {
    domain: Domain::Live,
    version: 1,
    columns: &[
        required("station_id", &[]),
        required("datetime", &["time"]),
        required("source", &[]),
        optional("pm25", &["pm2.5"]),
        optional("pm10", &[]),
        optional("o3", &["ozone"]),
        optional("no2", &[]),
        optional("so2", &[]),
        optional("co", &[]),
    ],
};

pub const HISTORICAL_V1: ColumnRegistry = ColumnRegistry {
    domain: Domain::Historical,
    version: 1,
    columns: &[
        required("date", &["datetime", "timestamp"]),
        optional("pm25", &["pm2.5"]),
        optional("pm10", &[]),
        optional("o3", &["ozone"]),
        optional("no2", &[]),
        optional("so2", &[]),
        optional("co", &[]),
    ],
};

pub const BURDEN_V1: ColumnRegistry = ColumnRegistry {
    domain: Domain::Burden,
    version: 1,
    columns: &[
        optional(
            "country",
            &["country__territory__area", "country_territory_area", "location"],
        ),
        required("cause", &["ghe_cause", "cause_name"]),
        required("year", &[]),
        optional("mean_value", &["mean"]),
        optional("mean_lower_value", &["mean_lower"]),
        optional("mean_upper_value", &["mean_upper"]),
        optional("age_standardized_rate", &["age_standardised_rate"]),
        optional(
            "age_standardized_rate_lower",
            &["age_standardized_rate_lower_value", "age_standardised_rate_lower_value"],
        ),
        optional(
            "age_standardized_rate_upper",
            &["age_standardized_rate_upper_value", "age_standardised_rate_upper_value"],
        ),
    ],
};

/// A table whose headers do not satisfy a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    MissingColumn {
        domain: Domain,
        column: &'static str,
    },
    AmbiguousColumn {
        domain: Domain,
        column: &'static str,
    },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn { domain, column } => write!(
                f,
                "{} table is missing required column `{column}`",
                domain.as_str()
            ),
            Self::AmbiguousColumn { domain, column } => write!(
                f,
                "{} table has more than one header matching `{column}`",
                domain.as_str()
            ),
        }
    }
}

impl Error for SchemaError {}

/// Canonical comparison key of a header.
pub fn normalize_header(raw: &str) -> String {
    BRACKETED
        .replace_all(raw, "")
        .replace('&', "and")
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '.' | '-' | '/' | '(' | ')' | '\u{a0}'))
        .collect::<String>()
        .to_lowercase()
}

impl ColumnRegistry {
    /// Resolves logical columns against verbatim headers.
    pub fn resolve(&self, headers: &[String]) -> Result<ColumnMap, SchemaError> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut indices = HashMap::new();

        for spec in self.columns {
            let keys: Vec<String> = std::iter::once(spec.name)
                .chain(spec.aliases.iter().copied())
                .map(normalize_header)
                .collect();
            let matches: Vec<usize> = normalized
                .iter()
                .enumerate()
                .filter(|(_, header)| keys.contains(header))
                .map(|(index, _)| index)
                .collect();

            match matches.as_slice() {
                [] if spec.required => {
                    return Err(SchemaError::MissingColumn {
                        domain: self.domain,
                        column: spec.name,
                    });
                }
                [] => {}
                [index] => {
                    indices.insert(spec.name, *index);
                }
                _ => {
                    return Err(SchemaError::AmbiguousColumn {
                        domain: self.domain,
                        column: spec.name,
                    });
                }
            }
        }

        Ok(ColumnMap {
            indices,
            width: headers.len(),
        })
    }
}

/// Logical column → position mapping produced by [`ColumnRegistry::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    indices: HashMap<&'static str, usize>,
    width: usize,
}

impl ColumnMap {
    /// Number of headers in the resolved table.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn contains(&self, column: &str) -> bool {
        self.indices.contains_key(column)
    }

    /// Cell of `column` in `row`; `None` when the column is absent from the
    /// table or the row is too short.
    pub fn get<'row>(&self, row: &'row RawRow, column: &str) -> Option<&'row str> {
        let index = *self.indices.get(column)?;
        row.values.get(index).map(String::as_str)
    }
}
