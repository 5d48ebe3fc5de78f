//! Row normalization shared by the historical and burden domains.
//!
//! # Responsibility
//! - Hold header→value tables exactly as read from a source file.
//! - Coerce text cells into typed values (numbers, timestamps) without
//!   failing the whole table on one bad cell.
//!
//! # Invariants
//! - Blank or non-numeric numeric cells become `None`, never `0`.
//! - Cell cleanup removes bracketed annotations and collapses whitespace.

pub mod registry;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("valid bracket regex"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// One data row with its 1-based source line for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub line: u64,
    pub values: Vec<String>,
}

/// A table read from a source file, headers kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Appends a row; its line number is its position after the header line.
    pub fn push_row<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let line = self.rows.len() as u64 + 2;
        self.rows.push(RawRow {
            line,
            values: values.into_iter().map(Into::into).collect(),
        });
    }
}

/// Removes bracketed annotations, non-breaking spaces and whitespace runs.
/// Returns `None` for cells that end up empty.
pub fn clean_cell(raw: &str) -> Option<String> {
    let without_brackets = BRACKETED.replace_all(raw, "");
    let spaced = without_brackets.replace('\u{a0}', " ");
    let collapsed = WHITESPACE_RUN.replace_all(&spaced, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses a numeric cell; blank, non-numeric and non-finite text is `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parses a timestamp cell in any of the accepted layouts.
///
/// Date-only values map to midnight. RFC 3339 values are converted to their
/// naive UTC instant.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATETIME_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(value);
        }
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(value.naive_utc());
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{clean_cell, parse_number, parse_timestamp, RawTable};
    use chrono::NaiveDate;

    #[test]
    fn clean_cell_strips_annotations_and_whitespace() {
        assert_eq!(
            clean_cell("  Lower respiratory\u{a0}infections [a]  "),
            Some("Lower respiratory infections".to_string())
        );
        assert_eq!(clean_cell(" [note] "), None);
        assert_eq!(clean_cell(""), None);
    }

    #[test]
    fn parse_number_coerces_bad_cells_to_none() {
        assert_eq!(parse_number(" 12.5 "), Some(12.5));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("  "), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn parse_timestamp_accepts_archive_layouts() {
        let midnight = NaiveDate::from_ymd_opt(2019, 3, 7)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2019/3/7"), Some(midnight));
        assert_eq!(parse_timestamp("2019-03-07"), Some(midnight));
        assert_eq!(parse_timestamp("07/03/2019"), Some(midnight));
        assert_eq!(
            parse_timestamp("2019-03-07 13:00:00"),
            NaiveDate::from_ymd_opt(2019, 3, 7)
                .unwrap()
                .and_hms_opt(13, 0, 0)
        );
        assert_eq!(
            parse_timestamp("2019-03-07T13:00:00+02:00"),
            NaiveDate::from_ymd_opt(2019, 3, 7)
                .unwrap()
                .and_hms_opt(11, 0, 0)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn raw_table_numbers_rows_after_header() {
        let mut table = RawTable::new(vec!["date".to_string()]);
        table.push_row(["2020-01-01"]);
        table.push_row(["2020-01-02"]);
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(table.rows[1].line, 3);
    }
}
