//! Burden table import.
//!
//! # Invariants
//! - Records are keyed by the configured source country; the file's own
//!   country column (if any) is only checked for consistency.
//! - Malformed rows are skipped one by one with a diagnostic.
//! - A source's previous records are replaced in one transaction.

use crate::ingest::archive::read_csv_table;
use crate::ingest::IngestResult;
use crate::model::burden::BurdenRecord;
use crate::normalize::registry::{SchemaError, BURDEN_V1};
use crate::normalize::{clean_cell, parse_number, RawTable};
use crate::repo::burden_repo::{BurdenRepository, SqliteBurdenRepository};
use log::{debug, info, warn};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

/// Burden rows accepted from one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BurdenTable {
    pub records: Vec<BurdenRecord>,
    pub skipped_rows: usize,
}

/// Summary of one burden source import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BurdenImportReport {
    pub country: String,
    pub inserted: usize,
    pub skipped_rows: usize,
}

/// Maps a raw burden table onto [`BurdenRecord`]s for `country`.
pub fn parse_burden_table(table: &RawTable, country: &str) -> Result<BurdenTable, SchemaError> {
    let columns = BURDEN_V1.resolve(&table.headers)?;
    let mut parsed = BurdenTable::default();

    for row in &table.rows {
        if row.values.iter().all(|value| clean_cell(value).is_none()) {
            continue;
        }
        if row.values.len() != columns.width() {
            warn!(
                "event=burden_row module=ingest status=skip country={country} line={} reason=column_count expected={} got={}",
                row.line,
                columns.width(),
                row.values.len()
            );
            parsed.skipped_rows += 1;
            continue;
        }

        let cell = |name: &str| columns.get(row, name).and_then(clean_cell);

        let Some(cause) = cell("cause") else {
            warn!(
                "event=burden_row module=ingest status=skip country={country} line={} reason=missing_cause",
                row.line
            );
            parsed.skipped_rows += 1;
            continue;
        };

        let year = cell("year")
            .and_then(|text| parse_number(&text))
            .filter(|value| value.fract() == 0.0 && (1000.0..=9999.0).contains(value));
        let Some(year) = year else {
            warn!(
                "event=burden_row module=ingest status=skip country={country} line={} reason=invalid_year",
                row.line
            );
            parsed.skipped_rows += 1;
            continue;
        };

        if let Some(row_country) = cell("country") {
            if !row_country.eq_ignore_ascii_case(country) {
                debug!(
                    "event=burden_row module=ingest status=note country={country} line={} row_country={row_country}",
                    row.line
                );
            }
        }

        parsed.records.push(BurdenRecord {
            country: country.to_string(),
            cause,
            year: year as i32,
            mean_value: cell("mean_value"),
            mean_lower_value: cell("mean_lower_value"),
            mean_upper_value: cell("mean_upper_value"),
            age_standardized_rate: cell("age_standardized_rate"),
            age_standardized_rate_lower: cell("age_standardized_rate_lower"),
            age_standardized_rate_upper: cell("age_standardized_rate_upper"),
        });
    }

    Ok(parsed)
}

/// Replaces the stored records of `country` with an already parsed table.
pub fn store_burden_table(
    conn: &mut Connection,
    country: &str,
    table: &BurdenTable,
) -> IngestResult<BurdenImportReport> {
    let tx = conn.transaction()?;
    let inserted = SqliteBurdenRepository::new(&tx).replace_country_records(country, &table.records)?;
    tx.commit()?;

    info!(
        "event=burden_import module=ingest status=ok country={country} inserted={inserted} skipped_rows={}",
        table.skipped_rows
    );
    Ok(BurdenImportReport {
        country: country.to_string(),
        inserted,
        skipped_rows: table.skipped_rows,
    })
}

/// Reads a burden CSV file and replaces the stored records of `country`.
pub fn import_burden_file(
    conn: &mut Connection,
    path: impl AsRef<Path>,
    country: &str,
) -> IngestResult<BurdenImportReport> {
    let raw = read_csv_table(path)?;
    let table = parse_burden_table(&raw, country)?;
    store_burden_table(conn, country, &table)
}

#[cfg(test)]
mod tests {
    use super::parse_burden_table;
    use crate::normalize::RawTable;

    fn table() -> RawTable {
        let mut table = RawTable::new(
            [
                "Country / Territory / Area",
                "GHE cause",
                "Year",
                "Mean value",
                "Mean lower value",
                "Mean upper value",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        );
        table.push_row(["China", "Stroke [1]", "2019", "10.5", "9.1", "12.0"]);
        table.push_row(["China", "Stroke", "2019"]);
        table.push_row(["", "", "", "", "", ""]);
        table.push_row(["China", "Asthma", "n/a", "1", "1", "1"]);
        table.push_row(["China", "", "2018", "1", "1", "1"]);
        table.push_row(["China", "COPD", "2018.0", "x", "1", "2"]);
        table
    }

    #[test]
    fn keeps_valid_rows_and_counts_skips() {
        let parsed = parse_burden_table(&table(), "China").unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped_rows, 3);

        let stroke = &parsed.records[0];
        assert_eq!(stroke.cause, "Stroke");
        assert_eq!(stroke.year, 2019);
        assert_eq!(stroke.mean_value.as_deref(), Some("10.5"));
        assert_eq!(stroke.age_standardized_rate, None);

        let copd = &parsed.records[1];
        assert_eq!(copd.year, 2018);
        assert_eq!(copd.mean_value.as_deref(), Some("x"));
    }

    #[test]
    fn missing_year_column_rejects_table() {
        let table = RawTable::new(vec!["GHE cause".to_string()]);
        assert!(parse_burden_table(&table, "France").is_err());
    }
}
