//! CSV archive reader.
//!
//! Produces [`RawTable`]s with verbatim headers and cells; typing and column
//! matching happen later against a column registry.

use crate::ingest::{IngestError, IngestResult};
use crate::normalize::{RawRow, RawTable};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Reads a CSV file into a raw table.
pub fn read_csv_table(path: impl AsRef<Path>) -> IngestResult<RawTable> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_csv_from(file)
}

/// Reads CSV from any reader into a raw table.
///
/// Rows with a different field count than the header are kept as read; the
/// consumer decides whether to skip them.
pub fn read_csv_from<R: Read>(reader: R) -> IngestResult<RawTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').to_string())
        .collect();
    let mut table = RawTable::new(headers);

    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |position| position.line());
        table.rows.push(RawRow {
            line,
            values: record.iter().map(str::to_string).collect(),
        });
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::{read_csv_from, read_csv_table};
    use crate::ingest::IngestError;

    #[test]
    fn reads_headers_and_ragged_rows() {
        let data = "\u{feff}date, pm25, pm10\n2020/1/1, 55, 20\n2020/1/2, 60\n";
        let table = read_csv_from(data.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["date", " pm25", " pm10"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(table.rows[1].values.len(), 2);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_csv_table("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }));
        assert!(err.to_string().contains("here.csv"));
    }
}
