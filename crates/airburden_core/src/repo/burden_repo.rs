//! Burden record repository.
//!
//! # Invariants
//! - Records are replaced per country; a partial replace never commits
//!   because callers run it inside one transaction.

use crate::model::burden::BurdenRecord;
use crate::repo::RepoResult;
use rusqlite::{params, Connection};

/// Repository interface for externally supplied burden records.
pub trait BurdenRepository {
    /// Deletes every record of `country` and inserts `records`.
    /// Returns the number of inserted rows.
    fn replace_country_records(&self, country: &str, records: &[BurdenRecord])
        -> RepoResult<usize>;
    fn list_records(&self) -> RepoResult<Vec<BurdenRecord>>;
}

/// SQLite-backed burden repository.
pub struct SqliteBurdenRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBurdenRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl BurdenRepository for SqliteBurdenRepository<'_> {
    fn replace_country_records(
        &self,
        country: &str,
        records: &[BurdenRecord],
    ) -> RepoResult<usize> {
        self.conn
            .execute("DELETE FROM burden_records WHERE country = ?1;", [country])?;

        let mut stmt = self.conn.prepare(
            "INSERT INTO burden_records (
                country,
                cause,
                year,
                mean_value,
                mean_lower_value,
                mean_upper_value,
                age_standardized_rate,
                age_standardized_rate_lower,
                age_standardized_rate_upper
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        )?;
        for record in records {
            stmt.execute(params![
                record.country.as_str(),
                record.cause.as_str(),
                record.year,
                record.mean_value.as_deref(),
                record.mean_lower_value.as_deref(),
                record.mean_upper_value.as_deref(),
                record.age_standardized_rate.as_deref(),
                record.age_standardized_rate_lower.as_deref(),
                record.age_standardized_rate_upper.as_deref(),
            ])?;
        }
        Ok(records.len())
    }

    fn list_records(&self) -> RepoResult<Vec<BurdenRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                country,
                cause,
                year,
                mean_value,
                mean_lower_value,
                mean_upper_value,
                age_standardized_rate,
                age_standardized_rate_lower,
                age_standardized_rate_upper
             FROM burden_records
             ORDER BY id ASC;",
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(BurdenRecord {
                    country: row.get("country")?,
                    cause: row.get("cause")?,
                    year: row.get("year")?,
                    mean_value: row.get("mean_value")?,
                    mean_lower_value: row.get("mean_lower_value")?,
                    mean_upper_value: row.get("mean_upper_value")?,
                    age_standardized_rate: row.get("age_standardized_rate")?,
                    age_standardized_rate_lower: row.get("age_standardized_rate_lower")?,
                    age_standardized_rate_upper: row.get("age_standardized_rate_upper")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
