//! Repository layer over the durable tables.
//!
//! # Responsibility
//! - Keep SQL for stations, observations, pollutant readings and burden
//!   records inside one persistence boundary.
//! - Return semantic errors in addition to DB transport errors.
//!
//! # Invariants
//! - Repositories never open or commit transactions themselves; callers
//!   scope writes by handing in a `Transaction` (it derefs to `Connection`).
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::observation::ReadingValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod burden_repo;
pub mod observation_repo;
pub mod station_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ReadingValidationError),
    Db(DbError),
    InvalidData(String),
    MissingRequiredTable(&'static str),
}

impl RepoError {
    /// Whether the underlying store reported a transient busy/locked state.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
            Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<ReadingValidationError> for RepoError {
    fn from(value: ReadingValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
