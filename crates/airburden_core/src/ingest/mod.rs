//! Ingestion collaborators feeding the pipeline.
//!
//! # Responsibility
//! - Fetch live readings from the upstream feed and persist them.
//! - Read historical archives and burden tables from CSV into raw tables.
//!
//! # Invariants
//! - Nothing here retries; callers log a failure and skip the unit.

use crate::normalize::registry::SchemaError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod archive;
pub mod burden;
pub mod feed;
pub mod live;

pub type IngestResult<T> = Result<T, IngestError>;

/// Failure reading or storing one ingestion unit (file or city).
#[derive(Debug)]
pub enum IngestError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Csv(csv::Error),
    Schema(SchemaError),
    Repo(RepoError),
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read `{}`: {source}", path.display()),
            Self::Csv(err) => write!(f, "malformed csv: {err}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv(err) => Some(err),
            Self::Schema(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<csv::Error> for IngestError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<SchemaError> for IngestError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<RepoError> for IngestError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}
