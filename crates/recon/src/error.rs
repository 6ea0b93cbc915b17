use std::path::PathBuf;

use fuelgrid_io::{AcquireError, NormalizeError};
use rusqlite::ErrorCode;
use thiserror::Error;

/// Failure reported by a [`crate::store::PriceStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database cannot be reached or written at all. Fatal to a run.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// The store refused this particular write (constraint, trigger).
    #[error("write rejected: {0}")]
    Rejected(String),
    /// Any other query failure.
    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::NotADatabase
                | ErrorCode::ReadOnly
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::OutOfMemory
                | ErrorCode::PermissionDenied,
            ) => Self::Unavailable(err.to_string()),
            Some(ErrorCode::ConstraintViolation | ErrorCode::TypeMismatch | ErrorCode::TooBig) => {
                Self::Rejected(err.to_string())
            }
            _ => Self::Query(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("config validation error: {0}")]
    Invalid(String),
}

/// Run-level failure. Nothing past the last committed chunk is kept.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("acquisition failed: {0}")]
    Acquisition(#[from] AcquireError),
    #[error("malformed spreadsheet: {0}")]
    MalformedSpreadsheet(String),
    #[error(transparent)]
    StorageUnavailable(StoreError),
    /// A lookup or batch failed for a reason other than reachability,
    /// e.g. stored data that no longer parses.
    #[error("storage error: {0}")]
    Storage(StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<NormalizeError> for IngestError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::Io(e) => Self::Io(e),
            other => Self::MalformedSpreadsheet(other.to_string()),
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        if err.is_unavailable() {
            Self::StorageUnavailable(err)
        } else {
            Self::Storage(err)
        }
    }
}
