use std::path::PathBuf;

use thiserror::Error;

/// The source could not be turned into a local file.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("cannot fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("source {0} is empty")]
    Empty(String),
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write scratch file in {dir}: {source}")]
    Scratch {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The file was read but is not a usable price sheet.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("workbook contains no worksheet")]
    NoWorksheet,
    #[error("no cell matches the header anchor '{0}'")]
    AnchorNotFound(String),
    #[error("cannot open workbook: {0}")]
    Workbook(String),
    #[error("cannot parse CSV: {0}")]
    Csv(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NormalizeError {
    /// Whether the problem lies in the file's shape rather than the machine.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}
