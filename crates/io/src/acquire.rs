//! Source acquisition: URL or local path → scratch file.
//!
//! Every source is materialized as a fresh file in the scratch directory,
//! owned by the returned [`AcquiredFile`]. Dropping it removes the file,
//! on success and failure paths alike. A local path is copied rather than
//! used in place so cleanup never touches the caller's file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use url::Url;

use crate::error::AcquireError;

// ── Constants ───────────────────────────────────────────────────────

const USER_AGENT: &str = concat!("fuelgrid/", env!("CARGO_PKG_VERSION"));

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_MIME: &str = "application/vnd.ms-excel";
const ODS_MIME: &str = "application/vnd.oasis.opendocument.spreadsheet";
const CSV_MIME: &str = "text/csv";

// ── Types ───────────────────────────────────────────────────────────

/// What the acquired bytes are, as far as the readers are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Xlsx,
    Xls,
    Ods,
    Csv,
}

impl ContentKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Ods => "ods",
            Self::Csv => "csv",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Xlsx => XLSX_MIME,
            Self::Xls => XLS_MIME,
            Self::Ods => ODS_MIME,
            Self::Csv => CSV_MIME,
        }
    }

    pub fn is_workbook(&self) -> bool {
        !matches!(self, Self::Csv)
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "xlsx" | "xlsm" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "ods" => Some(Self::Ods),
            "csv" | "txt" | "tsv" => Some(Self::Csv),
            _ => None,
        }
    }

    fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            XLSX_MIME => Some(Self::Xlsx),
            XLS_MIME => Some(Self::Xls),
            ODS_MIME => Some(Self::Ods),
            "text/csv" | "text/plain" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// Decide the content kind: magic bytes, then extension, then declared type.
pub fn sniff_kind(bytes: &[u8], extension: Option<&str>, declared: Option<&str>) -> ContentKind {
    let by_ext = extension.and_then(ContentKind::from_extension);
    if bytes.starts_with(b"PK\x03\x04") {
        // ZIP container: ODS only when the name says so.
        return if by_ext == Some(ContentKind::Ods) {
            ContentKind::Ods
        } else {
            ContentKind::Xlsx
        };
    }
    if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return ContentKind::Xls;
    }
    by_ext
        .or_else(|| declared.and_then(ContentKind::from_mime))
        .unwrap_or(ContentKind::Csv)
}

/// Options for [`acquire`].
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub scratch_dir: PathBuf,
    pub timeout: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// A source materialized in scratch storage. Removed on drop.
#[derive(Debug)]
pub struct AcquiredFile {
    file: NamedTempFile,
    pub size: u64,
    pub content_type: String,
    pub kind: ContentKind,
}

impl AcquiredFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

// ── Entry point ─────────────────────────────────────────────────────

/// Fetch `source` (http(s) URL, `file://` URL or plain path) into scratch.
pub fn acquire(source: &str, options: &AcquireOptions) -> Result<AcquiredFile, AcquireError> {
    let (bytes, extension, declared) = match Url::parse(source) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            let (bytes, declared) = fetch(&url, options.timeout)?;
            (bytes, extension_of(Path::new(url.path())), declared)
        }
        Ok(url) if url.scheme() == "file" => {
            let path = url.to_file_path().map_err(|_| AcquireError::Read {
                path: PathBuf::from(source),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a local file URL"),
            })?;
            (read_local(&path)?, extension_of(&path), None)
        }
        // Anything else, including Windows drive letters that parse as a
        // one-letter scheme, is a plain path.
        _ => {
            let path = PathBuf::from(source);
            (read_local(&path)?, extension_of(&path), None)
        }
    };

    if bytes.is_empty() {
        return Err(AcquireError::Empty(source.to_string()));
    }

    let kind = sniff_kind(&bytes, extension.as_deref(), declared.as_deref());
    let content_type = declared
        .filter(|d| ContentKind::from_mime(d) == Some(kind))
        .unwrap_or_else(|| kind.mime().to_string());

    let file = write_scratch(&bytes, kind, &options.scratch_dir)?;
    let size = bytes.len() as u64;

    tracing::info!(
        source = %source,
        bytes = size,
        content_type = %content_type,
        scratch = %file.path().display(),
        "source acquired"
    );

    Ok(AcquiredFile {
        file,
        size,
        content_type,
        kind,
    })
}

fn fetch(url: &Url, timeout: Duration) -> Result<(Vec<u8>, Option<String>), AcquireError> {
    let fetch_err = |reason: String| AcquireError::Fetch {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| fetch_err(e.to_string()))?;

    let resp = client
        .get(url.clone())
        .send()
        .map_err(|e| fetch_err(e.to_string()))?;

    let status = resp.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(AcquireError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let declared = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = resp.bytes().map_err(|e| fetch_err(e.to_string()))?;
    Ok((bytes.to_vec(), declared))
}

fn read_local(path: &Path) -> Result<Vec<u8>, AcquireError> {
    std::fs::read(path).map_err(|source| AcquireError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_string)
}

fn write_scratch(bytes: &[u8], kind: ContentKind, dir: &Path) -> Result<NamedTempFile, AcquireError> {
    let scratch_err = |source: std::io::Error| AcquireError::Scratch {
        dir: dir.to_path_buf(),
        source,
    };
    // Workbook readers pick the format from the extension.
    let mut file = tempfile::Builder::new()
        .prefix("fuelgrid-src-")
        .suffix(&format!(".{}", kind.extension()))
        .tempfile_in(dir)
        .map_err(scratch_err)?;
    file.write_all(bytes).map_err(scratch_err)?;
    file.flush().map_err(scratch_err)?;
    Ok(file)
}
