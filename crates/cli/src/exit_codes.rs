//! CLI Exit Code Registry
//!
//! Single source of truth for `fuelgrid` exit codes. Scripts and schedulers
//! branch on these, so treat them as a contract.
//!
//! | Code | Meaning                                                     |
//! |------|-------------------------------------------------------------|
//! | 0    | Success (row errors may still be present without --strict)  |
//! | 1    | General error, including unexpected database query failures |
//! | 2    | Usage error: bad arguments, invalid config file             |
//! | 3    | Source could not be acquired (download, missing file)       |
//! | 4    | Malformed spreadsheet (no header row, unreadable workbook)  |
//! | 5    | Storage unavailable (cannot open, locked, read-only)        |
//! | 6    | Run finished but some rows failed, and --strict was given   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant with the next free number
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into [`ingest_exit_code`] or the command that raises it

use fuelgrid_recon::IngestError;

/// Success - command completed.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments or an invalid config file.
pub const EXIT_USAGE: u8 = 2;

/// The source URL or path could not be fetched or read, or was empty.
pub const EXIT_ACQUISITION: u8 = 3;

/// No header row with the anchor column, or the workbook cannot be parsed.
pub const EXIT_MALFORMED: u8 = 4;

/// The database cannot be opened or written.
pub const EXIT_STORAGE_UNAVAILABLE: u8 = 5;

/// `--strict` and at least one row ended in an error.
pub const EXIT_ROW_ERRORS: u8 = 6;

/// Map a fatal run error to its exit code.
pub fn ingest_exit_code(err: &IngestError) -> u8 {
    match err {
        IngestError::Acquisition(_) => EXIT_ACQUISITION,
        IngestError::MalformedSpreadsheet(_) => EXIT_MALFORMED,
        IngestError::StorageUnavailable(_) => EXIT_STORAGE_UNAVAILABLE,
        IngestError::Config(_) => EXIT_USAGE,
        IngestError::Storage(_) | IngestError::Io(_) => EXIT_ERROR,
    }
}
