//! `fuelgrid-io`: getting a price sheet off the wire and into a clean table.
//!
//! - [`acquire`]: URL or path → scratch file that deletes itself on drop
//! - [`workbook`] / [`csv`]: first worksheet or CSV → [`Grid`]
//! - [`normalize`]: grid → header + rectangular rows
//! - [`csv::write_intermediate`]: the table as an intermediate CSV

pub mod acquire;
pub mod csv;
pub mod error;
pub mod formats;
pub mod grid;
pub mod normalize;
pub mod workbook;

use std::path::Path;

pub use acquire::{acquire, AcquireOptions, AcquiredFile, ContentKind};
pub use error::{AcquireError, NormalizeError};
pub use grid::{Cell, Grid};
pub use normalize::{normalize, Table};

/// Load the grid of an acquired source with the reader its kind calls for.
pub fn load_grid(file: &AcquiredFile) -> Result<Grid, NormalizeError> {
    load_grid_from(file.path(), file.kind)
}

pub fn load_grid_from(path: &Path, kind: ContentKind) -> Result<Grid, NormalizeError> {
    if kind.is_workbook() {
        workbook::read_first_sheet(path)
    } else {
        csv::read_grid(path)
    }
}
