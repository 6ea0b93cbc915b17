// Excel import (xlsx, xls, xlsb, ods) of the first worksheet into a Grid.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{Duration, NaiveDate};

use crate::error::NormalizeError;
use crate::formats::{self, SheetFormats};
use crate::grid::{Cell, Grid};

/// Display format given to date cells.
pub const DATE_DISPLAY_FORMAT: &str = "dd/mm/yyyy";

/// Read the first worksheet. Later sheets are ignored.
pub fn read_first_sheet(path: &Path) -> Result<Grid, NormalizeError> {
    let mut workbook: Sheets<_> = open_workbook_auto(path)
        .map_err(|e| NormalizeError::Workbook(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(NormalizeError::NoWorksheet)?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| NormalizeError::Workbook(format!("sheet '{}': {}", sheet_name, e)))?;

    let formats = if is_zip(path) {
        match formats::read_sheet_formats(path, &sheet_name) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(sheet = %sheet_name, error = %e, "number formats unavailable");
                SheetFormats::new()
            }
        }
    } else {
        SheetFormats::new()
    };

    // Range start offset (data may not begin at A1)
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let (start_row, start_col) = (start_row as usize, start_col as usize);

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row];
    for (row_idx, row) in range.rows().enumerate() {
        let target_row = start_row + row_idx;
        let mut cells = vec![Cell::Empty; start_col];
        for (col_idx, data) in row.iter().enumerate() {
            let format = formats.get(&(target_row, start_col + col_idx));
            cells.push(convert(data, format.map(String::as_str)));
        }
        rows.push(cells);
    }

    tracing::debug!(
        sheet = %sheet_name,
        rows = rows.len(),
        formatted_cells = formats.len(),
        "worksheet loaded"
    );
    Ok(Grid::new(rows))
}

fn convert(data: &Data, format: Option<&str>) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s.clone()),
        Data::Float(n) => number_cell(*n, format),
        Data::Int(n) => number_cell(*n as f64, format),
        Data::Bool(b) => Cell::text(if *b { "TRUE" } else { "FALSE" }),
        Data::Error(e) => Cell::text(format!("#{:?}", e)),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            Cell::Formatted {
                value: serial,
                format: format.unwrap_or(DATE_DISPLAY_FORMAT).to_string(),
                rendered: excel_serial_to_date(serial).map(|d| d.format("%d/%m/%Y").to_string()),
            }
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.clone()),
    }
}

fn number_cell(value: f64, format: Option<&str>) -> Cell {
    match format {
        Some(code) => Cell::Formatted {
            value,
            format: code.to_string(),
            rendered: if formats::looks_like_identifier_format(code) {
                formats::render_identifier(value, code)
            } else {
                None
            },
        },
        None => Cell::Number(value),
    }
}

/// Serial of 9999-12-31, the last date Excel can display.
const MAX_SERIAL: i64 = 2_958_465;

/// Calendar date of an Excel serial number (1900 date system).
///
/// Serials below 61 sit before Excel's phantom 29 Feb 1900 and are
/// shifted by one day.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let days = serial.floor() as i64;
    if days > MAX_SERIAL {
        return None;
    }
    let base = if days < 61 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    base.checked_add_signed(Duration::days(days))
}

fn is_zip(path: &Path) -> bool {
    use std::io::Read;
    let mut magic = [0u8; 4];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|_| magic == *b"PK\x03\x04")
        .unwrap_or(false)
}
