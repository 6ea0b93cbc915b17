// CSV input (pre-converted sheets) and the intermediate CSV table.

use std::borrow::Cow;
use std::io::{Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::NormalizeError;
use crate::grid::{Cell, Grid};
use crate::normalize::Table;

/// Read a delimited file into a grid of text cells.
pub fn read_grid(path: &Path) -> Result<Grid, NormalizeError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| NormalizeError::Csv(e.to_string()))?;
        rows.push(record.iter().map(Cell::text).collect());
    }
    tracing::debug!(
        delimiter = %(delimiter as char).escape_default(),
        rows = rows.len(),
        "csv loaded"
    );
    Ok(Grid::new(rows))
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Preamble lines often have a single field; judge on the widest line.
        let target = counts.iter().copied().max().unwrap_or(0);
        if target <= 1 {
            continue;
        }

        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (Windows-1252 fallback).
pub fn read_file_as_utf8(path: &Path) -> Result<String, NormalizeError> {
    let mut file = std::fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };
    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

// =============================================================================
// Intermediate table
// =============================================================================

/// Quote a field when it contains a comma, quote, semicolon or line break.
pub fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', ';', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Write header + rows as comma-separated UTF-8.
pub fn write_table<W: Write>(table: &Table, mut out: W) -> std::io::Result<()> {
    write_record(&mut out, &table.headers)?;
    for row in &table.rows {
        write_record(&mut out, row)?;
    }
    out.flush()
}

fn write_record<W: Write>(out: &mut W, fields: &[String]) -> std::io::Result<()> {
    let line = fields
        .iter()
        .map(|f| quote_field(f))
        .collect::<Vec<_>>()
        .join(",");
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")
}

/// Persist the table into a scratch file that is removed when dropped.
pub fn write_intermediate(table: &Table, scratch_dir: &Path) -> Result<NamedTempFile, NormalizeError> {
    let mut file = tempfile::Builder::new()
        .prefix("fuelgrid-table-")
        .suffix(".csv")
        .tempfile_in(scratch_dir)?;
    write_table(table, std::io::BufWriter::new(file.as_file_mut()))?;
    Ok(file)
}

/// Read an intermediate table back. The first line is the header.
pub fn read_table(path: &Path) -> Result<Table, NormalizeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| NormalizeError::Csv(e.to_string()))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| NormalizeError::Csv(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| NormalizeError::Csv(e.to_string()))?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }
    Ok(Table { headers, rows })
}
