//! Tabular normalization: raw grid → header + rectangular string rows.
//!
//! The header row is the first row holding a cell equal to the anchor
//! token; everything above it is preamble. Columns with a blank header
//! are dropped, and so are data rows whose kept cells are all blank.

use fuelgrid_core::{RawRow, TaxId};

use crate::error::NormalizeError;
use crate::formats;
use crate::grid::{Cell, Grid};

/// Digit counts a bare number may have to be read as a tax id.
const TAX_ID_DIGITS: std::ops::RangeInclusive<usize> = 11..=14;

/// Clean rectangular table. Every row has `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Rows keyed by header, numbered from 1 in table order.
    pub fn raw_rows(&self) -> Vec<RawRow> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, values)| RawRow::new(i + 1, &self.headers, values))
            .collect()
    }
}

/// Locate the header row by anchor and extract the data rows beneath it.
pub fn normalize(grid: &Grid, anchor: &str) -> Result<Table, NormalizeError> {
    let anchor_key = anchor.trim().to_lowercase();
    let header_row = grid
        .rows
        .iter()
        .position(|row| {
            row.iter()
                .any(|cell| resolve_cell(cell).to_lowercase() == anchor_key)
        })
        .ok_or_else(|| NormalizeError::AnchorNotFound(anchor.to_string()))?;

    let columns: Vec<(usize, String)> = grid.rows[header_row]
        .iter()
        .enumerate()
        .filter_map(|(col, cell)| {
            let header = resolve_cell(cell);
            (!header.is_empty()).then_some((col, header))
        })
        .collect();

    let mut rows = Vec::new();
    let mut blank_rows = 0usize;
    for row_idx in header_row + 1..grid.height() {
        let values: Vec<String> = columns
            .iter()
            .map(|(col, _)| resolve_cell(grid.cell(row_idx, *col)))
            .collect();
        if values.iter().all(String::is_empty) {
            blank_rows += 1;
            continue;
        }
        rows.push(values);
    }

    let dropped_columns = grid.rows[header_row].len() - columns.len();
    tracing::info!(
        header_row = header_row + 1,
        preamble_rows = header_row,
        columns = columns.len(),
        dropped_columns,
        rows = rows.len(),
        blank_rows,
        "sheet normalized"
    );

    Ok(Table {
        headers: columns.into_iter().map(|(_, h)| h).collect(),
        rows,
    })
}

/// Displayed text of one cell, trimmed.
///
/// Precedence: rendered text, then an identifier mask applied to the raw
/// number, then string literals, then bare numbers that look like tax ids,
/// then the stringified value.
pub fn resolve_cell(cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Formatted {
            value,
            format,
            rendered,
        } => {
            if let Some(text) = rendered.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                return text.to_string();
            }
            if formats::looks_like_identifier_format(format) {
                if let Some(text) = formats::render_identifier(*value, format) {
                    return text;
                }
            }
            resolve_number(*value)
        }
        Cell::Text(s) => s.trim().to_string(),
        Cell::Number(n) => resolve_number(*n),
    }
}

fn resolve_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        let whole = format!("{}", value as i64);
        if value >= 0.0 && TAX_ID_DIGITS.contains(&whole.len()) {
            if let Some(tax_id) = TaxId::parse(&format!("{:0>14}", whole)) {
                return tax_id.formatted();
            }
        }
        whole
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Cell {
        Cell::text(s)
    }

    fn preamble_grid() -> Grid {
        Grid::new(vec![
            vec![t("AGÊNCIA NACIONAL DO PETRÓLEO")],
            vec![t("Levantamento de preços - semana 12")],
            vec![],
            vec![t("  cnpj "), t("RAZÃO"), Cell::Empty, t("PRODUTO"), t("PREÇO")],
            vec![
                Cell::Number(12345678000190.0),
                t(" POSTO A "),
                t("spacer"),
                t("GASOLINA"),
                Cell::Number(5.59),
            ],
            vec![Cell::Empty, t("  "), t("ignored"), Cell::Empty],
            vec![t("98.765.432/0001-10"), t("POSTO B"), Cell::Empty, t("ETANOL")],
        ])
    }

    #[test]
    fn test_header_found_below_preamble() {
        let table = normalize(&preamble_grid(), "CNPJ").unwrap();
        assert_eq!(table.headers, vec!["cnpj", "RAZÃO", "PRODUTO", "PREÇO"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.rows[0],
            vec!["12.345.678/0001-90", "POSTO A", "GASOLINA", "5.59"]
        );
        // Ragged row is padded to the header width.
        assert_eq!(table.rows[1], vec!["98.765.432/0001-10", "POSTO B", "ETANOL", ""]);
    }

    #[test]
    fn test_blank_header_column_is_dropped_even_with_data() {
        let table = normalize(&preamble_grid(), "CNPJ").unwrap();
        assert!(table.rows.iter().all(|r| !r.contains(&"spacer".to_string())));
    }

    #[test]
    fn test_missing_anchor_is_malformed() {
        let grid = Grid::new(vec![vec![t("RAZÃO"), t("PRODUTO")], vec![t("A"), t("B")]]);
        let err = normalize(&grid, "CNPJ").unwrap_err();
        assert!(matches!(err, NormalizeError::AnchorNotFound(_)));
        assert!(err.is_malformed());
    }

    #[test]
    fn test_raw_rows_are_one_based() {
        let table = normalize(&preamble_grid(), "CNPJ").unwrap();
        let raw = table.raw_rows();
        assert_eq!(raw[0].row, 1);
        assert_eq!(raw[1].row, 2);
    }

    #[test]
    fn test_rendered_text_wins() {
        let cell = Cell::Formatted {
            value: 45306.0,
            format: "dd/mm/yyyy".into(),
            rendered: Some("15/01/2024".into()),
        };
        assert_eq!(resolve_cell(&cell), "15/01/2024");
    }

    #[test]
    fn test_identifier_mask_reconstructed() {
        let cell = Cell::Formatted {
            value: 1234567000100.0,
            format: r"00\.000\.000\/0000\-00".into(),
            rendered: None,
        };
        assert_eq!(resolve_cell(&cell), "01.234.567/0001-00");
    }

    #[test]
    fn test_bare_number_padded_as_tax_id() {
        assert_eq!(resolve_cell(&Cell::Number(12345678000190.0)), "12.345.678/0001-90");
        // 12 digits: two leading zeros were lost by the spreadsheet.
        assert_eq!(resolve_cell(&Cell::Number(345678000190.0)), "00.345.678/0001-90");
    }

    #[test]
    fn test_short_numbers_stay_plain() {
        assert_eq!(resolve_cell(&Cell::Number(1234.0)), "1234");
        assert_eq!(resolve_cell(&Cell::Number(5.599)), "5.599");
        assert_eq!(resolve_cell(&Cell::Number(1234567890.0)), "1234567890");
    }

    #[test]
    fn test_text_is_trimmed() {
        assert_eq!(resolve_cell(&t("  R$ 5,59 ")), "R$ 5,59");
    }
}
