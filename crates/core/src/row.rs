use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::columns::{ColumnLayout, Field};

/// One data row as it came out of the normalized table: header → cell text,
/// in sheet column order. This is the only untyped row shape in the crate;
/// it stops at the validator and survives afterwards only as error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based data row index.
    pub row: usize,
    pub cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(row: usize, headers: &[String], values: &[String]) -> Self {
        let cells = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), values.get(i).cloned().unwrap_or_default()))
            .collect();
        Self { row, cells }
    }

    /// Cell for `field` as `(header text in the sheet, value)`.
    pub fn cell(&self, layout: &ColumnLayout, field: Field) -> Option<(&str, &str)> {
        self.cells
            .iter()
            .find(|(h, _)| layout.matches(field, h))
            .map(|(h, v)| (h.as_str(), v.as_str()))
    }

    pub fn value(&self, layout: &ColumnLayout, field: Field) -> Option<&str> {
        self.cell(layout, field).map(|(_, v)| v)
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (h, v) in &self.cells {
            map.serialize_entry(h, v)?;
        }
        map.end()
    }
}

/// A row that passed validation. Required fields are present and non-blank;
/// optional ones are `None` when blank. Values are trimmed but not yet
/// canonicalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRow {
    pub row: usize,
    pub tax_id: String,
    pub legal_name: String,
    pub trade_name: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub postal_code: Option<String>,
    pub city: String,
    pub state: String,
    pub brand: Option<String>,
    pub product: String,
    pub price: Option<String>,
    pub collected_on: String,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}
