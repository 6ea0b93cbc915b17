use crate::columns::{ColumnLayout, Field};
use crate::mapper::parse_collection_date;
use crate::model::TaxId;
use crate::row::{PriceRow, RawRow};
use crate::text::{digits_only, header_key, non_blank};

/// Fields that must carry a real value (not blank, not the header text).
const REQUIRED_TEXT: [Field; 4] = [Field::City, Field::Product, Field::State, Field::LegalName];

/// Outcome of validating one raw row. Never an `Err`: problems are data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowVerdict {
    pub errors: Vec<String>,
    row: Option<PriceRow>,
}

impl RowVerdict {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The typed row, or the accumulated error messages.
    pub fn into_result(self) -> Result<PriceRow, Vec<String>> {
        match self.row {
            Some(row) if self.errors.is_empty() => Ok(row),
            _ => Err(self.errors),
        }
    }
}

/// Run every check independently and collect all failures.
pub fn validate_row(raw: &RawRow, layout: &ColumnLayout) -> RowVerdict {
    let mut errors = Vec::new();

    match raw.value(layout, Field::TaxId).map(str::trim).filter(|v| !v.is_empty()) {
        None => errors.push("tax id is missing".to_string()),
        Some(value) => match TaxId::parse(value) {
            None => errors.push(format!(
                "tax id '{value}' has {} digits, expected 14",
                digits_only(value).len()
            )),
            Some(tax_id) if tax_id.is_repeated_digit() => {
                errors.push(format!("tax id '{value}' is a repeated-digit placeholder"));
            }
            Some(_) => {}
        },
    }

    for field in REQUIRED_TEXT {
        match raw.cell(layout, field) {
            None => errors.push(format!("{field} is missing")),
            Some((_, value)) if value.trim().is_empty() => errors.push(format!("{field} is missing")),
            Some((header, value)) if header_key(header) == header_key(value) => {
                errors.push(format!("{field} holds its own header text '{}'", value.trim()));
            }
            Some(_) => {}
        }
    }

    match raw.value(layout, Field::CollectedOn).map(str::trim).filter(|v| !v.is_empty()) {
        None => errors.push("collection date is missing".to_string()),
        Some(value) if parse_collection_date(value).is_none() => {
            errors.push(format!("collection date '{value}' is not a valid date"));
        }
        Some(_) => {}
    }

    if !errors.is_empty() {
        return RowVerdict { errors, row: None };
    }

    let opt = |field: Field| non_blank(raw.value(layout, field));
    let req = |field: Field| opt(field).unwrap_or_default();

    let row = PriceRow {
        row: raw.row,
        tax_id: req(Field::TaxId),
        legal_name: req(Field::LegalName),
        trade_name: opt(Field::TradeName),
        street: opt(Field::Street),
        number: opt(Field::Number),
        complement: opt(Field::Complement),
        neighborhood: opt(Field::Neighborhood),
        postal_code: opt(Field::PostalCode),
        city: req(Field::City),
        state: req(Field::State),
        brand: opt(Field::Brand),
        product: req(Field::Product),
        price: opt(Field::Price),
        collected_on: req(Field::CollectedOn),
        latitude: opt(Field::Latitude),
        longitude: opt(Field::Longitude),
    };

    RowVerdict { errors, row: Some(row) }
}
