//! Row → canonical entities.
//!
//! Everything here is a pure function of its input. The validator has already
//! checked the same invariants, so a `MappingError` means the two drifted.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::model::{
    canonical_postal_code, GeoPoint, Location, MappedRow, Price, PriceObservation, Product,
    ProductCategory, Station, TaxId,
};
use crate::row::PriceRow;
use crate::text::{digits_only, fold_accents, upper_squash};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("tax id '{value}' has {digits} digits, expected 14")]
    TaxId { value: String, digits: usize },
    #[error("collection date '{0}' is not a valid date")]
    Date(String),
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Formats tried after the three strict survey formats have failed.
const FALLBACK_DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%d.%m.%Y", "%d/%m/%y", "%Y%m%d"];
const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a collection date.
///
/// `DD/MM/YYYY`, `YYYY-MM-DD` and `DD-MM-YYYY` are tried first, in that
/// order, and must survive a calendar round trip (so `31/02/2024` fails).
/// A handful of looser spellings are accepted after that.
pub fn parse_collection_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    strict_date(s, '/', false)
        .or_else(|| strict_date(s, '-', true))
        .or_else(|| strict_date(s, '-', false))
        .or_else(|| fallback_date(s))
}

fn strict_date(s: &str, sep: char, year_first: bool) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split(sep).collect();
    if parts.len() != 3 || !parts.iter().all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    let (y, m, d) = if year_first {
        (parts[0], parts[1], parts[2])
    } else {
        (parts[2], parts[1], parts[0])
    };
    if y.len() != 4 || m.len() > 2 || d.len() > 2 {
        return None;
    }
    let (year, month, day): (i32, u32, u32) = (y.parse().ok()?, m.parse().ok()?, d.parse().ok()?);

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    (date.year() == year && date.month() == month && date.day() == day).then_some(date)
}

fn fallback_date(s: &str) -> Option<NaiveDate> {
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            FALLBACK_DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// Spellings seen in the survey, folded onto one canonical name.
/// Keys are accent-folded and uppercased.
const PRODUCT_SYNONYMS: &[(&str, &str)] = &[
    ("ALCOOL", "ETANOL"),
    ("ALCOOL HIDRATADO", "ETANOL"),
    ("ETANOL HIDRATADO", "ETANOL"),
    ("ETANOL COMUM", "ETANOL"),
    ("GAS LIQUEFEITO DE PETROLEO", "GLP"),
    ("GAS DE COZINHA", "GLP"),
    ("GLP 13KG", "GLP"),
    ("GLP - 13KG", "GLP"),
    ("GLP P13", "GLP"),
    ("GAS NATURAL VEICULAR", "GNV"),
    ("GAS NATURAL", "GNV"),
    ("OLEO DIESEL", "DIESEL"),
    ("DIESEL COMUM", "DIESEL"),
    ("OLEO DIESEL S10", "DIESEL S10"),
    ("DIESEL S-10", "DIESEL S10"),
    ("OLEO DIESEL S500", "DIESEL S500"),
    ("DIESEL S-500", "DIESEL S500"),
    ("GASOLINA C", "GASOLINA"),
    ("GASOLINA COMUM", "GASOLINA"),
    ("GASOLINA C COMUM", "GASOLINA"),
    ("GASOLINA C ADITIVADA", "GASOLINA ADITIVADA"),
];

/// Uppercase, trim, fold accents and map known synonyms.
pub fn canonical_product_name(input: &str) -> String {
    let folded = upper_squash(&fold_accents(input));
    PRODUCT_SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == folded)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(folded)
}

/// Category of an already-canonical product name.
pub fn product_category(name: &str) -> ProductCategory {
    match name {
        "GLP" => ProductCategory::Lpg,
        "GNV" => ProductCategory::Cng,
        n if n.contains("LUBRIFICANTE") || n.contains("LUBRICANT") => ProductCategory::Lubricant,
        _ => ProductCategory::Fuel,
    }
}

pub fn map_product(input: &str) -> Product {
    let name = canonical_product_name(input);
    let category = product_category(&name);
    Product {
        unit: category.unit(),
        name,
        category,
        active: true,
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_coordinate(s: &str, limit: f64) -> Option<f64> {
    let v: f64 = s.trim().replace(',', ".").parse().ok()?;
    (v.is_finite() && v.abs() <= limit).then_some(v)
}

/// Build every entity a validated row contributes.
pub fn map_row(row: &PriceRow) -> Result<MappedRow, MappingError> {
    let tax_id = TaxId::parse(&row.tax_id).ok_or_else(|| MappingError::TaxId {
        value: row.tax_id.clone(),
        digits: digits_only(&row.tax_id).len(),
    })?;

    let collected_on = parse_collection_date(&row.collected_on)
        .ok_or_else(|| MappingError::Date(row.collected_on.clone()))?;

    let price = match row.price.as_deref() {
        None => None,
        Some(raw) => match Price::parse(raw) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::debug!(row = row.row, error = %e, "price discarded");
                None
            }
        },
    };

    let coordinates = match (row.latitude.as_deref(), row.longitude.as_deref()) {
        (Some(lat), Some(lon)) => parse_coordinate(lat, 90.0)
            .zip(parse_coordinate(lon, 180.0))
            .map(|(latitude, longitude)| GeoPoint { latitude, longitude }),
        _ => None,
    };

    let location = Location {
        state: upper_squash(&row.state),
        city: upper_squash(&row.city),
        street: row.street.clone(),
        number: row.number.clone(),
        complement: row.complement.clone(),
        neighborhood: row.neighborhood.clone(),
        postal_code: row.postal_code.as_deref().and_then(canonical_postal_code),
        coordinates,
    };

    let station = Station {
        tax_id,
        legal_name: row.legal_name.clone(),
        trade_name: row.trade_name.clone(),
        brand: row.brand.clone(),
        active: true,
    };

    Ok(MappedRow {
        row: row.row,
        location,
        product: map_product(&row.product),
        station,
        observation: PriceObservation {
            collected_on,
            price,
            active: true,
        },
    })
}
