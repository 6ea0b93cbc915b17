use std::fmt;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::text::{digits_only, upper_squash};

// ---------------------------------------------------------------------------
// Tax id
// ---------------------------------------------------------------------------

/// A 14-digit company tax id (CNPJ). Stored as bare digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaxId(String);

impl TaxId {
    pub const LEN: usize = 14;

    /// Accepts any punctuation; `None` unless exactly 14 digits remain.
    pub fn parse(input: &str) -> Option<Self> {
        let digits = digits_only(input);
        (digits.len() == Self::LEN).then_some(Self(digits))
    }

    pub fn digits(&self) -> &str {
        &self.0
    }

    /// Fourteen copies of the same digit, a classic placeholder value.
    pub fn is_repeated_digit(&self) -> bool {
        let first = self.0.as_bytes()[0];
        self.0.bytes().all(|b| b == first)
    }

    /// `NN.NNN.NNN/NNNN-NN`
    pub fn formatted(&self) -> String {
        let d = &self.0;
        format!("{}.{}.{}/{}-{}", &d[0..2], &d[2..5], &d[5..8], &d[8..12], &d[12..14])
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl Serialize for TaxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.formatted())
    }
}

/// Canonical postal code (`NNNNN-NNN`), or `None` unless exactly 8 digits remain.
pub fn canonical_postal_code(input: &str) -> Option<String> {
    let digits = digits_only(input);
    (digits.len() == 8).then(|| format!("{}-{}", &digits[..5], &digits[5..]))
}

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("price is blank")]
    Empty,
    #[error("price '{0}' is negative")]
    Negative(String),
    #[error("price '{0}' is not a decimal number")]
    Malformed(String),
}

/// Non-negative price in ten-thousandths of the currency unit. No floats on
/// the way in, so "5,599" and "5.599" compare equal bit for bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Price(i64);

impl Price {
    pub const SCALE: i64 = 10_000;
    const MAX_DECIMALS: usize = 4;

    pub fn from_minor(minor: i64) -> Option<Self> {
        (minor >= 0).then_some(Self(minor))
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    /// Parse a price as printed in the survey: "R$ 5,59", "5.599", "1.234,50".
    ///
    /// A comma is the decimal separator. When both separators appear, the
    /// one that comes last is the decimal separator and the other groups
    /// thousands.
    pub fn parse(input: &str) -> Result<Self, PriceError> {
        let cleaned: String = input
            .replace("R$", "")
            .replace("r$", "")
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '$')
            .collect();
        if cleaned.is_empty() {
            return Err(PriceError::Empty);
        }

        let malformed = || PriceError::Malformed(input.trim().to_string());

        let (negative, body) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };

        let decimal = match (body.rfind(','), body.rfind('.')) {
            (Some(c), Some(d)) if c > d => body.replace('.', "").replace(',', "."),
            (Some(_), Some(_)) => body.replace(',', ""),
            (Some(_), None) => {
                if body.matches(',').count() > 1 {
                    return Err(malformed());
                }
                body.replace(',', ".")
            }
            _ => body.to_string(),
        };

        let (whole, frac) = match decimal.split_once('.') {
            Some((w, f)) => (w, f),
            None => (decimal.as_str(), ""),
        };
        if (whole.is_empty() && frac.is_empty())
            || frac.len() > Self::MAX_DECIMALS
            || frac.contains('.')
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(malformed());
        }

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| malformed())?
        };
        let mut frac_value: i64 = if frac.is_empty() { 0 } else { frac.parse().map_err(|_| malformed())? };
        for _ in frac.len()..Self::MAX_DECIMALS {
            frac_value *= 10;
        }

        let minor = whole_value
            .checked_mul(Self::SCALE)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(malformed)?;

        if negative && minor > 0 {
            return Err(PriceError::Negative(input.trim().to_string()));
        }
        Ok(Self(minor))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::SCALE;
        let mut frac = format!("{:04}", self.0 % Self::SCALE);
        while frac.len() > 2 && frac.ends_with('0') {
            frac.pop();
        }
        write!(f, "{whole}.{frac}")
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductCategory {
    Fuel,
    Lpg,
    Cng,
    Lubricant,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fuel => "FUEL",
            Self::Lpg => "LPG",
            Self::Cng => "CNG",
            Self::Lubricant => "LUBRICANT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FUEL" => Some(Self::Fuel),
            "LPG" => Some(Self::Lpg),
            "CNG" => Some(Self::Cng),
            "LUBRICANT" => Some(Self::Lubricant),
            _ => None,
        }
    }

    /// LPG is sold by mass (13 kg cylinders), CNG by cubic meter, the rest by liter.
    pub fn unit(&self) -> UnitOfMeasure {
        match self {
            Self::Lpg => UnitOfMeasure::Kilogram,
            Self::Cng => UnitOfMeasure::CubicMeter,
            Self::Fuel | Self::Lubricant => UnitOfMeasure::Liter,
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnitOfMeasure {
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "m3")]
    CubicMeter,
    #[serde(rename = "L")]
    Liter,
}

impl UnitOfMeasure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kilogram => "kg",
            Self::CubicMeter => "m3",
            Self::Liter => "L",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kg" => Some(Self::Kilogram),
            "m3" => Some(Self::CubicMeter),
            "L" => Some(Self::Liter),
            _ => None,
        }
    }
}

impl fmt::Display for UnitOfMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub name: String,
    pub category: ProductCategory,
    pub unit: UnitOfMeasure,
    pub active: bool,
}

impl Product {
    pub fn natural_key(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub state: String,
    pub city: String,
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub postal_code: Option<String>,
    pub coordinates: Option<GeoPoint>,
}

impl Location {
    /// Street, number and complement joined with ", "; `None` when all are absent.
    pub fn address(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.street, &self.number, &self.complement]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }

    /// Uppercased, trimmed (state, city, street, number, neighborhood, postal code).
    pub fn natural_key(&self) -> String {
        let part = |v: Option<&str>| upper_squash(v.unwrap_or(""));
        [
            part(Some(&self.state)),
            part(Some(&self.city)),
            part(self.street.as_deref()),
            part(self.number.as_deref()),
            part(self.neighborhood.as_deref()),
            part(self.postal_code.as_deref()),
        ]
        .join("|")
    }
}

// ---------------------------------------------------------------------------
// Station + observation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub tax_id: TaxId,
    pub legal_name: String,
    pub trade_name: Option<String>,
    pub brand: Option<String>,
    pub active: bool,
}

impl Station {
    pub fn natural_key(&self) -> &str {
        self.tax_id.digits()
    }

    /// Trade name if present, else legal name.
    pub fn display_name(&self) -> &str {
        self.trade_name.as_deref().unwrap_or(&self.legal_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceObservation {
    pub collected_on: NaiveDate,
    pub price: Option<Price>,
    pub active: bool,
}

/// Everything one sheet row contributes, in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedRow {
    /// 1-based data row index within the normalized table.
    pub row: usize,
    pub location: Location,
    pub product: Product,
    pub station: Station,
    pub observation: PriceObservation,
}
