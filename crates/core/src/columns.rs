use serde::{Deserialize, Serialize};

use crate::text::header_key;

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// Every column the pipeline knows how to read from a price sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    TaxId,
    LegalName,
    TradeName,
    Street,
    Number,
    Complement,
    Neighborhood,
    PostalCode,
    City,
    State,
    Brand,
    Product,
    Unit,
    Price,
    CollectedOn,
    Latitude,
    Longitude,
}

impl Field {
    pub const ALL: [Field; 17] = [
        Field::TaxId,
        Field::LegalName,
        Field::TradeName,
        Field::Street,
        Field::Number,
        Field::Complement,
        Field::Neighborhood,
        Field::PostalCode,
        Field::City,
        Field::State,
        Field::Brand,
        Field::Product,
        Field::Unit,
        Field::Price,
        Field::CollectedOn,
        Field::Latitude,
        Field::Longitude,
    ];

    /// Human label used in validation messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TaxId => "tax id",
            Self::LegalName => "legal name",
            Self::TradeName => "trade name",
            Self::Street => "address",
            Self::Number => "number",
            Self::Complement => "complement",
            Self::Neighborhood => "neighborhood",
            Self::PostalCode => "postal code",
            Self::City => "city",
            Self::State => "state",
            Self::Brand => "brand",
            Self::Product => "product",
            Self::Unit => "unit of measure",
            Self::Price => "price",
            Self::CollectedOn => "collection date",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Column layout
// ---------------------------------------------------------------------------

/// Header text for each field, as printed in the source sheet.
///
/// Defaults follow the layout of the ANP weekly price survey. Matching is
/// case-insensitive, accent-insensitive and ignores surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    pub tax_id: String,
    pub legal_name: String,
    pub trade_name: String,
    pub address: String,
    pub number: String,
    pub complement: String,
    pub neighborhood: String,
    pub postal_code: String,
    pub city: String,
    pub state: String,
    pub brand: String,
    pub product: String,
    pub unit: String,
    pub price: String,
    pub collected_on: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            tax_id: "CNPJ".into(),
            legal_name: "RAZÃO".into(),
            trade_name: "FANTASIA".into(),
            address: "ENDEREÇO".into(),
            number: "NÚMERO".into(),
            complement: "COMPLEMENTO".into(),
            neighborhood: "BAIRRO".into(),
            postal_code: "CEP".into(),
            city: "MUNICÍPIO".into(),
            state: "ESTADO".into(),
            brand: "BANDEIRA".into(),
            product: "PRODUTO".into(),
            unit: "UNIDADE DE MEDIDA".into(),
            price: "PREÇO DE REVENDA".into(),
            collected_on: "DATA DA COLETA".into(),
            latitude: "LATITUDE".into(),
            longitude: "LONGITUDE".into(),
        }
    }
}

impl ColumnLayout {
    pub fn header_for(&self, field: Field) -> &str {
        match field {
            Field::TaxId => &self.tax_id,
            Field::LegalName => &self.legal_name,
            Field::TradeName => &self.trade_name,
            Field::Street => &self.address,
            Field::Number => &self.number,
            Field::Complement => &self.complement,
            Field::Neighborhood => &self.neighborhood,
            Field::PostalCode => &self.postal_code,
            Field::City => &self.city,
            Field::State => &self.state,
            Field::Brand => &self.brand,
            Field::Product => &self.product,
            Field::Unit => &self.unit,
            Field::Price => &self.price,
            Field::CollectedOn => &self.collected_on,
            Field::Latitude => &self.latitude,
            Field::Longitude => &self.longitude,
        }
    }

    /// Whether a sheet header cell names `field`.
    pub fn matches(&self, field: Field, header: &str) -> bool {
        header_key(header) == header_key(self.header_for(field))
    }

    /// Fields with an empty header label. Every field must be addressable.
    pub fn blank_fields(&self) -> Vec<Field> {
        Field::ALL
            .iter()
            .copied()
            .filter(|f| self.header_for(*f).trim().is_empty())
            .collect()
    }
}
