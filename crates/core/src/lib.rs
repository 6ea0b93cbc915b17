//! `fuelgrid-core`: domain model for the fuel price survey.
//!
//! Holds the untyped `RawRow` → typed `PriceRow` boundary (validation) and
//! the `PriceRow` → entities mapping. No IO.

pub mod columns;
pub mod mapper;
pub mod model;
pub mod row;
pub mod text;
pub mod validate;

pub use columns::{ColumnLayout, Field};
pub use mapper::{map_row, parse_collection_date, MappingError};
pub use model::{
    GeoPoint, Location, MappedRow, Price, PriceError, PriceObservation, Product, ProductCategory,
    Station, TaxId, UnitOfMeasure,
};
pub use row::{PriceRow, RawRow};
pub use validate::{validate_row, RowVerdict};
