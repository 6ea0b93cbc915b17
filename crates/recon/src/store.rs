//! Persistence seam for the reconciliation engine.
//!
//! Lookups are bulk: one call per entity kind, keyed by natural key.
//! Writes go through [`PriceStore::apply`], which runs a batch of
//! operations as a single all-or-nothing unit.

use std::collections::HashMap;

use fuelgrid_core::{Location, PriceObservation, Product, Station};

use crate::error::StoreError;

pub type RowId = i64;

/// (station id, product id)
pub type PairKey = (RowId, RowId);

#[derive(Debug, Clone, PartialEq)]
pub struct StoredLocation {
    pub id: RowId,
    pub created_at: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredProduct {
    pub id: RowId,
    pub created_at: String,
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredStation {
    pub id: RowId,
    pub created_at: String,
    pub location_id: RowId,
    pub station: Station,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObservation {
    pub id: RowId,
    pub created_at: String,
    pub station_id: RowId,
    pub product_id: RowId,
    pub observation: PriceObservation,
}

/// One write. Updates keep the row's id and creation timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    InsertLocation(Location),
    UpdateLocation {
        id: RowId,
        location: Location,
    },
    InsertProduct(Product),
    UpdateProduct {
        id: RowId,
        product: Product,
    },
    InsertStation {
        location_id: RowId,
        station: Station,
    },
    UpdateStation {
        id: RowId,
        location_id: RowId,
        station: Station,
    },
    InsertObservation {
        station_id: RowId,
        product_id: RowId,
        observation: PriceObservation,
    },
    /// Overwrites price and active flag only.
    UpdateObservation {
        id: RowId,
        observation: PriceObservation,
    },
}

pub trait PriceStore {
    /// Locations by natural key. Missing keys are simply absent.
    fn find_locations(&self, keys: &[String]) -> Result<HashMap<String, StoredLocation>, StoreError>;

    /// Products by canonical name.
    fn find_products(&self, names: &[String]) -> Result<HashMap<String, StoredProduct>, StoreError>;

    /// Stations by 14-digit tax id (bare digits).
    fn find_stations(&self, tax_ids: &[String]) -> Result<HashMap<String, StoredStation>, StoreError>;

    /// Most recent observation of each (station, product) pair.
    fn latest_observations(
        &self,
        pairs: &[PairKey],
    ) -> Result<HashMap<PairKey, StoredObservation>, StoreError>;

    /// Apply `ops` in one transaction and return the affected row id of
    /// each, in order. Any failure leaves the store untouched.
    fn apply(&mut self, ops: &[WriteOp]) -> Result<Vec<RowId>, StoreError>;
}
