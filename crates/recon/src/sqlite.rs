// SQLite-backed PriceStore

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, Transaction};
use serde::Serialize;

use fuelgrid_core::{
    GeoPoint, Location, Price, PriceObservation, Product, ProductCategory, Station, TaxId,
    UnitOfMeasure,
};

use crate::error::StoreError;
use crate::store::{
    PairKey, PriceStore, RowId, StoredLocation, StoredObservation, StoredProduct, StoredStation,
    WriteOp,
};

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY,
    natural_key TEXT NOT NULL UNIQUE,
    state TEXT NOT NULL,
    city TEXT NOT NULL,
    street TEXT,
    number TEXT,
    complement TEXT,
    neighborhood TEXT,
    postal_code TEXT,
    address TEXT,                   -- street, number, complement joined
    latitude REAL,
    longitude REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL,         -- FUEL, LPG, CNG, LUBRICANT
    unit TEXT NOT NULL,             -- L, kg, m3
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stations (
    id INTEGER PRIMARY KEY,
    tax_id TEXT NOT NULL UNIQUE CHECK (length(tax_id) = 14),
    legal_name TEXT NOT NULL,
    trade_name TEXT,
    display_name TEXT NOT NULL,     -- trade name, else legal name
    brand TEXT,
    location_id INTEGER NOT NULL REFERENCES locations(id),
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS price_observations (
    id INTEGER PRIMARY KEY,
    station_id INTEGER NOT NULL REFERENCES stations(id),
    product_id INTEGER NOT NULL REFERENCES products(id),
    collected_on TEXT NOT NULL,     -- YYYY-MM-DD
    price INTEGER CHECK (price IS NULL OR price >= 0),  -- ten-thousandths
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (station_id, product_id, collected_on)
);

CREATE INDEX IF NOT EXISTS idx_observations_pair
    ON price_observations (station_id, product_id, collected_on);
"#;

/// Keys per `IN (...)` lookup; stays under SQLite's bound-parameter limit.
const LOOKUP_CHUNK: usize = 500;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub locations: usize,
    pub products: usize,
    pub stations: usize,
    pub observations: usize,
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn counts(&self) -> Result<TableCounts, StoreError> {
        let count = |table: &str| -> Result<usize, StoreError> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(TableCounts {
            locations: count("locations")?,
            products: count("products")?,
            stations: count("stations")?,
            observations: count("price_observations")?,
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn corrupt(what: &str, value: &str) -> StoreError {
    StoreError::Query(format!("stored {what} '{value}' is not valid"))
}

fn parse_date(value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| corrupt("date", value))
}

impl PriceStore for SqliteStore {
    fn find_locations(&self, keys: &[String]) -> Result<HashMap<String, StoredLocation>, StoreError> {
        let mut found = HashMap::new();
        for chunk in keys.chunks(LOOKUP_CHUNK) {
            let sql = format!(
                "SELECT id, natural_key, state, city, street, number, complement, neighborhood,
                        postal_code, latitude, longitude, created_at
                 FROM locations WHERE natural_key IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                let latitude: Option<f64> = row.get(9)?;
                let longitude: Option<f64> = row.get(10)?;
                let stored = StoredLocation {
                    id: row.get(0)?,
                    created_at: row.get(11)?,
                    location: Location {
                        state: row.get(2)?,
                        city: row.get(3)?,
                        street: row.get(4)?,
                        number: row.get(5)?,
                        complement: row.get(6)?,
                        neighborhood: row.get(7)?,
                        postal_code: row.get(8)?,
                        coordinates: latitude
                            .zip(longitude)
                            .map(|(latitude, longitude)| GeoPoint { latitude, longitude }),
                    },
                };
                Ok((row.get::<_, String>(1)?, stored))
            })?;
            for row in rows {
                let (key, stored) = row?;
                found.insert(key, stored);
            }
        }
        Ok(found)
    }

    fn find_products(&self, names: &[String]) -> Result<HashMap<String, StoredProduct>, StoreError> {
        let mut found = HashMap::new();
        for chunk in names.chunks(LOOKUP_CHUNK) {
            let sql = format!(
                "SELECT id, name, category, unit, active, created_at
                 FROM products WHERE name IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((
                    row.get::<_, RowId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?;
            for row in rows {
                let (id, name, category, unit, active, created_at) = row?;
                let product = Product {
                    category: ProductCategory::parse(&category)
                        .ok_or_else(|| corrupt("product category", &category))?,
                    unit: UnitOfMeasure::parse(&unit).ok_or_else(|| corrupt("unit", &unit))?,
                    name: name.clone(),
                    active,
                };
                found.insert(name, StoredProduct { id, created_at, product });
            }
        }
        Ok(found)
    }

    fn find_stations(&self, tax_ids: &[String]) -> Result<HashMap<String, StoredStation>, StoreError> {
        let mut found = HashMap::new();
        for chunk in tax_ids.chunks(LOOKUP_CHUNK) {
            let sql = format!(
                "SELECT id, tax_id, legal_name, trade_name, brand, location_id, active, created_at
                 FROM stations WHERE tax_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((
                    row.get::<_, RowId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, RowId>(5)?,
                    row.get::<_, bool>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?;
            for row in rows {
                let (id, digits, legal_name, trade_name, brand, location_id, active, created_at) = row?;
                let tax_id = TaxId::parse(&digits).ok_or_else(|| corrupt("tax id", &digits))?;
                let station = Station {
                    tax_id,
                    legal_name,
                    trade_name,
                    brand,
                    active,
                };
                found.insert(
                    digits,
                    StoredStation {
                        id,
                        created_at,
                        location_id,
                        station,
                    },
                );
            }
        }
        Ok(found)
    }

    fn latest_observations(
        &self,
        pairs: &[PairKey],
    ) -> Result<HashMap<PairKey, StoredObservation>, StoreError> {
        let wanted: HashSet<PairKey> = pairs.iter().copied().collect();
        let stations: Vec<RowId> = pairs
            .iter()
            .map(|(station, _)| *station)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut found = HashMap::new();
        for chunk in stations.chunks(LOOKUP_CHUNK) {
            let sql = format!(
                "SELECT o.id, o.station_id, o.product_id, o.collected_on, o.price, o.active, o.created_at
                 FROM price_observations o
                 WHERE o.station_id IN ({})
                   AND o.collected_on = (
                       SELECT MAX(i.collected_on) FROM price_observations i
                       WHERE i.station_id = o.station_id AND i.product_id = o.product_id
                   )",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((
                    row.get::<_, RowId>(0)?,
                    row.get::<_, RowId>(1)?,
                    row.get::<_, RowId>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?;
            for row in rows {
                let (id, station_id, product_id, collected_on, price, active, created_at) = row?;
                let pair = (station_id, product_id);
                if !wanted.contains(&pair) {
                    continue;
                }
                let price = match price {
                    Some(minor) => Some(
                        Price::from_minor(minor).ok_or_else(|| corrupt("price", &minor.to_string()))?,
                    ),
                    None => None,
                };
                found.insert(
                    pair,
                    StoredObservation {
                        id,
                        created_at,
                        station_id,
                        product_id,
                        observation: PriceObservation {
                            collected_on: parse_date(&collected_on)?,
                            price,
                            active,
                        },
                    },
                );
            }
        }
        Ok(found)
    }

    fn apply(&mut self, ops: &[WriteOp]) -> Result<Vec<RowId>, StoreError> {
        let now = Utc::now().to_rfc3339();
        // Rolls back on drop unless committed.
        let tx = self.conn.transaction()?;
        let mut ids = Vec::with_capacity(ops.len());
        for op in ops {
            ids.push(apply_one(&tx, op, &now)?);
        }
        tx.commit()?;
        Ok(ids)
    }
}

fn apply_one(tx: &Transaction<'_>, op: &WriteOp, now: &str) -> Result<RowId, StoreError> {
    match op {
        WriteOp::InsertLocation(l) => {
            tx.prepare_cached(
                "INSERT INTO locations (natural_key, state, city, street, number, complement,
                     neighborhood, postal_code, address, latitude, longitude, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            )?
            .execute(params![
                l.natural_key(),
                l.state,
                l.city,
                l.street,
                l.number,
                l.complement,
                l.neighborhood,
                l.postal_code,
                l.address(),
                l.coordinates.map(|c| c.latitude),
                l.coordinates.map(|c| c.longitude),
                now,
            ])?;
            Ok(tx.last_insert_rowid())
        }
        WriteOp::UpdateLocation { id, location: l } => {
            let changed = tx
                .prepare_cached(
                    "UPDATE locations SET complement = ?1, address = ?2,
                         latitude = COALESCE(?3, latitude), longitude = COALESCE(?4, longitude),
                         updated_at = ?5
                     WHERE id = ?6",
                )?
                .execute(params![
                    l.complement,
                    l.address(),
                    l.coordinates.map(|c| c.latitude),
                    l.coordinates.map(|c| c.longitude),
                    now,
                    id,
                ])?;
            expect_one(changed, "location", *id)
        }
        WriteOp::InsertProduct(p) => {
            tx.prepare_cached(
                "INSERT INTO products (name, category, unit, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            )?
            .execute(params![p.name, p.category.as_str(), p.unit.as_str(), p.active, now])?;
            Ok(tx.last_insert_rowid())
        }
        WriteOp::UpdateProduct { id, product: p } => {
            let changed = tx
                .prepare_cached(
                    "UPDATE products SET category = ?1, unit = ?2, active = ?3, updated_at = ?4
                     WHERE id = ?5",
                )?
                .execute(params![p.category.as_str(), p.unit.as_str(), p.active, now, id])?;
            expect_one(changed, "product", *id)
        }
        WriteOp::InsertStation { location_id, station: s } => {
            tx.prepare_cached(
                "INSERT INTO stations (tax_id, legal_name, trade_name, display_name, brand, location_id,
                     active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            )?
            .execute(params![
                s.tax_id.digits(),
                s.legal_name,
                s.trade_name,
                s.display_name(),
                s.brand,
                location_id,
                s.active,
                now,
            ])?;
            Ok(tx.last_insert_rowid())
        }
        WriteOp::UpdateStation {
            id,
            location_id,
            station: s,
        } => {
            let changed = tx
                .prepare_cached(
                    "UPDATE stations SET legal_name = ?1, trade_name = ?2, display_name = ?3, brand = ?4,
                         location_id = ?5, active = ?6, updated_at = ?7
                     WHERE id = ?8",
                )?
                .execute(params![
                    s.legal_name,
                    s.trade_name,
                    s.display_name(),
                    s.brand,
                    location_id,
                    s.active,
                    now,
                    id,
                ])?;
            expect_one(changed, "station", *id)
        }
        WriteOp::InsertObservation {
            station_id,
            product_id,
            observation: o,
        } => {
            tx.prepare_cached(
                "INSERT INTO price_observations (station_id, product_id, collected_on, price, active,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            )?
            .execute(params![
                station_id,
                product_id,
                o.collected_on.format(DATE_FORMAT).to_string(),
                o.price.map(|p| p.minor()),
                o.active,
                now,
            ])?;
            Ok(tx.last_insert_rowid())
        }
        WriteOp::UpdateObservation { id, observation: o } => {
            let changed = tx
                .prepare_cached(
                    "UPDATE price_observations SET price = ?1, active = ?2, updated_at = ?3
                     WHERE id = ?4",
                )?
                .execute(params![o.price.map(|p| p.minor()), o.active, now, id])?;
            expect_one(changed, "price observation", *id)
        }
    }
}

fn expect_one(changed: usize, what: &str, id: RowId) -> Result<RowId, StoreError> {
    if changed == 1 {
        Ok(id)
    } else {
        Err(StoreError::Rejected(format!("{what} {id} does not exist")))
    }
}
