//! Reconciliation: collapse mapped rows onto unique entities, resolve them
//! against storage, then apply the recency policy to every observation.
//!
//! Entities are written parent-first (locations, products, stations) so each
//! phase can hand real ids to the next. A row whose station or product could
//! not be stored ends as a persistence error; nothing else about it is written.

use std::collections::HashMap;

use chrono::NaiveDate;

use fuelgrid_core::{Location, MappedRow, Product, RawRow, Station};

use crate::error::StoreError;
use crate::policy::{decide, Decision, SkipReason};
use crate::registry::{fill_missing, Registry};
use crate::report::{EntityStats, ErrorKind, RowError, RowOutcome};
use crate::store::{PairKey, PriceStore, RowId, WriteOp};
use crate::writer::write_chunked;

/// A row that made it through validation and mapping.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub raw: RawRow,
    pub mapped: MappedRow,
}

#[derive(Debug, Default)]
pub struct Reconciled {
    /// (row index, outcome), one per candidate.
    pub outcomes: Vec<(usize, RowOutcome)>,
    pub entity_inserts: EntityStats,
    pub entity_updates: EntityStats,
}

/// Per-entity id once its phase has run; `Err` carries the store message.
type Resolved = Vec<Result<RowId, String>>;

#[derive(Debug, Clone)]
struct StationEntry {
    station: Station,
    location: usize,
}

/// Registry indices a candidate points at.
#[derive(Debug, Clone, Copy)]
struct Refs {
    location: usize,
    product: usize,
    station: usize,
}

struct Planned {
    idx: usize,
    op: WriteOp,
    /// Id of the stored row when `op` is a soft update.
    existing: Option<RowId>,
}

#[derive(Default)]
struct PhaseCounts {
    inserted: usize,
    updated: usize,
}

pub fn reconcile<S: PriceStore + ?Sized>(
    candidates: Vec<Candidate>,
    store: &mut S,
    chunk_size: usize,
) -> Result<Reconciled, StoreError> {
    let mut locations: Registry<Location> = Registry::new();
    let mut products: Registry<Product> = Registry::new();
    let mut stations: Registry<StationEntry> = Registry::new();

    let refs: Vec<Refs> = candidates
        .iter()
        .map(|c| {
            let m = &c.mapped;
            let location = locations.intern(m.location.natural_key(), m.location.clone(), merge_location);
            let product = products.intern(m.product.natural_key().to_string(), m.product.clone(), |_, _| {});
            let station = stations.intern(
                m.station.natural_key().to_string(),
                StationEntry {
                    station: m.station.clone(),
                    location,
                },
                merge_station,
            );
            Refs {
                location,
                product,
                station,
            }
        })
        .collect();

    tracing::debug!(
        rows = candidates.len(),
        locations = locations.len(),
        products = products.len(),
        stations = stations.len(),
        "entities collapsed"
    );

    let mut result = Reconciled::default();

    let location_ids = resolve_locations(&locations, store, chunk_size, &mut result)?;
    let product_ids = resolve_products(&products, store, chunk_size, &mut result)?;
    let station_ids = resolve_stations(&stations, &location_ids, store, chunk_size, &mut result)?;

    result.outcomes = reconcile_observations(candidates, &refs, &station_ids, &product_ids, store, chunk_size)?;
    Ok(result)
}

fn merge_location(kept: &mut Location, later: Location) {
    fill_missing(&mut kept.complement, later.complement);
    fill_missing(&mut kept.coordinates, later.coordinates);
}

fn merge_station(kept: &mut StationEntry, later: StationEntry) {
    fill_missing(&mut kept.station.trade_name, later.station.trade_name);
    fill_missing(&mut kept.station.brand, later.station.brand);
}

// ---------------------------------------------------------------------------
// Entity phases
// ---------------------------------------------------------------------------

fn resolve_locations<S: PriceStore + ?Sized>(
    registry: &Registry<Location>,
    store: &mut S,
    chunk_size: usize,
    result: &mut Reconciled,
) -> Result<Resolved, StoreError> {
    let found = store.find_locations(&registry.keys())?;
    let mut resolved: Resolved = vec![Err(String::new()); registry.len()];
    let mut planned = Vec::new();

    for (idx, key, incoming) in registry.iter() {
        match found.get(key) {
            Some(stored) => match location_changes(&stored.location, incoming) {
                Some(location) => planned.push(Planned {
                    idx,
                    op: WriteOp::UpdateLocation { id: stored.id, location },
                    existing: Some(stored.id),
                }),
                None => resolved[idx] = Ok(stored.id),
            },
            None => planned.push(Planned {
                idx,
                op: WriteOp::InsertLocation(incoming.clone()),
                existing: None,
            }),
        }
    }

    let counts = run_phase(store, planned, &mut resolved, chunk_size, "location")?;
    result.entity_inserts.locations = counts.inserted;
    result.entity_updates.locations = counts.updated;
    Ok(resolved)
}

fn resolve_products<S: PriceStore + ?Sized>(
    registry: &Registry<Product>,
    store: &mut S,
    chunk_size: usize,
    result: &mut Reconciled,
) -> Result<Resolved, StoreError> {
    let found = store.find_products(&registry.keys())?;
    let mut resolved: Resolved = vec![Err(String::new()); registry.len()];
    let mut planned = Vec::new();

    for (idx, key, incoming) in registry.iter() {
        match found.get(key) {
            Some(stored) if stored.product != *incoming => planned.push(Planned {
                idx,
                op: WriteOp::UpdateProduct {
                    id: stored.id,
                    product: incoming.clone(),
                },
                existing: Some(stored.id),
            }),
            Some(stored) => resolved[idx] = Ok(stored.id),
            None => planned.push(Planned {
                idx,
                op: WriteOp::InsertProduct(incoming.clone()),
                existing: None,
            }),
        }
    }

    let counts = run_phase(store, planned, &mut resolved, chunk_size, "product")?;
    result.entity_inserts.products = counts.inserted;
    result.entity_updates.products = counts.updated;
    Ok(resolved)
}

fn resolve_stations<S: PriceStore + ?Sized>(
    registry: &Registry<StationEntry>,
    location_ids: &Resolved,
    store: &mut S,
    chunk_size: usize,
    result: &mut Reconciled,
) -> Result<Resolved, StoreError> {
    let found = store.find_stations(&registry.keys())?;
    let mut resolved: Resolved = vec![Err(String::new()); registry.len()];
    let mut planned = Vec::new();

    for (idx, key, entry) in registry.iter() {
        let stored = found.get(key);
        let location_id = match location_ids.get(entry.location) {
            Some(Ok(id)) => *id,
            Some(Err(e)) => {
                // An existing station can stay where it is.
                match stored {
                    Some(s) => resolved[idx] = Ok(s.id),
                    None => resolved[idx] = Err(format!("location not stored: {e}")),
                }
                continue;
            }
            None => {
                resolved[idx] = Err("location not resolved".to_string());
                continue;
            }
        };

        match stored {
            Some(s) => match station_changes(&s.station, s.location_id, &entry.station, location_id) {
                Some(station) => planned.push(Planned {
                    idx,
                    op: WriteOp::UpdateStation {
                        id: s.id,
                        location_id,
                        station,
                    },
                    existing: Some(s.id),
                }),
                None => resolved[idx] = Ok(s.id),
            },
            None => planned.push(Planned {
                idx,
                op: WriteOp::InsertStation {
                    location_id,
                    station: entry.station.clone(),
                },
                existing: None,
            }),
        }
    }

    let counts = run_phase(store, planned, &mut resolved, chunk_size, "station")?;
    result.entity_inserts.stations = counts.inserted;
    result.entity_updates.stations = counts.updated;
    Ok(resolved)
}

/// Stored location with incoming non-empty secondary fields applied, or
/// `None` when nothing differs.
fn location_changes(stored: &Location, incoming: &Location) -> Option<Location> {
    let mut merged = stored.clone();
    let mut changed = false;

    if let Some(c) = non_empty(&incoming.complement) {
        if stored.complement.as_deref() != Some(c) {
            merged.complement = Some(c.to_string());
            changed = true;
        }
    }
    if let Some(point) = incoming.coordinates {
        if stored.coordinates != Some(point) {
            merged.coordinates = Some(point);
            changed = true;
        }
    }

    changed.then_some(merged)
}

fn station_changes(
    stored: &Station,
    stored_location: RowId,
    incoming: &Station,
    location_id: RowId,
) -> Option<Station> {
    let mut merged = stored.clone();
    let mut changed = stored_location != location_id;

    if !incoming.legal_name.trim().is_empty() && incoming.legal_name != stored.legal_name {
        merged.legal_name = incoming.legal_name.clone();
        changed = true;
    }
    if let Some(name) = non_empty(&incoming.trade_name) {
        if stored.trade_name.as_deref() != Some(name) {
            merged.trade_name = Some(name.to_string());
            changed = true;
        }
    }
    if let Some(brand) = non_empty(&incoming.brand) {
        if stored.brand.as_deref() != Some(brand) {
            merged.brand = Some(brand.to_string());
            changed = true;
        }
    }
    if incoming.active != stored.active {
        merged.active = incoming.active;
        changed = true;
    }

    changed.then_some(merged)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Write one phase and record the resulting ids. A failed soft update keeps
/// the stored id; a failed insert leaves the entity unresolved.
fn run_phase<S: PriceStore + ?Sized>(
    store: &mut S,
    planned: Vec<Planned>,
    resolved: &mut Resolved,
    chunk_size: usize,
    label: &str,
) -> Result<PhaseCounts, StoreError> {
    let ops: Vec<WriteOp> = planned.iter().map(|p| p.op.clone()).collect();
    let results = write_chunked(store, &ops, chunk_size, label)?;

    let mut counts = PhaseCounts::default();
    for (plan, outcome) in planned.into_iter().zip(results) {
        match (outcome, plan.existing) {
            (Ok(id), None) => {
                counts.inserted += 1;
                resolved[plan.idx] = Ok(id);
            }
            (Ok(id), Some(_)) => {
                counts.updated += 1;
                tracing::debug!(entity = label, id, "secondary fields updated");
                resolved[plan.idx] = Ok(id);
            }
            (Err(e), Some(id)) => {
                tracing::warn!(entity = label, id, error = %e, "soft update failed, keeping stored values");
                resolved[plan.idx] = Ok(id);
            }
            (Err(e), None) => {
                tracing::warn!(entity = label, error = %e, "insert failed");
                resolved[plan.idx] = Err(e.to_string());
            }
        }
    }

    tracing::info!(
        entity = label,
        inserted = counts.inserted,
        updated = counts.updated,
        "entities resolved"
    );
    Ok(counts)
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

fn reconcile_observations<S: PriceStore + ?Sized>(
    candidates: Vec<Candidate>,
    refs: &[Refs],
    station_ids: &Resolved,
    product_ids: &Resolved,
    store: &mut S,
    chunk_size: usize,
) -> Result<Vec<(usize, RowOutcome)>, StoreError> {
    let mut outcomes: Vec<Option<RowOutcome>> = vec![None; candidates.len()];
    let mut pairs: Vec<Option<PairKey>> = vec![None; candidates.len()];
    let mut last_for_key: HashMap<(RowId, RowId, NaiveDate), usize> = HashMap::new();
    // Winner → earlier rows it superseded. They share the winner's fate if its write fails.
    let mut superseded: HashMap<usize, Vec<usize>> = HashMap::new();

    for (i, (candidate, r)) in candidates.iter().zip(refs).enumerate() {
        let station = station_ids.get(r.station).cloned().unwrap_or_else(|| Err("station not resolved".into()));
        let product = product_ids.get(r.product).cloned().unwrap_or_else(|| Err("product not resolved".into()));

        let (station_id, product_id) = match (station, product) {
            (Ok(s), Ok(p)) => (s, p),
            (Err(e), _) => {
                outcomes[i] = Some(persistence_error(&candidate.raw, format!("station not stored: {e}")));
                continue;
            }
            (_, Err(e)) => {
                outcomes[i] = Some(persistence_error(&candidate.raw, format!("product not stored: {e}")));
                continue;
            }
        };

        pairs[i] = Some((station_id, product_id));
        let key = (station_id, product_id, candidate.mapped.observation.collected_on);
        if let Some(earlier) = last_for_key.insert(key, i) {
            outcomes[earlier] = Some(RowOutcome::Skipped(SkipReason::SupersededInFile));
            let mut lost = superseded.remove(&earlier).unwrap_or_default();
            lost.push(earlier);
            superseded.insert(i, lost);
        }
    }

    let mut wanted: Vec<PairKey> = last_for_key.keys().map(|&(s, p, _)| (s, p)).collect();
    wanted.sort_unstable();
    wanted.dedup();
    let latest = store.latest_observations(&wanted)?;

    let mut survivors: Vec<usize> = last_for_key.into_values().collect();
    survivors.sort_unstable();

    let mut ops = Vec::new();
    let mut pending: Vec<(usize, Decision)> = Vec::new();
    for i in survivors {
        let Some(pair) = pairs[i] else { continue };
        let observation = &candidates[i].mapped.observation;
        let decision = decide(latest.get(&pair), observation);
        match decision {
            Decision::Insert | Decision::Supersede => ops.push(WriteOp::InsertObservation {
                station_id: pair.0,
                product_id: pair.1,
                observation: observation.clone(),
            }),
            Decision::Overwrite { id } => ops.push(WriteOp::UpdateObservation {
                id,
                observation: observation.clone(),
            }),
            Decision::Skip(reason) => {
                outcomes[i] = Some(RowOutcome::Skipped(reason));
                continue;
            }
        }
        pending.push((i, decision));
    }

    let results = write_chunked(store, &ops, chunk_size, "price_observation")?;
    for ((i, decision), written) in pending.into_iter().zip(results) {
        outcomes[i] = Some(match written {
            Ok(_) if decision.is_update() => RowOutcome::Updated,
            Ok(_) => RowOutcome::Inserted,
            Err(e) => {
                for &earlier in superseded.get(&i).into_iter().flatten() {
                    outcomes[earlier] = Some(persistence_error(
                        &candidates[earlier].raw,
                        format!("superseded by row {}, which was not stored: {e}", candidates[i].raw.row),
                    ));
                }
                persistence_error(&candidates[i].raw, e.to_string())
            }
        });
    }

    Ok(candidates
        .into_iter()
        .zip(outcomes)
        .map(|(c, outcome)| {
            let outcome = outcome.unwrap_or_else(|| persistence_error(&c.raw, "row was not reconciled".to_string()));
            (c.raw.row, outcome)
        })
        .collect())
}

fn persistence_error(raw: &RawRow, message: String) -> RowOutcome {
    RowOutcome::Errored(RowError::new(raw.clone(), message, ErrorKind::Persistence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use chrono::NaiveDate;
    use fuelgrid_core::{GeoPoint, Price, PriceObservation, ProductCategory, TaxId, UnitOfMeasure};

    fn candidate(row: usize, tax_id: &str, city: &str, product: &str, date: (u32, u32), price: &str) -> Candidate {
        let raw = RawRow::new(row, &["CNPJ".to_string()], &[tax_id.to_string()]);
        Candidate {
            raw,
            mapped: MappedRow {
                row,
                location: Location {
                    state: "SP".into(),
                    city: city.into(),
                    street: Some("AV PAULISTA".into()),
                    number: Some("1000".into()),
                    complement: None,
                    neighborhood: None,
                    postal_code: Some("01310-100".into()),
                    coordinates: None,
                },
                product: Product {
                    name: product.into(),
                    category: ProductCategory::Fuel,
                    unit: UnitOfMeasure::Liter,
                    active: true,
                },
                station: Station {
                    tax_id: TaxId::parse(tax_id).unwrap(),
                    legal_name: "AUTO POSTO LTDA".into(),
                    trade_name: None,
                    brand: None,
                    active: true,
                },
                observation: PriceObservation {
                    collected_on: NaiveDate::from_ymd_opt(2025, date.0, date.1).unwrap(),
                    price: Some(Price::parse(price).unwrap()),
                    active: true,
                },
            },
        }
    }

    const TAX: &str = "12345678000190";

    #[test]
    fn duplicate_entities_collapse_to_first_seen() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let rows = vec![
            candidate(1, TAX, "SAO PAULO", "GASOLINA COMUM", (5, 1), "5,59"),
            candidate(2, TAX, "CAMPINAS", "ETANOL", (5, 1), "3,99"),
            candidate(3, TAX, "SAO PAULO", "GASOLINA COMUM", (5, 2), "5,61"),
        ];
        let out = reconcile(rows, &mut store, 250).unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.stations, 1);
        assert_eq!(counts.products, 2);
        assert_eq!(counts.locations, 2);
        assert_eq!(counts.observations, 3);
        assert_eq!(out.entity_inserts.stations, 1);

        // The station stays at the first location it was seen at.
        let city: String = store
            .connection()
            .query_row(
                "SELECT l.city FROM stations s JOIN locations l ON l.id = s.location_id",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(city, "SAO PAULO");
        assert!(out.outcomes.iter().all(|(_, o)| *o == RowOutcome::Inserted));
    }

    #[test]
    fn second_run_skips_everything() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let rows = || {
            vec![
                candidate(1, TAX, "SAO PAULO", "GASOLINA COMUM", (5, 1), "5,59"),
                candidate(2, TAX, "SAO PAULO", "ETANOL", (5, 1), "3,99"),
            ]
        };
        reconcile(rows(), &mut store, 250).unwrap();
        let again = reconcile(rows(), &mut store, 250).unwrap();
        assert!(again
            .outcomes
            .iter()
            .all(|(_, o)| *o == RowOutcome::Skipped(SkipReason::Identical)));
        assert_eq!(again.entity_inserts, EntityStats::default());
        assert_eq!(again.entity_updates, EntityStats::default());
    }

    #[test]
    fn later_duplicate_in_file_wins() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let rows = vec![
            candidate(1, TAX, "SAO PAULO", "GASOLINA COMUM", (5, 1), "5,59"),
            candidate(2, TAX, "SAO PAULO", "GASOLINA COMUM", (5, 1), "5,69"),
        ];
        let out = reconcile(rows, &mut store, 250).unwrap();
        assert_eq!(out.outcomes[0], (1, RowOutcome::Skipped(SkipReason::SupersededInFile)));
        assert_eq!(out.outcomes[1], (2, RowOutcome::Inserted));

        let price: i64 = store
            .connection()
            .query_row("SELECT price FROM price_observations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(price, 56_900);
    }

    #[test]
    fn superseded_rows_fail_with_their_winner() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER no_bad_price BEFORE INSERT ON price_observations
                 WHEN NEW.price = 56900
                 BEGIN SELECT RAISE(ABORT, 'price refused'); END;",
            )
            .unwrap();

        let rows = vec![
            candidate(1, TAX, "SAO PAULO", "GASOLINA COMUM", (5, 1), "5,59"),
            candidate(2, TAX, "SAO PAULO", "GASOLINA COMUM", (5, 1), "5,63"),
            candidate(3, TAX, "SAO PAULO", "GASOLINA COMUM", (5, 1), "5,69"),
        ];
        let out = reconcile(rows, &mut store, 250).unwrap();

        for (row, outcome) in &out.outcomes {
            match outcome {
                RowOutcome::Errored(e) => {
                    assert_eq!(e.kind, ErrorKind::Persistence);
                    if *row < 3 {
                        assert!(e.error.contains("superseded by row 3"), "{}", e.error);
                    }
                    assert!(e.error.contains("price refused"), "{}", e.error);
                }
                other => panic!("row {row}: expected error, got {other:?}"),
            }
        }
        assert_eq!(store.counts().unwrap().observations, 0);
    }

    #[test]
    fn secondary_fields_are_soft_updated() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        reconcile(
            vec![candidate(1, TAX, "SAO PAULO", "GASOLINA COMUM", (5, 1), "5,59")],
            &mut store,
            250,
        )
        .unwrap();

        let mut next = candidate(1, TAX, "SAO PAULO", "GASOLINA COMUM", (5, 8), "5,65");
        next.mapped.station.brand = Some("IPIRANGA".into());
        next.mapped.location.coordinates = Some(GeoPoint {
            latitude: -23.56,
            longitude: -46.65,
        });
        let out = reconcile(vec![next], &mut store, 250).unwrap();

        assert_eq!(out.outcomes[0].1, RowOutcome::Updated);
        assert_eq!(out.entity_updates.stations, 1);
        assert_eq!(out.entity_updates.locations, 1);
        let brand: String = store
            .connection()
            .query_row("SELECT brand FROM stations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(brand, "IPIRANGA");
        assert_eq!(store.counts().unwrap().observations, 2);
    }

    #[test]
    fn failed_station_turns_its_rows_into_errors() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER no_bad_station BEFORE INSERT ON stations
                 WHEN NEW.tax_id = '99888777000166'
                 BEGIN SELECT RAISE(ABORT, 'station refused'); END;",
            )
            .unwrap();

        let rows = vec![
            candidate(1, TAX, "SAO PAULO", "GASOLINA COMUM", (5, 1), "5,59"),
            candidate(2, "99888777000166", "SAO PAULO", "GASOLINA COMUM", (5, 1), "5,49"),
            candidate(3, "11222333000144", "SAO PAULO", "GASOLINA COMUM", (5, 1), "5,39"),
        ];
        let out = reconcile(rows, &mut store, 250).unwrap();

        assert_eq!(out.outcomes[0].1, RowOutcome::Inserted);
        assert_eq!(out.outcomes[2].1, RowOutcome::Inserted);
        match &out.outcomes[1].1 {
            RowOutcome::Errored(e) => {
                assert_eq!(e.row, 2);
                assert_eq!(e.kind, ErrorKind::Persistence);
                assert!(e.error.contains("station refused"), "{}", e.error);
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(store.counts().unwrap().stations, 2);
    }
}
