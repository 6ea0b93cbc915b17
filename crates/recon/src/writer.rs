use std::slice;

use crate::error::StoreError;
use crate::store::{PriceStore, RowId, WriteOp};

/// Per-op result of a chunked write, aligned with the input ops.
pub type WriteResults = Vec<Result<RowId, StoreError>>;

/// Write `ops` in transactions of `chunk_size`.
///
/// A chunk that fails is rolled back by the store and its ops are retried
/// one per transaction, so only the ops that fail on their own are lost.
/// `Unavailable` stops everything and is returned as the outer error.
pub fn write_chunked<S: PriceStore + ?Sized>(
    store: &mut S,
    ops: &[WriteOp],
    chunk_size: usize,
    label: &str,
) -> Result<WriteResults, StoreError> {
    let mut results = Vec::with_capacity(ops.len());

    for (chunk_no, chunk) in ops.chunks(chunk_size.max(1)).enumerate() {
        match store.apply(chunk) {
            Ok(ids) if ids.len() == chunk.len() => {
                tracing::debug!(entity = label, chunk = chunk_no, size = chunk.len(), "chunk committed");
                results.extend(ids.into_iter().map(Ok));
            }
            Ok(ids) => {
                return Err(StoreError::Query(format!(
                    "store returned {} ids for {} writes",
                    ids.len(),
                    chunk.len()
                )));
            }
            Err(e) if e.is_unavailable() => {
                tracing::error!(entity = label, chunk = chunk_no, error = %e, "storage unavailable");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    entity = label,
                    chunk = chunk_no,
                    size = chunk.len(),
                    error = %e,
                    "chunk rolled back, retrying row by row"
                );
                for op in chunk {
                    results.push(write_one(store, op)?);
                }
            }
        }
    }

    Ok(results)
}

/// Outer `Err` only when the store is unavailable.
fn write_one<S: PriceStore + ?Sized>(
    store: &mut S,
    op: &WriteOp,
) -> Result<Result<RowId, StoreError>, StoreError> {
    match store.apply(slice::from_ref(op)) {
        Ok(ids) => Ok(ids
            .first()
            .copied()
            .ok_or_else(|| StoreError::Query("store returned no id".into()))),
        Err(e) if e.is_unavailable() => Err(e),
        Err(e) => {
            tracing::debug!(error = %e, "write failed");
            Ok(Err(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::store::{PairKey, StoredLocation, StoredObservation, StoredProduct, StoredStation};
    use fuelgrid_core::{Product, ProductCategory, UnitOfMeasure};

    /// Rejects any batch containing a product named "POISON"; counts calls.
    #[derive(Default)]
    struct FakeStore {
        calls: Vec<usize>,
        next_id: RowId,
        unavailable: bool,
    }

    impl PriceStore for FakeStore {
        fn find_locations(&self, _: &[String]) -> Result<HashMap<String, StoredLocation>, StoreError> {
            Ok(HashMap::new())
        }
        fn find_products(&self, _: &[String]) -> Result<HashMap<String, StoredProduct>, StoreError> {
            Ok(HashMap::new())
        }
        fn find_stations(&self, _: &[String]) -> Result<HashMap<String, StoredStation>, StoreError> {
            Ok(HashMap::new())
        }
        fn latest_observations(
            &self,
            _: &[PairKey],
        ) -> Result<HashMap<PairKey, StoredObservation>, StoreError> {
            Ok(HashMap::new())
        }
        fn apply(&mut self, ops: &[WriteOp]) -> Result<Vec<RowId>, StoreError> {
            self.calls.push(ops.len());
            if self.unavailable {
                return Err(StoreError::Unavailable("disk gone".into()));
            }
            let poisoned = ops
                .iter()
                .any(|op| matches!(op, WriteOp::InsertProduct(p) if p.name == "POISON"));
            if poisoned {
                return Err(StoreError::Rejected("poisoned".into()));
            }
            Ok(ops
                .iter()
                .map(|_| {
                    self.next_id += 1;
                    self.next_id
                })
                .collect())
        }
    }

    fn product(name: &str) -> WriteOp {
        WriteOp::InsertProduct(Product {
            name: name.into(),
            category: ProductCategory::Fuel,
            unit: UnitOfMeasure::Liter,
            active: true,
        })
    }

    #[test]
    fn clean_chunks_commit_whole() {
        let mut store = FakeStore::default();
        let ops: Vec<WriteOp> = (0..5).map(|i| product(&format!("P{i}"))).collect();
        let results = write_chunked(&mut store, &ops, 2, "product").unwrap();
        assert_eq!(store.calls, vec![2, 2, 1]);
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(Result::is_ok));
    }

    #[test]
    fn poisoned_chunk_falls_back_to_single_rows() {
        let mut store = FakeStore::default();
        let ops = vec![product("A"), product("POISON"), product("B"), product("C")];
        let results = write_chunked(&mut store, &ops, 3, "product").unwrap();

        // chunk [A, POISON, B] fails, then 3 single retries, then chunk [C]
        assert_eq!(store.calls, vec![3, 1, 1, 1, 1]);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(StoreError::Rejected(_))));
        assert!(results[2].is_ok());
        assert!(results[3].is_ok());
    }

    #[test]
    fn unavailable_store_is_fatal() {
        let mut store = FakeStore {
            unavailable: true,
            ..FakeStore::default()
        };
        let err = write_chunked(&mut store, &[product("A"), product("B")], 10, "product").unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(store.calls, vec![2]);
    }
}
