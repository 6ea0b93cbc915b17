//! `fuelgrid-recon`: reconciliation of price sheets against storage.
//!
//! Collapses mapped rows onto unique locations, products and stations,
//! applies the recency policy to price observations and writes the result
//! in chunked transactions. [`pipeline::ingest`] runs a whole source end to end.

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod report;
pub mod sqlite;
pub mod store;
pub mod writer;

pub use config::IngestConfig;
pub use engine::{reconcile, Candidate, Reconciled};
pub use error::{ConfigError, IngestError, StoreError};
pub use pipeline::{ingest, ingest_table, normalize_source};
pub use policy::{decide, Decision, SkipReason};
pub use report::{EntityStats, ErrorKind, IngestReport, RowError, RowOutcome, SkipBreakdown};
pub use sqlite::{SqliteStore, TableCounts};
pub use store::{PriceStore, RowId, WriteOp};
