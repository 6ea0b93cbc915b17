//! One ingestion run, source to report.
//!
//! acquire → first worksheet → normalized table → intermediate CSV →
//! validate → map → reconcile. The downloaded file and the intermediate CSV
//! are temp files owned by this module; they are removed when the run ends,
//! whether it succeeded or not.

use std::time::Instant;

use fuelgrid_core::{map_row, validate_row};
use fuelgrid_io::csv::{read_table, write_intermediate};
use fuelgrid_io::{acquire, load_grid, normalize, Table};

use crate::config::IngestConfig;
use crate::engine::{reconcile, Candidate};
use crate::error::IngestError;
use crate::report::{ErrorKind, IngestReport, RowError, RowOutcome};
use crate::store::PriceStore;

/// Ingest the sheet at `source` (URL, `file://` URL or path) into `store`.
pub fn ingest<S: PriceStore + ?Sized>(
    source: &str,
    config: &IngestConfig,
    store: &mut S,
) -> Result<IngestReport, IngestError> {
    let span = tracing::info_span!("ingest", source);
    let _enter = span.enter();
    let started = Instant::now();

    let table = normalize_source(source, config)?;
    let mut report = ingest_table(&table, config, store)?;
    report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    tracing::info!(
        processed = report.processed,
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped,
        errors = report.errors.len(),
        duration_ms = report.duration_ms,
        "ingest finished"
    );
    Ok(report)
}

/// Fetch and normalize `source`, round-tripping it through the intermediate
/// CSV so every input kind reaches validation in the same shape.
pub fn normalize_source(source: &str, config: &IngestConfig) -> Result<Table, IngestError> {
    let file = acquire(source, &config.acquire_options())?;
    let grid = load_grid(&file)?;
    let table = normalize(&grid, &config.anchor_token)?;

    let intermediate = write_intermediate(&table, &config.scratch_dir())?;
    let table = read_table(intermediate.path())?;
    tracing::debug!(
        path = %intermediate.path().display(),
        rows = table.rows.len(),
        "intermediate table read back"
    );
    Ok(table)
}

/// Validate, map and reconcile an already normalized table.
pub fn ingest_table<S: PriceStore + ?Sized>(
    table: &Table,
    config: &IngestConfig,
    store: &mut S,
) -> Result<IngestReport, IngestError> {
    let mut outcomes: Vec<(usize, RowOutcome)> = Vec::new();
    let mut candidates = Vec::new();

    for raw in table.raw_rows() {
        match validate_row(&raw, &config.columns).into_result() {
            Err(problems) => {
                tracing::debug!(row = raw.row, problems = problems.len(), "row failed validation");
                outcomes.push((
                    raw.row,
                    RowOutcome::Errored(RowError::new(raw, problems.join("; "), ErrorKind::Validation)),
                ));
            }
            Ok(row) => match map_row(&row) {
                Ok(mapped) => candidates.push(Candidate { raw, mapped }),
                Err(e) => {
                    tracing::debug!(row = raw.row, error = %e, "row failed mapping");
                    outcomes.push((
                        raw.row,
                        RowOutcome::Errored(RowError::new(raw, e.to_string(), ErrorKind::Mapping)),
                    ));
                }
            },
        }
    }

    tracing::info!(
        rows = table.rows.len(),
        accepted = candidates.len(),
        rejected = outcomes.len(),
        "rows validated"
    );

    let reconciled = reconcile(candidates, store, config.chunk_size)?;

    outcomes.extend(reconciled.outcomes);
    outcomes.sort_by_key(|(row, _)| *row);

    let mut report = IngestReport::from_outcomes(outcomes.into_iter().map(|(_, outcome)| outcome));
    report.entity_inserts = reconciled.entity_inserts;
    report.entity_updates = reconciled.entity_updates;
    Ok(report)
}
