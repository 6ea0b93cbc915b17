//! `fuelgrid ingest`, `fuelgrid normalize` and `fuelgrid validate-config`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fuelgrid_io::csv::write_table;
use fuelgrid_recon::{ingest, normalize_source, IngestConfig, IngestReport, SqliteStore};

use crate::exit_codes::{EXIT_ROW_ERRORS, EXIT_STORAGE_UNAVAILABLE, EXIT_USAGE};
use crate::CliError;

/// Row errors printed in the human summary before truncating.
const MAX_ERRORS_SHOWN: usize = 20;

pub struct IngestOptions {
    pub source: String,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub strict: bool,
    pub db: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub config: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<IngestConfig, CliError> {
    IngestConfig::discover(path).map_err(|e| CliError::new(EXIT_USAGE, e.to_string()))
}

pub fn cmd_ingest(opts: IngestOptions) -> Result<(), CliError> {
    let mut config = load_config(opts.config.as_deref())?;
    if let Some(db) = opts.db {
        config.database = db;
    }
    if let Some(chunk_size) = opts.chunk_size {
        config.chunk_size = chunk_size;
        config
            .validate()
            .map_err(|e| CliError::args(e.to_string()).with_hint("--chunk-size must be between 1 and 10000"))?;
    }

    tracing::debug!(
        database = %config.database.display(),
        chunk_size = config.chunk_size,
        "config resolved"
    );

    let mut store = SqliteStore::open(&config.database).map_err(|e| {
        CliError::new(EXIT_STORAGE_UNAVAILABLE, e.to_string())
            .with_hint(format!("database path: {}", config.database.display()))
    })?;

    let report = ingest(&opts.source, &config, &mut store).map_err(CliError::ingest)?;

    let json_str = serde_json::to_string_pretty(&report)
        .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = opts.output {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }

    if opts.json {
        println!("{json_str}");
    } else {
        print_summary(&report).map_err(|e| CliError::io(e.to_string()))?;
    }

    if opts.strict && report.has_errors() {
        return Err(CliError::new(
            EXIT_ROW_ERRORS,
            format!("{} of {} rows failed", report.errors.len(), report.processed),
        ));
    }
    Ok(())
}

fn print_summary(report: &IngestReport) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "{}", report.summary)?;
    let ins = &report.entity_inserts;
    let upd = &report.entity_updates;
    writeln!(
        out,
        "stations: {} new, {} updated; locations: {} new, {} updated; products: {} new, {} updated",
        ins.stations, upd.stations, ins.locations, upd.locations, ins.products, upd.products,
    )?;

    for err in report.errors.iter().take(MAX_ERRORS_SHOWN) {
        writeln!(out, "  row {}: {}", err.row, err.error)?;
    }
    if report.errors.len() > MAX_ERRORS_SHOWN {
        writeln!(
            out,
            "  ... and {} more (use --json for the full list)",
            report.errors.len() - MAX_ERRORS_SHOWN
        )?;
    }
    writeln!(out, "done in {} ms", report.duration_ms)
}

pub fn cmd_normalize(source: String, output: Option<PathBuf>, config: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(config.as_deref())?;
    let table = normalize_source(&source, &config).map_err(CliError::ingest)?;

    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .map_err(|e| CliError::io(format!("cannot create {}: {e}", path.display())))?;
            write_table(&table, io::BufWriter::new(file)).map_err(|e| CliError::io(e.to_string()))?;
            eprintln!("wrote {} rows to {}", table.rows.len(), path.display());
        }
        None => {
            let stdout = io::stdout();
            write_table(&table, stdout.lock()).map_err(|e| CliError::io(e.to_string()))?;
        }
    }
    Ok(())
}

pub fn cmd_validate_config(file: PathBuf) -> Result<(), CliError> {
    let config = IngestConfig::load(&file).map_err(|e| CliError::args(e.to_string()))?;
    println!(
        "ok: {} (database {}, chunk size {}, anchor '{}')",
        file.display(),
        config.database.display(),
        config.chunk_size,
        config.anchor_token
    );
    Ok(())
}
