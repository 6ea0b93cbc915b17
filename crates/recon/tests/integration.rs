use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fuelgrid_recon::{
    ingest, ErrorKind, IngestConfig, IngestError, IngestReport, SqliteStore,
};
use tracing_subscriber::fmt::MakeWriter;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture(name: &str) -> String {
    fixtures_dir().join(name).to_string_lossy().into_owned()
}

fn config_in(scratch: &Path) -> IngestConfig {
    IngestConfig {
        scratch_dir: Some(scratch.to_path_buf()),
        ..IngestConfig::default()
    }
}

fn run(source: &str, config: &IngestConfig, store: &mut SqliteStore) -> IngestReport {
    ingest(source, config, store).unwrap_or_else(|e| panic!("ingest of {source} failed: {e}"))
}

fn scratch_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

fn observation_prices(store: &SqliteStore) -> Vec<(String, String, Option<i64>)> {
    let conn = store.connection();
    let mut stmt = conn
        .prepare(
            "SELECT p.name, o.collected_on, o.price
             FROM price_observations o JOIN products p ON p.id = o.product_id
             ORDER BY o.station_id, p.name, o.collected_on",
        )
        .unwrap();
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

/// Writer that collects formatted log output for assertions.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// -------------------------------------------------------------------------
// Whole-file runs
// -------------------------------------------------------------------------

#[test]
fn first_run_inserts_everything_past_the_preamble() {
    let scratch = tempfile::tempdir().unwrap();
    let config = config_in(scratch.path());
    let mut store = SqliteStore::open_in_memory().unwrap();

    let report = run(&fixture("survey_week1.csv"), &config, &mut store);

    assert_eq!(report.processed, 5);
    assert_eq!(report.inserted, 5);
    assert_eq!(report.updated, 0);
    assert_eq!(report.skipped, 0);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.summary, "5 rows processed: 5 inserted.");

    let counts = store.counts().unwrap();
    assert_eq!(counts.stations, 3);
    assert_eq!(counts.locations, 3);
    assert_eq!(counts.products, 4);
    assert_eq!(counts.observations, 5);
    assert_eq!(report.entity_inserts.stations, 3);

    // Blank price is kept as a null price, not an error.
    let prices = observation_prices(&store);
    assert!(prices.contains(&("DIESEL S10".to_string(), "2025-05-06".to_string(), None)));
    assert!(prices.contains(&("GASOLINA".to_string(), "2025-05-05".to_string(), Some(55_900))));

    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn rerunning_the_same_file_changes_nothing() {
    let scratch = tempfile::tempdir().unwrap();
    let config = config_in(scratch.path());
    let mut store = SqliteStore::open_in_memory().unwrap();

    run(&fixture("survey_week1.csv"), &config, &mut store);
    let before = store.counts().unwrap();
    let prices_before = observation_prices(&store);

    let again = run(&fixture("survey_week1.csv"), &config, &mut store);
    assert_eq!(again.processed, 5);
    assert_eq!(again.inserted, 0);
    assert_eq!(again.updated, 0);
    assert_eq!(again.skipped, 5);
    assert_eq!(again.skip_reasons.identical, 5);
    assert_eq!(store.counts().unwrap(), before);
    assert_eq!(observation_prices(&store), prices_before);
}

#[test]
fn recency_policy_across_weeks() {
    let scratch = tempfile::tempdir().unwrap();
    let config = config_in(scratch.path());
    let mut store = SqliteStore::open_in_memory().unwrap();

    run(&fixture("survey_week1.csv"), &config, &mut store);
    let report = run(&fixture("survey_week2.csv"), &config, &mut store);

    // newer gasoline date, same-date gasoline price change
    assert_eq!(report.updated, 2);
    // identical ethanol and LPG, diesel older than stored
    assert_eq!(report.skipped, 3);
    assert_eq!(report.skip_reasons.stale, 1);
    assert_eq!(report.skip_reasons.identical, 2);
    assert_eq!(report.inserted, 0);

    let prices = observation_prices(&store);
    // Station one keeps both dated gasoline rows.
    assert!(prices.contains(&("GASOLINA".to_string(), "2025-05-05".to_string(), Some(55_900))));
    assert!(prices.contains(&("GASOLINA".to_string(), "2025-05-12".to_string(), Some(56_500))));
    // Station two's gasoline was overwritten in place.
    assert!(prices.contains(&("GASOLINA".to_string(), "2025-05-06".to_string(), Some(57_500))));
    assert!(!prices.contains(&("GASOLINA".to_string(), "2025-05-06".to_string(), Some(57_900))));
    // Stale diesel was not written.
    assert!(!prices.iter().any(|(_, date, _)| date == "2025-05-01"));
    assert_eq!(store.counts().unwrap().observations, 6);
}

#[test]
fn bad_rows_do_not_stop_the_run() {
    let scratch = tempfile::tempdir().unwrap();
    let config = config_in(scratch.path());
    let mut store = SqliteStore::open_in_memory().unwrap();

    let report = run(&fixture("bad_rows.csv"), &config, &mut store);

    assert_eq!(report.processed, 6);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.errors.len(), 4);
    let rows: Vec<usize> = report.errors.iter().map(|e| e.row).collect();
    assert_eq!(rows, vec![2, 4, 5, 6]);
    assert!(report.errors.iter().all(|e| e.kind == ErrorKind::Validation));
    assert!(report.errors[0].error.contains("tax id"));
    assert!(report.errors[1].error.contains("31/02/2025"));
    assert!(report.errors[3].error.contains("city"));
    assert!(report.has_errors());

    // The raw payload comes back keyed by sheet header.
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["errors"][0]["data"]["CNPJ"], "123");
    assert_eq!(json["errors"][0]["row"], 2);
}

#[test]
fn one_station_for_many_rows_with_the_same_tax_id() {
    let scratch = tempfile::tempdir().unwrap();
    let source = scratch.path().join("big.csv");
    let mut file = std::fs::File::create(&source).unwrap();
    writeln!(file, "CNPJ;RAZÃO;MUNICÍPIO;ESTADO;PRODUTO;PREÇO DE REVENDA;DATA DA COLETA").unwrap();
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    for i in 0..500 {
        let date = start + chrono::Duration::days(i);
        let tax_id = if i % 2 == 0 { "12.345.678/0001-90" } else { "12345678000190" };
        writeln!(
            file,
            "{tax_id};AUTO POSTO CENTRAL LTDA;SAO PAULO;SP;GASOLINA;5,{:02};{}",
            i % 100,
            date.format("%d/%m/%Y")
        )
        .unwrap();
    }
    drop(file);

    let work = tempfile::tempdir().unwrap();
    let config = IngestConfig {
        chunk_size: 64,
        ..config_in(work.path())
    };
    let mut store = SqliteStore::open_in_memory().unwrap();
    let report = run(&source.to_string_lossy(), &config, &mut store);

    assert_eq!(report.processed, 500);
    assert_eq!(report.inserted, 500);
    let counts = store.counts().unwrap();
    assert_eq!(counts.stations, 1);
    assert_eq!(counts.locations, 1);
    assert_eq!(counts.products, 1);
    assert_eq!(counts.observations, 500);
}

// -------------------------------------------------------------------------
// Storage failures
// -------------------------------------------------------------------------

#[test]
fn rejected_write_falls_back_to_single_rows() {
    let scratch = tempfile::tempdir().unwrap();
    let config = IngestConfig {
        chunk_size: 2,
        ..config_in(scratch.path())
    };
    let mut store = SqliteStore::open_in_memory().unwrap();
    store
        .connection()
        .execute_batch(
            "CREATE TRIGGER poison BEFORE INSERT ON price_observations
             WHEN NEW.price = 1050000
             BEGIN SELECT RAISE(ABORT, 'poisoned row'); END;",
        )
        .unwrap();

    let logs = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();

    let report = tracing::subscriber::with_default(subscriber, || {
        run(&fixture("survey_week1.csv"), &config, &mut store)
    });

    assert_eq!(report.processed, 5);
    assert_eq!(report.inserted, 4);
    assert_eq!(report.errors.len(), 1);
    let err = &report.errors[0];
    assert_eq!(err.row, 5);
    assert_eq!(err.kind, ErrorKind::Persistence);
    assert!(err.error.contains("poisoned row"), "{}", err.error);
    assert_eq!(store.counts().unwrap().observations, 4);

    let text = logs.text();
    assert!(text.contains("chunk rolled back, retrying row by row"), "{text}");
    assert!(text.contains("ingest"), "{text}");
}

#[test]
fn read_only_storage_is_fatal() {
    let scratch = tempfile::tempdir().unwrap();
    let config = config_in(scratch.path());
    let mut store = SqliteStore::open_in_memory().unwrap();
    store.connection().execute_batch("PRAGMA query_only = ON;").unwrap();

    let err = ingest(&fixture("survey_week1.csv"), &config, &mut store).unwrap_err();
    match err {
        IngestError::StorageUnavailable(e) => assert!(e.is_unavailable()),
        other => panic!("expected StorageUnavailable, got {other:?}"),
    }
    assert!(scratch_is_empty(scratch.path()));
}

// -------------------------------------------------------------------------
// Fatal input errors
// -------------------------------------------------------------------------

#[test]
fn missing_source_is_an_acquisition_error() {
    let scratch = tempfile::tempdir().unwrap();
    let config = config_in(scratch.path());
    let mut store = SqliteStore::open_in_memory().unwrap();

    let err = ingest(&fixture("does_not_exist.csv"), &config, &mut store).unwrap_err();
    assert!(matches!(err, IngestError::Acquisition(_)), "{err:?}");
    assert_eq!(store.counts().unwrap().observations, 0);
}

#[test]
fn sheet_without_anchor_is_malformed() {
    let scratch = tempfile::tempdir().unwrap();
    let source = scratch.path().join("no_anchor.csv");
    std::fs::write(&source, "NOME;CIDADE\nPOSTO;SAO PAULO\n").unwrap();

    let work = tempfile::tempdir().unwrap();
    let config = config_in(work.path());
    let mut store = SqliteStore::open_in_memory().unwrap();

    let err = ingest(&source.to_string_lossy(), &config, &mut store).unwrap_err();
    assert!(matches!(err, IngestError::MalformedSpreadsheet(_)), "{err:?}");
    assert!(scratch_is_empty(work.path()));
}

#[test]
fn database_file_survives_reopen() {
    let scratch = tempfile::tempdir().unwrap();
    let db = scratch.path().join("prices.db");
    let work = tempfile::tempdir().unwrap();
    let config = config_in(work.path());

    {
        let mut store = SqliteStore::open(&db).unwrap();
        run(&fixture("survey_week1.csv"), &config, &mut store);
    }
    let mut store = SqliteStore::open(&db).unwrap();
    let report = run(&fixture("survey_week1.csv"), &config, &mut store);
    assert_eq!(report.skipped, 5);
    assert_eq!(store.counts().unwrap().observations, 5);
}
