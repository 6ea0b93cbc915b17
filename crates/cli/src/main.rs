// fuelgrid CLI - fuel price survey ingestion

mod exit_codes;
mod ingest;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{ingest_exit_code, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};
use fuelgrid_recon::IngestError;

#[derive(Parser)]
#[command(name = "fuelgrid")]
#[command(about = "Load fuel price survey spreadsheets into a price database")]
#[command(version)]
struct Cli {
    /// Log debug detail to stderr (overrides RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a price sheet (URL or path) into the database
    #[command(after_help = "\
Examples:
  fuelgrid ingest https://example.org/levantamento_semanal.xlsx
  fuelgrid ingest ./semana19.xlsx --db prices.db
  fuelgrid ingest ./semana19.csv --json --output report.json
  fuelgrid ingest ./semana19.xlsx --strict --chunk-size 500

Row errors are listed in the report and do not fail the run unless --strict is given.")]
    Ingest {
        /// Source: http(s) URL, file:// URL or local path
        source: String,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Also write the JSON report to this file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Exit non-zero when any row failed
        #[arg(long)]
        strict: bool,

        /// SQLite database file (overrides the config file)
        #[arg(long, env = "FUELGRID_DB")]
        db: Option<PathBuf>,

        /// Writes per transaction (overrides the config file)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Config file (default: $FUELGRID_CONFIG, then the user config dir)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Normalize a price sheet and print the intermediate CSV
    #[command(after_help = "\
Examples:
  fuelgrid normalize ./semana19.xlsx
  fuelgrid normalize https://example.org/levantamento_semanal.xlsx -o semana19.csv")]
    Normalize {
        /// Source: http(s) URL, file:// URL or local path
        source: String,

        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Check a config file without running anything
    ValidateConfig {
        /// Path to the TOML config file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Ingest {
            source,
            json,
            output,
            strict,
            db,
            chunk_size,
            config,
        } => ingest::cmd_ingest(ingest::IngestOptions {
            source,
            json,
            output,
            strict,
            db,
            chunk_size,
            config,
        }),
        Commands::Normalize { source, output, config } => ingest::cmd_normalize(source, output, config),
        Commands::ValidateConfig { file } => ingest::cmd_validate_config(file),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Logs go to stderr so `--json` output on stdout stays clean.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Fatal run error with its registry exit code and a hint where one helps.
    pub fn ingest(err: IngestError) -> Self {
        let code = ingest_exit_code(&err);
        let hint = match &err {
            IngestError::Acquisition(_) => Some("check the URL or path, and that the file is not empty"),
            IngestError::MalformedSpreadsheet(_) => {
                Some("the first worksheet needs a header row containing the anchor column (default CNPJ)")
            }
            IngestError::StorageUnavailable(_) => {
                Some("check that the database file is writable and not locked by another process")
            }
            IngestError::Config(_) => Some("run `fuelgrid validate-config <FILE>` for details"),
            IngestError::Storage(_) => Some("the database may hold rows written by another tool; run with --verbose for details"),
            IngestError::Io(_) => None,
        };
        Self {
            code,
            message: err.to_string(),
            hint: hint.map(str::to_string),
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
