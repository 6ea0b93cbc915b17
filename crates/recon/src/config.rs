use std::path::{Path, PathBuf};
use std::time::Duration;

use fuelgrid_core::ColumnLayout;
use fuelgrid_io::AcquireOptions;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "FUELGRID_CONFIG";

pub const DEFAULT_CHUNK_SIZE: usize = 250;
pub const MAX_CHUNK_SIZE: usize = 10_000;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Observation writes per transaction.
    pub chunk_size: usize,
    /// Header text that marks the header row.
    pub anchor_token: String,
    /// SQLite database file.
    pub database: PathBuf,
    /// Where acquired sources and intermediate tables live during a run.
    /// Defaults to the system temp dir.
    pub scratch_dir: Option<PathBuf>,
    pub http_timeout_secs: u64,
    pub columns: ColumnLayout,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            anchor_token: "CNPJ".to_string(),
            database: PathBuf::from("fuelgrid.db"),
            scratch_dir: None,
            http_timeout_secs: 120,
            columns: ColumnLayout::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl IngestConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: IngestConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// `explicit` path, else `$FUELGRID_CONFIG`, else the user config file
    /// if one exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Self::load(Path::new(&path));
        }
        match Self::user_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/fuelgrid/ingest.toml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("fuelgrid").join("ingest.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ConfigError::Invalid(format!(
                "chunk_size must be between 1 and {MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }

        if self.anchor_token.trim().is_empty() {
            return Err(ConfigError::Invalid("anchor_token must not be blank".into()));
        }

        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("http_timeout_secs must be positive".into()));
        }

        let blank = self.columns.blank_fields();
        if !blank.is_empty() {
            let names: Vec<String> = blank.iter().map(|f| f.to_string()).collect();
            return Err(ConfigError::Invalid(format!(
                "[columns] has blank header names for: {}",
                names.join(", ")
            )));
        }

        Ok(())
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn acquire_options(&self) -> AcquireOptions {
        AcquireOptions {
            scratch_dir: self.scratch_dir(),
            timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
