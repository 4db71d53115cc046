//! Engine configuration
//!
//! Controls where relations live on disk and how cardinality sketches are
//! sized and persisted.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smallest and largest HyperLogLog precision accepted (register index bits)
pub const MIN_SKETCH_PRECISION: u8 = 4;
pub const MAX_SKETCH_PRECISION: u8 = 18;
/// 4096 registers, ~1.6% error
pub const DEFAULT_SKETCH_PRECISION: u8 = 12;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding `<table>.<file_extension>` relation files
    pub data_dir: PathBuf,

    /// Relation file extension (default: `csv`)
    pub file_extension: String,

    /// HyperLogLog precision: 2^p registers, standard error ≈ 1.04 / sqrt(2^p)
    pub sketch_precision: u8,

    /// Write a `<table>.hll` sketch next to every persisted relation
    pub persist_sketches: bool,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            file_extension: "csv".to_string(),
            sketch_precision: DEFAULT_SKETCH_PRECISION,
            persist_sketches: true,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Small sketches and no sketch files, for tests
    pub fn for_testing<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            sketch_precision: 10,
            persist_sketches: false,
            log_level: "debug".to_string(),
            ..Default::default()
        }
    }

    /// Load a JSON config file. Missing keys fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if !(MIN_SKETCH_PRECISION..=MAX_SKETCH_PRECISION).contains(&self.sketch_precision) {
            return Err(StorageError::InvalidConfig(format!(
                "sketch_precision must be in {}..={}, got {}",
                MIN_SKETCH_PRECISION, MAX_SKETCH_PRECISION, self.sketch_precision
            )));
        }
        if self.file_extension.trim().is_empty() {
            return Err(StorageError::InvalidConfig(
                "file_extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of a relation file, e.g. `data/orders.csv`
    pub fn relation_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{}", table, self.file_extension))
    }

    /// Path of a persisted sketch, e.g. `data/orders.hll`
    pub fn sketch_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{}.hll", table))
    }
}
