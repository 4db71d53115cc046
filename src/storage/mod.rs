//! Storage layer
//!
//! Relations are loaded and persisted through the [`Storage`] trait. The
//! query engine only ever calls it at the pipeline boundary.
//!
//! ## Backends
//! - [`MemoryStorage`]: relations held in process memory
//! - [`CsvStorage`]: one CSV file per relation, plus an optional `.hll`
//!   cardinality sketch

pub mod csv;
pub mod memory;

pub use csv::CsvStorage;
pub use memory::MemoryStorage;

use crate::config::DEFAULT_SKETCH_PRECISION;
use crate::error::StorageError;
use crate::sketch::{CardinalitySketch, HyperLogLog};
use crate::types::{Relation, Row};
use async_trait::async_trait;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Source and sink of named relations
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load every row of `name` in stored order
    async fn load_relation(&self, name: &str) -> StorageResult<Relation>;

    /// Cardinality sketch over the rows of `name`, for the approximate COUNT(*) path
    async fn load_cardinality_sketch(&self, name: &str) -> StorageResult<Box<dyn CardinalitySketch>>;

    /// Replace `name` with `rows`
    async fn persist_relation(&self, name: &str, rows: &[Row]) -> StorageResult<()>;

    /// HyperLogLog precision for sketches built over this backend's data
    fn sketch_precision(&self) -> u8 {
        DEFAULT_SKETCH_PRECISION
    }
}

/// Bytes identifying a row's content. Cardinality sketches count distinct
/// fingerprints, so duplicate rows count once.
pub fn row_fingerprint(row: &Row) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec(row)?)
}

/// Sketch over the fingerprints of `rows`
pub fn sketch_rows(rows: &[Row], precision: u8) -> StorageResult<HyperLogLog> {
    let mut sketch = HyperLogLog::new(precision);
    for row in rows {
        sketch.insert(&row_fingerprint(row)?);
    }
    Ok(sketch)
}
