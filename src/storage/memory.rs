//! In-memory relation store

use super::{sketch_rows, Storage, StorageResult};
use crate::config::DEFAULT_SKETCH_PRECISION;
use crate::error::StorageError;
use crate::sketch::CardinalitySketch;
use crate::types::{Relation, Row};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Relations kept in a map behind a read-write lock.
///
/// Loads hand out copies, so a running query never observes a later persist.
pub struct MemoryStorage {
    relations: RwLock<HashMap<String, Relation>>,
    sketch_precision: u8,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_sketch_precision(DEFAULT_SKETCH_PRECISION)
    }

    pub fn with_sketch_precision(sketch_precision: u8) -> Self {
        Self {
            relations: RwLock::new(HashMap::new()),
            sketch_precision,
        }
    }

    /// Register (or replace) a relation
    pub fn insert_relation(&self, name: impl Into<String>, rows: Relation) {
        self.relations.write().insert(name.into(), rows);
    }

}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load_relation(&self, name: &str) -> StorageResult<Relation> {
        self.relations
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn load_cardinality_sketch(&self, name: &str) -> StorageResult<Box<dyn CardinalitySketch>> {
        let relations = self.relations.read();
        let rows = relations
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        let sketch = sketch_rows(rows, self.sketch_precision)?;
        debug!(relation = name, rows = rows.len(), "built in-memory sketch");
        Ok(Box::new(sketch))
    }

    async fn persist_relation(&self, name: &str, rows: &[Row]) -> StorageResult<()> {
        self.insert_relation(name, rows.to_vec());
        Ok(())
    }

    fn sketch_precision(&self) -> u8 {
        self.sketch_precision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{row_from_pairs, Value};

    #[tokio::test]
    async fn test_load_and_persist() {
        let storage = MemoryStorage::new();
        storage
            .persist_relation("t", &[row_from_pairs([("id", "1")])])
            .await
            .unwrap();

        let rows = storage.load_relation("t").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], Value::from("1"));
    }

    #[tokio::test]
    async fn test_missing_relation() {
        let storage = MemoryStorage::new();
        let err = storage.load_relation("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(name) if name == "nope"));
        assert!(storage.load_cardinality_sketch("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_sketch_estimates_row_count() {
        let storage = MemoryStorage::new();
        let rows: Relation = (0..1000).map(|i| row_from_pairs([("id", i)])).collect();
        storage.insert_relation("big", rows);

        let estimate = storage.load_cardinality_sketch("big").await.unwrap().estimate() as f64;
        // 4 standard errors at precision 12
        assert!((estimate - 1000.0).abs() / 1000.0 < 0.07, "estimate {}", estimate);
    }
}
