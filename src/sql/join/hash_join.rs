//! Hash equi-join index
//!
//! Algorithm:
//! 1. Build phase: hash one relation's join key to its row positions
//! 2. Probe phase: look up each row of the other relation in order
//!
//! Row positions are kept in relation order, so probing in order yields
//! the same output order as a nested loop.
//!
//! Time complexity: O(n + m)

use std::collections::HashMap;

use crate::types::{lookup_field, Row, Value, ValueKey};

/// Keys match on raw values: `"01"` and `"1"` differ, as do `1` and `"1"`.
/// Null and NaN never match.
fn join_key(value: &Value) -> Option<ValueKey> {
    match value {
        Value::Null => None,
        Value::Number(n) if n.is_nan() => None,
        other => Some(ValueKey::from(other)),
    }
}

/// Hash join executor
pub struct HashJoinExecutor {
    /// Hash table: join key -> positions in the build relation
    hash_table: HashMap<ValueKey, Vec<usize>>,
}

impl HashJoinExecutor {
    pub fn new() -> Self {
        Self {
            hash_table: HashMap::new(),
        }
    }

    /// Build phase
    ///
    /// # Arguments
    /// * `rows` - Rows of the build-side relation
    /// * `key_field` - Join field (qualified or bare)
    pub fn build(&mut self, rows: &[Row], key_field: &str) {
        for (position, row) in rows.iter().enumerate() {
            if let Some(key) = lookup_field(row, key_field).and_then(join_key) {
                self.hash_table.entry(key).or_default().push(position);
            }
        }
    }

    /// Probe phase: build-side positions matching `row`, in build order
    pub fn probe(&self, row: &Row, key_field: &str) -> &[usize] {
        lookup_field(row, key_field)
            .and_then(join_key)
            .and_then(|key| self.hash_table.get(&key))
            .map(|positions| positions.as_slice())
            .unwrap_or(&[])
    }

    /// Number of distinct keys on the build side (for statistics)
    pub fn hash_table_size(&self) -> usize {
        self.hash_table.len()
    }
}

impl Default for HashJoinExecutor {
    fn default() -> Self {
        Self::new()
    }
}
