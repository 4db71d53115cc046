//! Cardinality sketches for approximate COUNT / COUNT(DISTINCT)

pub mod hyperloglog;

pub use hyperloglog::HyperLogLog;

/// Probabilistic distinct-element counter
pub trait CardinalitySketch: Send + Sync {
    /// Add one element
    fn insert(&mut self, item: &[u8]);

    /// Estimated number of distinct elements inserted so far
    fn estimate(&self) -> u64;
}
