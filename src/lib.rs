//! flatquery
//!
//! SQL-like SELECT queries over flat tabular files.
//!
//! ## Features
//! - SELECT [DISTINCT] with WHERE, one INNER/LEFT/RIGHT equi-join,
//!   GROUP BY, ORDER BY and LIMIT
//! - COUNT / SUM / AVG / MIN / MAX aggregates
//! - Exact and HyperLogLog-approximate COUNT(DISTINCT ...)
//! - APPROXIMATE_COUNT(*) answered from a stored cardinality sketch
//!
//! ## Architecture
//! - Compiler: query text → [`QueryDescriptor`] (`sql::parser`)
//! - Executor: descriptor + [`Storage`] → result rows (`sql::executor`)
//! - Storage: in-memory and CSV backends (`storage`)
//!
//! ```ignore
//! let storage = CsvStorage::new(EngineConfig::with_data_dir("./data"))?;
//! let rows = execute_select_query(&storage, "SELECT name FROM student WHERE age > 20").await?;
//! ```

pub mod config;
pub mod error;
pub mod sketch;
pub mod sql;
pub mod storage;
pub mod types;

pub use config::EngineConfig;
pub use error::{QueryError, Result, StorageError};
pub use sketch::{CardinalitySketch, HyperLogLog};
pub use sql::{execute_select_query, parse_select_query, QueryDescriptor, QueryExecutor};
pub use storage::{CsvStorage, MemoryStorage, Storage};
pub use types::{Relation, Row, Value};
