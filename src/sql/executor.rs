//! Query executor - runs a compiled SELECT against a storage backend
//!
//! Pipeline, in fixed order:
//! 1. APPROXIMATE_COUNT(*) fast path (sketch only, no rows loaded)
//! 2. Load main relation, then the joined relation
//! 3. Join
//! 4. WHERE filter
//! 5. Aggregate (no GROUP BY) or GROUP BY → ORDER BY → LIMIT
//! 6. ORDER BY → COUNT(DISTINCT) or projection → DISTINCT → LIMIT

use super::aggregate::{aggregate_all, group_by};
use super::ast::{AggregateExpr, AggregateFunc, QueryDescriptor};
use super::evaluator::RowFilter;
use super::join::perform_join;
use super::sort::order_rows;
use crate::error::{QueryError, Result};
use crate::sketch::{CardinalitySketch, HyperLogLog};
use crate::storage::Storage;
use crate::types::{Row, Value, ValueKey};
use std::collections::HashSet;
use tracing::debug;

/// Output key of the approximate COUNT(*) fast path
pub const APPROXIMATE_COUNT_KEY: &str = "APPROXIMATE_COUNT(*)";

/// Query executor
pub struct QueryExecutor<'s, S: Storage + ?Sized> {
    storage: &'s S,
    /// Precision of sketches built for approximate COUNT(DISTINCT)
    sketch_precision: u8,
}

impl<'s, S: Storage + ?Sized> QueryExecutor<'s, S> {
    /// Sketches for approximate COUNT(DISTINCT) use the storage's precision
    pub fn new(storage: &'s S) -> Self {
        Self {
            storage,
            sketch_precision: storage.sketch_precision(),
        }
    }

    /// Run one query to completion.
    ///
    /// The first failure stops the pipeline and is returned wrapped once in
    /// [`QueryError::Execution`].
    pub async fn run(&self, query: &QueryDescriptor) -> Result<Vec<Row>> {
        self.run_pipeline(query).await.map_err(QueryError::execution)
    }

    async fn run_pipeline(&self, query: &QueryDescriptor) -> Result<Vec<Row>> {
        if is_sketch_count(query) {
            let sketch = self.storage.load_cardinality_sketch(&query.table).await?;
            let estimate = sketch.estimate();
            debug!(table = %query.table, estimate, "approximate count from stored sketch");
            return Ok(vec![single(APPROXIMATE_COUNT_KEY, Value::Number(estimate as f64))]);
        }

        // Compile conditions before touching storage so malformed LIKE
        // patterns fail without I/O
        let filter = RowFilter::compile(&query.where_clauses)?;

        let mut rows = self.storage.load_relation(&query.table).await?;
        debug!(table = %query.table, rows = rows.len(), "loaded main relation");

        if let Some(join) = &query.join {
            let joined = self.storage.load_relation(&join.table).await?;
            rows = perform_join(join, &query.table, &query.fields, &rows, &joined);
        }

        let rows = filter.apply(rows)?;
        debug!(rows = rows.len(), conditions = query.where_clauses.len(), "filtered");

        if query.has_aggregate_without_group_by {
            return Ok(vec![aggregate_all(&query.fields, &rows)]);
        }

        if let Some(group_fields) = &query.group_by_fields {
            let mut groups = group_by(&query.fields, group_fields, &rows)?;
            debug!(groups = groups.len(), "grouped");
            if let Some(order_by) = &query.order_by_fields {
                order_rows(&mut groups, order_by);
            }
            apply_limit(&mut groups, query.limit);
            return Ok(groups);
        }

        let mut rows = rows;
        if let Some(order_by) = &query.order_by_fields {
            order_rows(&mut rows, order_by);
        }

        if query.is_count_distinct {
            return self.count_distinct(query, &rows);
        }

        let mut results = project(&query.fields, rows)?;
        if query.is_distinct {
            results = distinct_rows(&query.fields, results);
        }
        apply_limit(&mut results, query.limit);

        debug!(rows = results.len(), "query complete");
        Ok(results)
    }

    /// One row holding the number of distinct `distinct_fields` tuples,
    /// exact or estimated
    fn count_distinct(&self, query: &QueryDescriptor, rows: &[Row]) -> Result<Vec<Row>> {
        let output_field = query.fields.first().cloned().unwrap_or_default();

        if query.is_approximate_count {
            let mut sketch = HyperLogLog::new(self.sketch_precision);
            for row in rows {
                let values = field_values(row, &query.distinct_fields)?;
                let key = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("|");
                sketch.insert(key.as_bytes());
            }
            let estimate = sketch.estimate();
            debug!(rows = rows.len(), estimate, "approximate count distinct");
            return Ok(vec![single(
                &format!("APPROXIMATE_{}", output_field),
                Value::Number(estimate as f64),
            )]);
        }

        let mut seen: HashSet<Vec<ValueKey>> = HashSet::new();
        for row in rows {
            let values = field_values(row, &query.distinct_fields)?;
            seen.insert(values.into_iter().map(ValueKey::from).collect());
        }
        Ok(vec![single(&output_field, Value::from(seen.len()))])
    }
}

/// `APPROXIMATE_COUNT(*)` over a whole, unjoined, ungrouped table
fn is_sketch_count(query: &QueryDescriptor) -> bool {
    let counts_rows = match query.fields.as_slice() {
        [field] => AggregateExpr::parse(field)
            .map_or(false, |agg| agg.func == AggregateFunc::Count && agg.arg == "*"),
        _ => false,
    };
    query.is_approximate_count
        && !query.is_count_distinct
        && counts_rows
        && query.where_clauses.is_empty()
        && query.join.is_none()
        && query.group_by_fields.is_none()
}

fn single(field: &str, value: Value) -> Row {
    let mut row = Row::with_capacity(1);
    row.insert(field.to_string(), value);
    row
}

fn field_values<'r>(row: &'r Row, fields: &[String]) -> Result<Vec<&'r Value>> {
    fields
        .iter()
        .map(|field| row.get(field).ok_or_else(|| QueryError::Field(field.clone())))
        .collect()
}

/// Keep only the requested fields, in request order. `*` keeps the whole row.
fn project(fields: &[String], rows: Vec<Row>) -> Result<Vec<Row>> {
    if fields.len() == 1 && fields[0] == "*" {
        return Ok(rows);
    }

    rows.into_iter()
        .map(|row| {
            let mut out = Row::with_capacity(fields.len());
            for field in fields {
                if field == "*" {
                    for (key, value) in &row {
                        out.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                    continue;
                }
                let value = row
                    .get(field)
                    .ok_or_else(|| QueryError::Field(field.clone()))?;
                out.insert(field.clone(), value.clone());
            }
            Ok(out)
        })
        .collect()
}

/// Drop rows whose projected tuple was already seen; first occurrence wins
fn distinct_rows(fields: &[String], rows: Vec<Row>) -> Vec<Row> {
    let mut seen: HashSet<Vec<ValueKey>> = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| {
            let key: Vec<ValueKey> = if fields.iter().any(|f| f == "*") {
                row.values().map(ValueKey::from).collect()
            } else {
                fields
                    .iter()
                    .map(|f| row.get(f).map(ValueKey::from).unwrap_or(ValueKey::Null))
                    .collect()
            };
            seen.insert(key)
        })
        .collect()
}

fn apply_limit(rows: &mut Vec<Row>, limit: Option<usize>) {
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
}
