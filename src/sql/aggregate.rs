//! COUNT / SUM / AVG / MIN / MAX over whole relations and GROUP BY partitions

use super::ast::{AggregateExpr, AggregateFunc};
use crate::error::{QueryError, Result};
use crate::types::{lookup_field, Row, Value, ValueKey};
use indexmap::IndexMap;

/// Running state for one aggregate expression.
///
/// Numeric folds read values with [`Value::to_f64_lossy`], so a single
/// non-numeric input turns SUM/AVG/MIN/MAX into NaN. A qualified argument
/// such as `orders.amt` falls back to the bare `amt` column.
#[derive(Debug, Clone)]
struct Accumulator {
    func: AggregateFunc,
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn new(func: AggregateFunc) -> Self {
        Self {
            func,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn update(&mut self, row: &Row, arg: &str) {
        self.count += 1;
        if self.func == AggregateFunc::Count {
            return;
        }

        let x = lookup_field(row, arg).map(Value::to_f64_lossy).unwrap_or(f64::NAN);
        self.sum += x;
        self.min = if x.is_nan() || self.min.is_nan() { f64::NAN } else { self.min.min(x) };
        self.max = if x.is_nan() || self.max.is_nan() { f64::NAN } else { self.max.max(x) };
    }

    fn finish(&self) -> Value {
        let n = match self.func {
            AggregateFunc::Count => self.count as f64,
            AggregateFunc::Sum => self.sum,
            // 0 / 0 is NaN for an empty input
            AggregateFunc::Avg => self.sum / self.count as f64,
            AggregateFunc::Min => self.min,
            AggregateFunc::Max => self.max,
        };
        Value::Number(n)
    }
}

/// Aggregate fields of a select list, paired with their output key
fn aggregate_fields(fields: &[String]) -> Vec<(&str, AggregateExpr)> {
    fields
        .iter()
        .filter_map(|field| AggregateExpr::parse(field).map(|expr| (field.as_str(), expr)))
        .collect()
}

/// Evaluate every aggregate field over the whole relation.
///
/// Returns one row keyed by each aggregate's text as written; non-aggregate
/// fields in the list are not part of the result.
pub fn aggregate_all(fields: &[String], rows: &[Row]) -> Row {
    let aggregates = aggregate_fields(fields);
    let mut accumulators: Vec<Accumulator> = aggregates
        .iter()
        .map(|(_, expr)| Accumulator::new(expr.func))
        .collect();

    for row in rows {
        for (acc, (_, expr)) in accumulators.iter_mut().zip(&aggregates) {
            acc.update(row, &expr.arg);
        }
    }

    aggregates
        .iter()
        .zip(&accumulators)
        .map(|((field, _), acc)| (field.to_string(), acc.finish()))
        .collect()
}

struct Partition {
    group_values: Vec<Value>,
    accumulators: Vec<Accumulator>,
}

/// Partition `rows` by the raw values of `group_fields` and aggregate each
/// partition.
///
/// Groups are emitted in first-seen order. Each output row holds the group
/// fields followed by the requested aggregates.
pub fn group_by(fields: &[String], group_fields: &[String], rows: &[Row]) -> Result<Vec<Row>> {
    let aggregates = aggregate_fields(fields);
    let mut partitions: IndexMap<Vec<ValueKey>, Partition> = IndexMap::new();

    for row in rows {
        let group_values = group_fields
            .iter()
            .map(|field| {
                lookup_field(row, field)
                    .cloned()
                    .ok_or_else(|| QueryError::Field(field.clone()))
            })
            .collect::<Result<Vec<Value>>>()?;
        let key: Vec<ValueKey> = group_values.iter().map(ValueKey::from).collect();

        let partition = partitions.entry(key).or_insert_with(|| Partition {
            group_values,
            accumulators: aggregates
                .iter()
                .map(|(_, expr)| Accumulator::new(expr.func))
                .collect(),
        });
        for (acc, (_, expr)) in partition.accumulators.iter_mut().zip(&aggregates) {
            acc.update(row, &expr.arg);
        }
    }

    let results = partitions
        .into_values()
        .map(|partition| {
            let mut out = Row::with_capacity(group_fields.len() + aggregates.len());
            for (field, value) in group_fields.iter().zip(partition.group_values) {
                out.insert(field.clone(), value);
            }
            for ((field, _), acc) in aggregates.iter().zip(&partition.accumulators) {
                out.insert(field.to_string(), acc.finish());
            }
            out
        })
        .collect();

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::row_from_pairs;

    fn orders() -> Vec<Row> {
        vec![
            row_from_pairs([("id", "1"), ("cust", "a"), ("amt", "10")]),
            row_from_pairs([("id", "2"), ("cust", "a"), ("amt", "5")]),
            row_from_pairs([("id", "3"), ("cust", "b"), ("amt", "7")]),
        ]
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_aggregate_all() {
        let row = aggregate_all(
            &strings(&["COUNT(*)", "SUM(amt)", "AVG(amt)", "MIN(amt)", "MAX(amt)", "cust"]),
            &orders(),
        );

        assert_eq!(row["COUNT(*)"], Value::Number(3.0));
        assert_eq!(row["SUM(amt)"], Value::Number(22.0));
        assert_eq!(row["MIN(amt)"], Value::Number(5.0));
        assert_eq!(row["MAX(amt)"], Value::Number(10.0));
        assert!((row["AVG(amt)"].to_f64_lossy() - 22.0 / 3.0).abs() < 1e-9);
        assert!(!row.contains_key("cust"));
    }

    #[test]
    fn test_qualified_argument_reads_bare_column() {
        let row = aggregate_all(&strings(&["MAX(orders.amt)", "SUM(orders.amt)"]), &orders());
        assert_eq!(row["MAX(orders.amt)"], Value::Number(10.0));
        assert_eq!(row["SUM(orders.amt)"], Value::Number(22.0));

        let joined = vec![
            row_from_pairs([("e.g", "4"), ("g", "100")]),
            row_from_pairs([("e.g", "6"), ("g", "100")]),
        ];
        let row = aggregate_all(&strings(&["SUM(e.g)"]), &joined);
        assert_eq!(row["SUM(e.g)"], Value::Number(10.0));
    }

    #[test]
    fn test_aggregate_empty_relation() {
        let row = aggregate_all(&strings(&["COUNT(*)", "SUM(amt)", "AVG(amt)", "MIN(amt)", "MAX(amt)"]), &[]);

        assert_eq!(row["COUNT(*)"], Value::Number(0.0));
        assert_eq!(row["SUM(amt)"], Value::Number(0.0));
        assert!(row["AVG(amt)"].to_f64_lossy().is_nan());
        assert_eq!(row["MIN(amt)"], Value::Number(f64::INFINITY));
        assert_eq!(row["MAX(amt)"], Value::Number(f64::NEG_INFINITY));
    }

    #[test]
    fn test_non_numeric_propagates_nan() {
        let mut rows = orders();
        rows.push(row_from_pairs([("id", "4"), ("cust", "c"), ("amt", "n/a")]));
        let row = aggregate_all(&strings(&["SUM(amt)", "MIN(amt)", "COUNT(amt)"]), &rows);

        assert!(row["SUM(amt)"].to_f64_lossy().is_nan());
        assert!(row["MIN(amt)"].to_f64_lossy().is_nan());
        assert_eq!(row["COUNT(amt)"], Value::Number(4.0));
    }

    #[test]
    fn test_group_by_first_seen_order() {
        let rows = group_by(&strings(&["cust", "SUM(amt)", "COUNT(*)", "AVG(amt)"]), &strings(&["cust"]), &orders()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["cust"], Value::from("a"));
        assert_eq!(rows[0]["SUM(amt)"], Value::Number(15.0));
        assert_eq!(rows[0]["COUNT(*)"], Value::Number(2.0));
        assert_eq!(rows[0]["AVG(amt)"], Value::Number(7.5));
        assert_eq!(rows[1]["cust"], Value::from("b"));
        assert_eq!(rows[1]["SUM(amt)"], Value::Number(7.0));
    }

    #[test]
    fn test_group_by_min_max_per_group() {
        let rows = group_by(&strings(&["MIN(amt)", "MAX(amt)"]), &strings(&["cust"]), &orders()).unwrap();
        assert_eq!(rows[0]["MIN(amt)"], Value::Number(5.0));
        assert_eq!(rows[0]["MAX(amt)"], Value::Number(10.0));
        assert_eq!(rows[1]["MIN(amt)"], Value::Number(7.0));
    }

    #[test]
    fn test_group_by_partitions_are_complete() {
        let rows = group_by(&strings(&["COUNT(*)"]), &strings(&["cust", "amt"]), &orders()).unwrap();
        let total: f64 = rows.iter().map(|r| r["COUNT(*)"].to_f64_lossy()).sum();
        assert_eq!(rows.len(), 3);
        assert_eq!(total, 3.0);
    }

    #[test]
    fn test_group_by_missing_field() {
        let err = group_by(&strings(&["COUNT(*)"]), &strings(&["region"]), &orders()).unwrap_err();
        assert!(matches!(err, QueryError::Field(f) if f == "region"));
    }
}
