//! Row and value types shared by the compiler, executor and storage

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar cell value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// Numeric value (integers are stored as whole floats)
    Number(f64),

    /// Text string
    Text(String),

    /// Null value
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric reading used by SUM/AVG/MIN/MAX. Non-numeric values become NaN.
    pub fn to_f64_lossy(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Text(s) => parse_number(s).unwrap_or(f64::NAN),
            Value::Null => f64::NAN,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => fmt_number(*n, f),
            Value::Text(s) => f.write_str(s),
            Value::Null => f.write_str("null"),
        }
    }
}

fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{}", n)
    }
}

/// Parse a string that is entirely numeric (surrounding whitespace allowed).
///
/// Words such as `inf` or `NaN` are not numbers here, only digits, sign,
/// decimal point and exponent.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    let numeric_chars = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'));
    if !numeric_chars || !trimmed.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Hashable identity of a raw value, used for grouping and DISTINCT.
///
/// Numbers and text never collide, so `1` and `"1"` form separate groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Number(u64),
    Text(String),
    Null,
}

impl From<&Value> for ValueKey {
    fn from(value: &Value) -> Self {
        match value {
            // -0.0 and 0.0 are one key
            Value::Number(n) if *n == 0.0 => ValueKey::Number(0),
            Value::Number(n) => ValueKey::Number(n.to_bits()),
            Value::Text(s) => ValueKey::Text(s.clone()),
            Value::Null => ValueKey::Null,
        }
    }
}

/// A row maps field names (plain or `table.field`) to values, in insertion order
pub type Row = indexmap::IndexMap<String, Value>;

/// An ordered sequence of rows. Schemas are not enforced.
pub type Relation = Vec<Row>;

/// Look up a field reference in a row: the key as written first, then the
/// bare column of a `table.column` reference
pub fn lookup_field<'r>(row: &'r Row, field: &str) -> Option<&'r Value> {
    row.get(field).or_else(|| {
        field
            .split_once('.')
            .and_then(|(_, column)| row.get(column))
    })
}

/// Build a row from `(field, value)` pairs
pub fn row_from_pairs<K, V, I>(pairs: I) -> Row
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
