//! WHERE-clause evaluation: value coercion, comparisons and LIKE matching

use super::ast::{CompareOp, Condition};
use crate::error::{QueryError, Result};
use crate::types::{parse_number, Row, Value};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

/// Remove one pair of matching single or double quotes
pub fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Coercion rule shared by row values and literals:
/// null passes through, quotes are stripped, fully numeric text becomes a number.
pub fn coerce(value: &Value) -> Value {
    match value {
        Value::Text(s) => coerce_literal(s),
        other => other.clone(),
    }
}

pub fn coerce_literal(s: &str) -> Value {
    let unquoted = strip_quotes(s);
    match parse_number(unquoted) {
        Some(n) => Value::Number(n),
        None => Value::Text(unquoted.to_string()),
    }
}

/// Compile a LIKE pattern: `%` matches any run, `_` one character,
/// whole-value match, case-insensitive.
pub fn like_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    let mut buf = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c => regex.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    regex.push('$');

    RegexBuilder::new(&regex)
        .case_insensitive(true)
        .build()
        .map_err(|e| QueryError::Parse(format!("Invalid LIKE pattern '{}': {}", pattern, e)))
}

/// A condition with its literal coerced and LIKE pattern compiled once
#[derive(Debug)]
pub struct CompiledCondition {
    field: String,
    operator: CompareOp,
    literal: Value,
    pattern: Option<Regex>,
}

impl CompiledCondition {
    pub fn compile(condition: &Condition) -> Result<Self> {
        let pattern = match condition.operator {
            CompareOp::Like => Some(like_to_regex(&condition.value)?),
            _ => None,
        };
        Ok(Self {
            field: condition.field.clone(),
            operator: condition.operator,
            literal: coerce_literal(&condition.value),
            pattern,
        })
    }

    /// Evaluate against one row. The field must exist in the row.
    pub fn matches(&self, row: &Row) -> Result<bool> {
        let raw = row
            .get(&self.field)
            .ok_or_else(|| QueryError::Field(self.field.clone()))?;

        if let Some(pattern) = &self.pattern {
            return Ok(match raw {
                Value::Null => false,
                Value::Text(s) => pattern.is_match(s),
                number => pattern.is_match(&number.to_string()),
            });
        }

        let value = coerce(raw);
        let ordering = value.partial_cmp(&self.literal);
        Ok(match self.operator {
            CompareOp::Eq => value == self.literal,
            CompareOp::Ne => value != self.literal,
            CompareOp::Gt => ordering == Some(Ordering::Greater),
            CompareOp::Lt => ordering == Some(Ordering::Less),
            CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Like => false,
        })
    }
}

/// Conjunction of every WHERE condition
#[derive(Debug, Default)]
pub struct RowFilter {
    conditions: Vec<CompiledCondition>,
}

impl RowFilter {
    pub fn compile(conditions: &[Condition]) -> Result<Self> {
        let conditions = conditions
            .iter()
            .map(CompiledCondition::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { conditions })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, row: &Row) -> Result<bool> {
        for condition in &self.conditions {
            if !condition.matches(row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Keep rows passing every condition, in order. Stops at the first error.
    pub fn apply(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        if self.is_empty() {
            return Ok(rows);
        }
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if self.matches(&row)? {
                kept.push(row);
            }
        }
        Ok(kept)
    }
}
