//! Structured form of a compiled SELECT query

use std::fmt;

/// Everything the executor needs to run one SELECT.
///
/// Built once by the compiler, consumed once by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    /// Output field expressions in SELECT order (`*`, `name`, `t.name`, `SUM(x)`)
    pub fields: Vec<String>,
    pub table: String,
    /// Flat list, evaluated as a conjunction
    pub where_clauses: Vec<Condition>,
    pub join: Option<JoinSpec>,
    pub group_by_fields: Option<Vec<String>>,
    pub order_by_fields: Option<Vec<OrderByField>>,
    pub limit: Option<usize>,
    pub is_distinct: bool,                   // SELECT DISTINCT
    pub is_approximate_count: bool,          // APPROXIMATE_COUNT(...)
    pub is_count_distinct: bool,             // COUNT(DISTINCT ...)
    pub distinct_fields: Vec<String>,
    pub has_aggregate_without_group_by: bool,
}

/// Boolean connective written before a condition.
///
/// Recorded for diagnostics only: AND and OR both act as AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Like,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Like => "LIKE",
        };
        f.write_str(op)
    }
}

/// `field op value`. Comparison literals keep their quotes until evaluation;
/// LIKE patterns are stored unquoted.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: CompareOp,
    pub value: String,
    pub connective: Option<Connective>,
}

/// JOIN types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => f.write_str("INNER"),
            JoinType::Left => f.write_str("LEFT"),
            JoinType::Right => f.write_str("RIGHT"),
        }
    }
}

/// `<type> JOIN table ON left = right`; `left`/`right` are qualified fields
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub join_type: JoinType,
    pub table: String,
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByField {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunc::Count),
            "SUM" => Some(AggregateFunc::Sum),
            "AVG" => Some(AggregateFunc::Avg),
            "MIN" => Some(AggregateFunc::Min),
            "MAX" => Some(AggregateFunc::Max),
            _ => None,
        }
    }
}

/// `FUNC(arg)` where arg is `*` or a (possibly qualified) field name.
///
/// The output column is keyed by the field text exactly as written.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub func: AggregateFunc,
    pub arg: String,
}

impl AggregateExpr {
    /// Recognize `FUNC(*)` / `FUNC(field)`. Anything else (including
    /// `COUNT(DISTINCT ...)`) is not a plain aggregate.
    pub fn parse(field: &str) -> Option<Self> {
        let open = field.find('(')?;
        let inner = field[open + 1..].trim_end().strip_suffix(')')?;
        let func = AggregateFunc::from_name(field[..open].trim())?;
        let arg = inner.trim();

        let is_field_name = !arg.is_empty()
            && arg.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.');
        if arg == "*" || is_field_name {
            Some(AggregateExpr { func, arg: arg.to_string() })
        } else {
            None
        }
    }
}
