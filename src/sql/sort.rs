//! ORDER BY over raw row values

use super::ast::{OrderByField, SortOrder};
use crate::types::{Row, Value};
use std::cmp::Ordering;

/// Total order on raw values: Null < numbers < text.
/// Numbers compare numerically (NaN ties), text lexicographically.
pub fn compare_raw(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Number(_) => 1,
            Value::Text(_) => 2,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Sort rows by the ORDER BY list with lexicographic tie-breaking.
/// An absent field sorts as Null.
pub fn order_rows(rows: &mut [Row], order_by: &[OrderByField]) {
    if order_by.is_empty() {
        return;
    }

    rows.sort_by(|a, b| {
        for item in order_by {
            let left = a.get(&item.field).unwrap_or(&Value::Null);
            let right = b.get(&item.field).unwrap_or(&Value::Null);
            let cmp = compare_raw(left, right);
            if cmp != Ordering::Equal {
                return match item.order {
                    SortOrder::Asc => cmp,
                    SortOrder::Desc => cmp.reverse(),
                };
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::row_from_pairs;

    fn by(field: &str, order: SortOrder) -> OrderByField {
        OrderByField { field: field.to_string(), order }
    }

    #[test]
    fn test_compare_raw() {
        assert_eq!(compare_raw(&Value::Null, &Value::from(1)), Ordering::Less);
        assert_eq!(compare_raw(&Value::from(2), &Value::from("1")), Ordering::Less);
        assert_eq!(compare_raw(&Value::from(10), &Value::from(9)), Ordering::Greater);
        // text compares as text
        assert_eq!(compare_raw(&Value::from("10"), &Value::from("9")), Ordering::Less);
    }

    #[test]
    fn test_order_with_tie_break() {
        let mut rows = vec![
            row_from_pairs([("cust", Value::from("b")), ("amt", Value::from(7))]),
            row_from_pairs([("cust", Value::from("a")), ("amt", Value::from(5))]),
            row_from_pairs([("cust", Value::from("a")), ("amt", Value::from(10))]),
        ];
        order_rows(&mut rows, &[by("cust", SortOrder::Asc), by("amt", SortOrder::Desc)]);

        let amounts: Vec<String> = rows.iter().map(|r| r["amt"].to_string()).collect();
        assert_eq!(amounts, vec!["10", "5", "7"]);
    }

    #[test]
    fn test_absent_field_sorts_first() {
        let mut rows = vec![
            row_from_pairs([("name", "x")]),
            row_from_pairs([("other", "y")]),
        ];
        order_rows(&mut rows, &[by("name", SortOrder::Asc)]);
        assert!(rows[0].get("name").is_none());
    }
}
