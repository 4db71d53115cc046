//! INNER / LEFT / RIGHT equi-joins over loaded relations

pub mod hash_join;

pub use hash_join::HashJoinExecutor;

use super::ast::{AggregateExpr, JoinSpec, JoinType};
use crate::types::{Row, Value};
use tracing::debug;

/// Shapes one output row of a join from a main-side and joined-side row.
///
/// INNER rows carry only the requested fields. LEFT and RIGHT rows also
/// expose every main-row field as `main_table.field`
/// (`include_all_main_fields`). An aggregate such as `SUM(e.g)` is carried
/// as its argument column `e.g` so the aggregate stage can read it.
struct JoinRowBuilder<'a> {
    main_table: &'a str,
    joined_table: &'a str,
    fields: &'a [String],
}

impl<'a> JoinRowBuilder<'a> {
    fn build(&self, main_row: &Row, joined_row: Option<&Row>, include_all_main_fields: bool) -> Row {
        let mut result = Row::with_capacity(self.fields.len() + main_row.len());

        if include_all_main_fields {
            for (key, value) in main_row {
                result.insert(format!("{}.{}", self.main_table, key), value.clone());
            }
        }

        for field in self.fields {
            if field == "*" {
                self.expand_star(&mut result, main_row, joined_row);
                continue;
            }

            let column = match AggregateExpr::parse(field) {
                Some(agg) if agg.arg == "*" => continue,
                Some(agg) => agg.arg,
                None => field.clone(),
            };
            let value = self.resolve(&column, main_row, joined_row);
            result.insert(column, value);
        }

        result
    }

    /// Unqualified fields belong to the main table
    fn resolve(&self, field: &str, main_row: &Row, joined_row: Option<&Row>) -> Value {
        let (table, column) = field.split_once('.').unwrap_or((self.main_table, field));
        let value = if table == self.main_table {
            main_row.get(column)
        } else {
            joined_row.and_then(|row| row.get(column))
        };
        value.cloned().unwrap_or(Value::Null)
    }

    fn expand_star(&self, result: &mut Row, main_row: &Row, joined_row: Option<&Row>) {
        for (key, value) in main_row {
            result
                .entry(format!("{}.{}", self.main_table, key))
                .or_insert_with(|| value.clone());
        }
        if let Some(joined_row) = joined_row {
            for (key, value) in joined_row {
                result
                    .entry(format!("{}.{}", self.joined_table, key))
                    .or_insert_with(|| value.clone());
            }
        }
    }
}

/// Join `main` (rows of `main_table`) with `joined` (rows of `spec.table`)
pub fn perform_join(spec: &JoinSpec, main_table: &str, fields: &[String], main: &[Row], joined: &[Row]) -> Vec<Row> {
    let builder = JoinRowBuilder {
        main_table,
        joined_table: &spec.table,
        fields,
    };

    // RIGHT probes with joined rows, the others probe with main rows
    let mut index = HashJoinExecutor::new();
    match spec.join_type {
        JoinType::Right => index.build(main, &spec.left),
        JoinType::Inner | JoinType::Left => index.build(joined, &spec.right),
    }

    let rows = match spec.join_type {
        JoinType::Inner => inner_join(&builder, &index, spec, main, joined),
        JoinType::Left => left_join(&builder, &index, spec, main, joined),
        JoinType::Right => right_join(&builder, &index, spec, main, joined),
    };

    debug!(
        join_type = %spec.join_type,
        main_rows = main.len(),
        joined_rows = joined.len(),
        distinct_keys = index.hash_table_size(),
        output_rows = rows.len(),
        "joined relations"
    );
    rows
}

/// One row per matching (main, joined) pair
fn inner_join(
    builder: &JoinRowBuilder<'_>,
    index: &HashJoinExecutor,
    spec: &JoinSpec,
    main: &[Row],
    joined: &[Row],
) -> Vec<Row> {
    let mut results = Vec::with_capacity(main.len());
    for main_row in main {
        for &position in index.probe(main_row, &spec.left) {
            results.push(builder.build(main_row, Some(&joined[position]), false));
        }
    }
    results
}

/// Every main row at least once; unmatched main rows get null joined fields
fn left_join(
    builder: &JoinRowBuilder<'_>,
    index: &HashJoinExecutor,
    spec: &JoinSpec,
    main: &[Row],
    joined: &[Row],
) -> Vec<Row> {
    let mut results = Vec::with_capacity(main.len());
    for main_row in main {
        let matches = index.probe(main_row, &spec.left);
        if matches.is_empty() {
            results.push(builder.build(main_row, None, true));
        } else {
            for &position in matches {
                results.push(builder.build(main_row, Some(&joined[position]), true));
            }
        }
    }
    results
}

/// Every joined row exactly once, paired with its first matching main row.
///
/// Unmatched joined rows pair with an all-null main row shaped like the
/// first main row; when the main relation is empty that row has no fields.
fn right_join(
    builder: &JoinRowBuilder<'_>,
    index: &HashJoinExecutor,
    spec: &JoinSpec,
    main: &[Row],
    joined: &[Row],
) -> Vec<Row> {
    let null_main_row: Row = main
        .first()
        .map(|row| row.keys().map(|key| (key.clone(), Value::Null)).collect())
        .unwrap_or_default();

    joined
        .iter()
        .map(|joined_row| {
            let main_row = index
                .probe(joined_row, &spec.right)
                .first()
                .map(|&position| &main[position])
                .unwrap_or(&null_main_row);
            builder.build(main_row, Some(joined_row), true)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::row_from_pairs;

    fn students() -> Vec<Row> {
        vec![
            row_from_pairs([("id", "1"), ("name", "John")]),
            row_from_pairs([("id", "2"), ("name", "Jane")]),
            row_from_pairs([("id", "3"), ("name", "Bob")]),
        ]
    }

    fn enrollments() -> Vec<Row> {
        vec![
            row_from_pairs([("student_id", "1"), ("course", "Math")]),
            row_from_pairs([("student_id", "1"), ("course", "Physics")]),
            row_from_pairs([("student_id", "2"), ("course", "Chemistry")]),
            row_from_pairs([("student_id", "5"), ("course", "Biology")]),
        ]
    }

    fn spec(join_type: JoinType) -> JoinSpec {
        JoinSpec {
            join_type,
            table: "enrollment".to_string(),
            left: "student.id".to_string(),
            right: "enrollment.student_id".to_string(),
        }
    }

    fn fields() -> Vec<String> {
        vec!["student.name".to_string(), "enrollment.course".to_string()]
    }

    #[test]
    fn test_inner_join_pairs_only() {
        let rows = perform_join(&spec(JoinType::Inner), "student", &fields(), &students(), &enrollments());

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            row_from_pairs([("student.name", "John"), ("enrollment.course", "Math")])
        );
        assert_eq!(rows[2]["enrollment.course"], Value::from("Chemistry"));
        // INNER exposes only the requested fields
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn test_left_join_keeps_unmatched_main_rows() {
        let rows = perform_join(&spec(JoinType::Left), "student", &fields(), &students(), &enrollments());

        assert_eq!(rows.len(), 4);
        let bob = &rows[3];
        assert_eq!(bob["student.name"], Value::from("Bob"));
        assert_eq!(bob["enrollment.course"], Value::Null);
        // All main fields exposed under qualified keys
        assert_eq!(bob["student.id"], Value::from("3"));
    }

    #[test]
    fn test_right_join_keeps_unmatched_joined_rows() {
        let rows = perform_join(&spec(JoinType::Right), "student", &fields(), &students(), &enrollments());

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1]["student.name"], Value::from("John"));
        let biology = &rows[3];
        assert_eq!(biology["enrollment.course"], Value::from("Biology"));
        assert_eq!(biology["student.name"], Value::Null);
        assert_eq!(biology["student.id"], Value::Null);
    }

    #[test]
    fn test_right_join_with_empty_main_relation() {
        let rows = perform_join(&spec(JoinType::Right), "student", &fields(), &[], &enrollments());

        assert_eq!(rows.len(), 4);
        // The null main row has no shape to copy, only requested fields appear
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0]["student.name"], Value::Null);
    }

    #[test]
    fn test_unqualified_field_defaults_to_main_table() {
        let fields = vec!["name".to_string(), "enrollment.course".to_string()];
        let rows = perform_join(&spec(JoinType::Inner), "student", &fields, &students(), &enrollments());
        assert_eq!(rows[0]["name"], Value::from("John"));
    }

    #[test]
    fn test_aggregate_arguments_are_carried() {
        let fields = vec!["COUNT(*)".to_string(), "MAX(enrollment.course)".to_string(), "SUM(id)".to_string()];
        let rows = perform_join(&spec(JoinType::Inner), "student", &fields, &students(), &enrollments());

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            row_from_pairs([("enrollment.course", "Math"), ("id", "1")])
        );
    }

    #[test]
    fn test_star_expands_both_sides() {
        let fields = vec!["*".to_string()];
        let rows = perform_join(&spec(JoinType::Inner), "student", &fields, &students(), &enrollments());
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["student.id", "student.name", "enrollment.student_id", "enrollment.course"]);
    }
}
