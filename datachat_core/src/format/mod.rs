//! Shape-driven rendering of query results.
//!
//! A result is classified once into a [`ResultShape`]; rendering is a match
//! over that shape. Rules are checked in order and the first match wins:
//!
//! 1. one row, one column: a scalar
//! 2. one row, every value numeric: a row of counts
//! 3. one row, more than ten columns, every value a digit string: counts
//! 4. several rows, one column named like `*null_count*`: null counts by position
//! 5. several rows, one column: generic counts by position
//! 6. anything else: a table, truncated to ten rows
//!
//! Column aliases carry meaning here: `_nulls` marks a per-column null
//! count and `null_count` marks a column of null counts.

use crate::executor::ResultTable;
use crate::sql::types::Value;
use std::fmt;

/// Marks a numeric column alias as a null count for that column.
pub const NULL_MARKER: &str = "_nulls";
/// Marks a single-column result as a list of null counts.
pub const NULL_COUNT_MARKER: &str = "null_count";

pub const MAX_TABLE_ROWS: usize = 10;
const WIDE_ROW_MIN_COLUMNS: usize = 10;
const SUMMARY_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Empty,
    Scalar,
    CountsRow { null_counts: bool },
    /// Heuristic for one malformed query pattern: a single wide row of
    /// digit strings. Not a general rule.
    CountsRowWide,
    CountsColumn { null_counts: bool },
    Table,
}

impl ResultShape {
    pub fn classify(result: &ResultTable) -> Self {
        if result.is_empty() {
            return ResultShape::Empty;
        }

        let rows = result.row_count();
        let cols = result.column_count();

        if rows == 1 && cols == 1 {
            ResultShape::Scalar
        } else if rows == 1 && result.rows[0].iter().all(|v| v.is_numeric()) {
            ResultShape::CountsRow {
                null_counts: result.columns.iter().all(|c| has_marker(c, NULL_MARKER)),
            }
        } else if rows == 1
            && cols > WIDE_ROW_MIN_COLUMNS
            && result.rows[0].iter().all(|v| v.is_digit_string())
        {
            ResultShape::CountsRowWide
        } else if rows > 1 && cols == 1 {
            ResultShape::CountsColumn {
                null_counts: has_marker(&result.columns[0], NULL_COUNT_MARKER),
            }
        } else {
            ResultShape::Table
        }
    }
}

/// How a result is shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendering {
    Lines {
        heading: Option<String>,
        lines: Vec<String>,
    },
    Table {
        caption: String,
        table: ResultTable,
        total_rows: usize,
    },
}

impl Rendering {
    pub fn text(text: impl Into<String>) -> Self {
        Rendering::Lines {
            heading: None,
            lines: vec![text.into()],
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Rendering::Table { .. })
    }

    /// Short description stored with a favorite.
    pub fn summary(&self) -> String {
        match self {
            Rendering::Table { table, .. } => format!("Table with {} rows", table.row_count()),
            Rendering::Lines { .. } => {
                let text = self.to_string();
                if text.chars().count() > SUMMARY_MAX_CHARS {
                    let cut: String = text.chars().take(SUMMARY_MAX_CHARS).collect();
                    format!("{}...", cut)
                } else {
                    text
                }
            }
        }
    }
}

impl fmt::Display for Rendering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendering::Lines { heading: None, lines } => f.write_str(&lines.join("\n")),
            Rendering::Lines {
                heading: Some(heading),
                lines,
            } => {
                writeln!(f, "{}:", heading)?;
                for line in lines {
                    write!(f, "\n• {}", line)?;
                }
                Ok(())
            }
            Rendering::Table { caption, table, .. } => {
                write!(f, "{}\n{}", caption, table.render_text(MAX_TABLE_ROWS))
            }
        }
    }
}

pub fn format_result(result: &ResultTable) -> Rendering {
    match ResultShape::classify(result) {
        ResultShape::Empty => Rendering::text("No results found."),
        ResultShape::Scalar => {
            let column = &result.columns[0];
            let value = &result.rows[0][0];
            let line = if has_marker(column, NULL_MARKER) {
                format!("{}: {} null values", clean_column_name(column), value)
            } else {
                format!("Result: {}", value)
            };
            Rendering::text(line)
        }
        ResultShape::CountsRow { null_counts: true } => Rendering::Lines {
            heading: Some("Null Count Results".to_string()),
            lines: row_lines(result, |column, value| {
                format!("{}: {} null values", clean_column_name(column), value)
            }),
        },
        ResultShape::CountsRow { null_counts: false } => Rendering::Lines {
            heading: Some("Count Results".to_string()),
            lines: row_lines(result, |column, value| format!("{}: {}", column, value)),
        },
        ResultShape::CountsRowWide => Rendering::Lines {
            heading: Some("Results (interpreted as counts)".to_string()),
            lines: row_lines(result, |column, value| format!("{}: {}", column, value)),
        },
        ResultShape::CountsColumn { null_counts: true } => Rendering::Lines {
            heading: Some("Null Count Results".to_string()),
            lines: column_lines(result, |i, value| format!("Column {}: {} null values", i, value)),
        },
        ResultShape::CountsColumn { null_counts: false } => Rendering::Lines {
            heading: Some("Count Results".to_string()),
            lines: column_lines(result, |i, value| format!("Count {}: {}", i, value)),
        },
        ResultShape::Table => {
            let total_rows = result.row_count();
            let caption = if total_rows <= MAX_TABLE_ROWS {
                format!("Results ({} rows):", total_rows)
            } else {
                format!("Results ({} rows, showing first {}):", total_rows, MAX_TABLE_ROWS)
            };
            Rendering::Table {
                caption,
                table: result.head(MAX_TABLE_ROWS),
                total_rows,
            }
        }
    }
}

fn row_lines<F>(result: &ResultTable, line: F) -> Vec<String>
where
    F: Fn(&str, &Value) -> String,
{
    result
        .columns
        .iter()
        .zip(&result.rows[0])
        .map(|(column, value)| line(column, value))
        .collect()
}

fn column_lines<F>(result: &ResultTable, line: F) -> Vec<String>
where
    F: Fn(usize, &Value) -> String,
{
    result
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| line(i + 1, &row[0]))
        .collect()
}

fn has_marker(column: &str, marker: &str) -> bool {
    column.to_lowercase().contains(marker)
}

/// `transaction_value_nulls` -> `Transaction Value`.
pub fn clean_column_name(column: &str) -> String {
    let stripped = remove_case_insensitive(column, NULL_MARKER).replace('_', " ");
    title_case(stripped.trim())
}

fn remove_case_insensitive(text: &str, pattern: &str) -> String {
    let lower = text.to_lowercase();
    // Lowercasing can change byte lengths outside ASCII; only strip when
    // the offsets still line up.
    if lower.len() != text.len() {
        return text.replace(pattern, "");
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = 0;
    for (start, _) in lower.match_indices(pattern) {
        out.push_str(&text[rest..start]);
        rest = start + pattern.len();
    }
    out.push_str(&text[rest..]);
    out
}

/// Uppercase the first letter of each run of letters, lowercase the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_is_letter = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> ResultTable {
        ResultTable::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    fn lines(rendering: &Rendering) -> &[String] {
        match rendering {
            Rendering::Lines { lines, .. } => lines,
            Rendering::Table { .. } => panic!("expected lines, got a table"),
        }
    }

    #[test]
    fn test_empty_result() {
        let r = result(&["a"], vec![]);
        assert_eq!(ResultShape::classify(&r), ResultShape::Empty);
        assert_eq!(format_result(&r).to_string(), "No results found.");
    }

    #[test]
    fn test_scalar_is_never_a_table() {
        for value in [Value::Integer(5), Value::Text("x".into()), Value::Null, Value::Real(2.5)] {
            let r = result(&["total_rows"], vec![vec![value]]);
            assert_eq!(ResultShape::classify(&r), ResultShape::Scalar);
            assert!(!format_result(&r).is_table());
        }
        let r = result(&["total_rows"], vec![vec![Value::Integer(5)]]);
        assert_eq!(format_result(&r).to_string(), "Result: 5");
    }

    #[test]
    fn test_scalar_null_marker_is_relabeled() {
        let r = result(&["b_nulls"], vec![vec![Value::Integer(1)]]);
        assert_eq!(lines(&format_result(&r)), ["B: 1 null values"]);
    }

    #[test]
    fn test_counts_row_with_null_markers() {
        let r = result(
            &["transaction_value_nulls", "currency_nulls", "Country_Key_NULLS"],
            vec![vec![Value::Integer(3), Value::Integer(0), Value::Integer(7)]],
        );
        assert_eq!(
            ResultShape::classify(&r),
            ResultShape::CountsRow { null_counts: true }
        );
        let rendering = format_result(&r);
        assert_eq!(
            lines(&rendering),
            [
                "Transaction Value: 3 null values",
                "Currency: 0 null values",
                "Country Key: 7 null values"
            ]
        );
        for line in lines(&rendering) {
            assert!(line.ends_with(" null values"));
        }
    }

    #[test]
    fn test_counts_row_requires_every_marker() {
        let r = result(
            &["total", "currency_nulls"],
            vec![vec![Value::Integer(10), Value::Real(1.0)]],
        );
        assert_eq!(
            ResultShape::classify(&r),
            ResultShape::CountsRow { null_counts: false }
        );
        assert_eq!(lines(&format_result(&r)), ["total: 10", "currency_nulls: 1.0"]);
    }

    #[test]
    fn test_wide_row_of_digit_strings() {
        let columns: Vec<String> = (0..12).map(|i| format!("col{}", i)).collect();
        let mut row = vec![Value::Text("12".into()); 11];
        row.push(Value::Integer(4));
        let r = ResultTable::new(columns, vec![row]);
        assert_eq!(ResultShape::classify(&r), ResultShape::CountsRowWide);
        let rendering = format_result(&r);
        assert_eq!(lines(&rendering).len(), 12);
        assert_eq!(lines(&rendering)[11], "col11: 4");
    }

    #[test]
    fn test_narrow_row_of_digit_strings_is_a_table() {
        let r = result(
            &["a", "b"],
            vec![vec![Value::Text("1".into()), Value::Text("2".into())]],
        );
        assert_eq!(ResultShape::classify(&r), ResultShape::Table);
    }

    #[test]
    fn test_null_count_column_enumerates_positions() {
        let r = result(
            &["null_count"],
            vec![
                vec![Value::Integer(4)],
                vec![Value::Integer(0)],
                vec![Value::Integer(9)],
            ],
        );
        assert_eq!(
            ResultShape::classify(&r),
            ResultShape::CountsColumn { null_counts: true }
        );
        assert_eq!(
            lines(&format_result(&r)),
            [
                "Column 1: 4 null values",
                "Column 2: 0 null values",
                "Column 3: 9 null values"
            ]
        );
    }

    #[test]
    fn test_generic_count_column() {
        let r = result(
            &["n"],
            vec![vec![Value::Integer(1)], vec![Value::Text("two".into())]],
        );
        assert_eq!(lines(&format_result(&r)), ["Count 1: 1", "Count 2: two"]);
    }

    #[test]
    fn test_large_table_is_truncated() {
        let rows: Vec<Vec<Value>> = (0..25)
            .map(|i| vec![Value::Integer(i), Value::Text(format!("r{}", i))])
            .collect();
        let r = result(&["id", "label"], rows);
        match format_result(&r) {
            Rendering::Table {
                caption,
                table,
                total_rows,
            } => {
                assert_eq!(caption, "Results (25 rows, showing first 10):");
                assert_eq!(table.row_count(), 10);
                assert_eq!(total_rows, 25);
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn test_small_table_caption() {
        let r = result(
            &["id", "label"],
            vec![
                vec![Value::Integer(1), Value::Text("a".into())],
                vec![Value::Integer(2), Value::Text("b".into())],
            ],
        );
        let rendering = format_result(&r);
        assert!(rendering.to_string().starts_with("Results (2 rows):\n"));
        assert_eq!(rendering.summary(), "Table with 2 rows");
    }

    #[test]
    fn test_summary_truncates_long_text() {
        let rendering = Rendering::text("x".repeat(150));
        let summary = rendering.summary();
        assert_eq!(summary.chars().count(), 103);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_clean_column_name() {
        assert_eq!(clean_column_name("b_nulls"), "B");
        assert_eq!(clean_column_name("cash_flow_nulls"), "Cash Flow");
        assert_eq!(clean_column_name("TAX_Nulls"), "Tax");
        assert_eq!(clean_column_name("bus_type2_nulls"), "Bus Type2");
    }
}
