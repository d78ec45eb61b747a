use crate::executor::TABLE_NAME;
use crate::table::Table;
use std::fmt::Write;

const SAMPLE_ROWS: usize = 3;

/// Describe a table for the SQL-generation prompt.
pub fn schema_info(table: &Table) -> String {
    let mut info = String::from("Database Schema:\n");
    let _ = writeln!(info, "Table name: '{}'", TABLE_NAME);
    let _ = writeln!(info, "Number of rows: {}", table.row_count());
    let _ = writeln!(info, "Number of columns: {}", table.column_count());
    info.push_str("\nColumns:\n");

    for (idx, column) in table.columns().iter().enumerate() {
        let _ = writeln!(
            info,
            "- {}: {}, {} null values, {} unique values",
            column.name,
            column.data_type,
            table.null_count(idx),
            table.unique_count(idx)
        );
    }

    let _ = writeln!(
        info,
        "\nSample data (first {} rows):\n{}",
        SAMPLE_ROWS,
        table.render_text(SAMPLE_ROWS)
    );

    info
}

/// One line per column with its type and null count, for the help screen.
pub fn column_help(table: &Table) -> Vec<String> {
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            format!(
                "{} ({}) - {} null values",
                column.name,
                column.data_type,
                table.null_count(idx)
            )
        })
        .collect()
}
