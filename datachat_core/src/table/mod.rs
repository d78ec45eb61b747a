//! In-memory tables loaded from CSV.
//!
//! Parsing is flexible: short rows are padded with nulls, long rows are
//! truncated and rows the reader cannot decode are skipped with a warning.
//! Column types are inferred once after the whole file is read.

use crate::error::{DataChatError, Result};
use crate::sql::types::{Column, DataType, Value};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Field spellings treated as missing values, matching pandas' defaults.
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub const SAMPLE_DATASET_NAME: &str = "Sample Data (Accrual Accounts)";

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table from already-typed columns and rows.
    ///
    /// Rows are padded or truncated to the column count.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        tracing::info!(
            path = %path.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "loaded CSV"
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(DataChatError::EmptyCsv);
        }
        let headers = normalize_headers(headers);

        let width = headers.len();
        let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
        let mut skipped = 0usize;

        for (line, record) in reader.records().enumerate() {
            match record {
                Ok(record) => {
                    let mut row: Vec<Option<String>> = record
                        .iter()
                        .take(width)
                        .map(|field| {
                            if NA_VALUES.contains(&field) {
                                None
                            } else {
                                Some(field.to_string())
                            }
                        })
                        .collect();
                    row.resize(width, None);
                    raw_rows.push(row);
                }
                Err(e) => {
                    skipped += 1;
                    // +2: 1-based lines plus the header row
                    tracing::warn!("Skipping malformed CSV row {}: {}", line + 2, e);
                }
            }
        }

        if skipped > 0 {
            tracing::info!("{} malformed CSV rows skipped", skipped);
        }

        let columns: Vec<Column> = headers
            .into_iter()
            .enumerate()
            .map(|(idx, name)| Column {
                name,
                data_type: infer_type(raw_rows.iter().filter_map(|row| row[idx].as_deref())),
            })
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&columns)
                    .map(|(field, column)| convert_field(field, column.data_type))
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    pub fn null_count(&self, idx: usize) -> usize {
        self.column_values(idx).filter(|v| v.is_null()).count()
    }

    pub fn total_nulls(&self) -> usize {
        (0..self.column_count()).map(|idx| self.null_count(idx)).sum()
    }

    /// Distinct non-null values in a column.
    pub fn unique_count(&self, idx: usize) -> usize {
        self.column_values(idx)
            .filter(|v| !v.is_null())
            .map(value_key)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Non-null values of a numeric column as `f64`.
    pub fn numeric_values(&self, idx: usize) -> Vec<f64> {
        self.column_values(idx).filter_map(Value::as_f64).collect()
    }

    /// Number of rows identical to an earlier row. Nulls compare equal.
    pub fn duplicate_rows(&self) -> usize {
        let mut seen = HashSet::with_capacity(self.rows.len());
        self.rows
            .iter()
            .filter(|row| !seen.insert(row.iter().map(value_key).collect::<Vec<_>>()))
            .count()
    }

    /// Estimated memory held by the cells, in bytes.
    pub fn approx_memory_bytes(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .map(Value::approx_size)
            .sum()
    }

    /// Aligned text grid of the first `limit` rows.
    pub fn render_text(&self, limit: usize) -> String {
        render_grid(&self.column_names(), &self.rows, limit)
    }
}

/// A table plus the name it is shown under.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub table: Table,
}

impl Dataset {
    pub fn new(name: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    /// Load an uploaded CSV, named after its file name.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let table = Table::from_csv_path(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, table))
    }

    pub fn sample<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(SAMPLE_DATASET_NAME, Table::from_csv_path(path)?))
    }
}

/// Name blank headers `Unnamed: <idx>` and suffix repeats with `.1`, `.2`...
fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(headers.len());
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, header)| {
            let base = if header.is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                header
            };
            // SQLite identifiers are case-insensitive, so `id` and `ID` collide.
            let mut name = base.clone();
            let mut n = 1;
            while seen.contains(&name.to_lowercase()) {
                name = format!("{}.{}", base, n);
                n += 1;
            }
            seen.insert(name.to_lowercase());
            name
        })
        .collect()
}

/// Render headers and rows as a right-aligned grid with a leading row index.
pub fn render_grid(headers: &[String], rows: &[Vec<Value>], limit: usize) -> String {
    let shown = &rows[..rows.len().min(limit)];
    let index_width = shown.len().saturating_sub(1).to_string().len();

    let cells: Vec<Vec<String>> = shown
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            cells
                .iter()
                .filter_map(|row| row.get(idx))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    out.push_str(&" ".repeat(index_width));
    for (header, width) in headers.iter().zip(&widths) {
        out.push_str("  ");
        out.push_str(&pad_left(header, *width));
    }

    for (idx, row) in cells.iter().enumerate() {
        out.push('\n');
        out.push_str(&pad_left(&idx.to_string(), index_width));
        for (cell, width) in row.iter().zip(&widths) {
            out.push_str("  ");
            out.push_str(&pad_left(cell, *width));
        }
    }

    out
}

fn pad_left(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", " ".repeat(width.saturating_sub(len)), text)
}

/// Hashable identity of a value. Reals use their bit pattern.
fn value_key(value: &Value) -> (u8, String) {
    match value {
        Value::Integer(i) => (0, i.to_string()),
        Value::Real(r) => (1, r.to_bits().to_string()),
        Value::Text(s) => (2, s.clone()),
        Value::Null => (3, String::new()),
    }
}

fn infer_type<'a>(fields: impl Iterator<Item = &'a str>) -> DataType {
    let mut seen_any = false;
    let mut all_integer = true;
    let mut all_real = true;

    for field in fields {
        seen_any = true;
        if all_integer && field.parse::<i64>().is_err() {
            all_integer = false;
        }
        if all_real && field.parse::<f64>().is_err() {
            all_real = false;
        }
        if !all_integer && !all_real {
            return DataType::Text;
        }
    }

    if !seen_any {
        DataType::Text
    } else if all_integer {
        DataType::Integer
    } else if all_real {
        DataType::Real
    } else {
        DataType::Text
    }
}

fn convert_field(field: Option<String>, data_type: DataType) -> Value {
    let Some(field) = field else {
        return Value::Null;
    };
    match data_type {
        DataType::Integer => field.parse().map(Value::Integer).unwrap_or(Value::Text(field)),
        DataType::Real => field.parse().map(Value::Real).unwrap_or(Value::Text(field)),
        DataType::Text => Value::Text(field),
    }
}
