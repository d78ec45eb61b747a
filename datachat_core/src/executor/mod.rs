use crate::error::{DataChatError, Result};
use crate::sql::parser::Parser;
use crate::sql::types::{Statement, Value};
use crate::table::{render_grid, Table};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection};
use sqlparser::parser::ParserError;
use std::time::Instant;

pub mod errors;
pub use errors::{QueryError, QueryErrorKind};

/// Name the loaded dataset is queried under.
pub const TABLE_NAME: &str = "df";

/// Rows and columns returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    /// Copy of the first `n` rows.
    pub fn head(&self, n: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub fn render_text(&self, limit: usize) -> String {
        render_grid(&self.columns, &self.rows, limit)
    }
}

/// Runs SQL against a table held in an in-memory SQLite database.
///
/// The table is copied in once, under [`TABLE_NAME`], and the connection is
/// switched to `query_only` so generated SQL cannot modify it.
pub struct Executor {
    conn: Connection,
    spaced_headers: Vec<String>,
}

impl Executor {
    pub fn new(table: &Table) -> Result<Self> {
        if table.column_count() == 0 {
            return Err(DataChatError::EmptyCsv);
        }

        let start = Instant::now();
        let conn = Connection::open_in_memory()?;

        let column_defs: Vec<String> = table
            .columns()
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.data_type.sql_name()))
            .collect();
        conn.execute_batch(&format!(
            "CREATE TABLE {} ({})",
            TABLE_NAME,
            column_defs.join(", ")
        ))?;

        let tx = conn.unchecked_transaction()?;
        {
            let placeholders = vec!["?"; table.column_count()].join(", ");
            let mut insert =
                tx.prepare(&format!("INSERT INTO {} VALUES ({})", TABLE_NAME, placeholders))?;
            for row in table.rows() {
                insert.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;

        conn.pragma_update(None, "query_only", true)?;

        let spaced_headers = table
            .columns()
            .iter()
            .filter(|c| c.name.contains(char::is_whitespace))
            .map(|c| c.name.clone())
            .collect();

        tracing::debug!(
            rows = table.row_count(),
            elapsed = ?start.elapsed(),
            "loaded table into SQL engine"
        );

        Ok(Self {
            conn,
            spaced_headers,
        })
    }

    pub fn execute(&self, sql: &str) -> std::result::Result<ResultTable, QueryError> {
        let start = Instant::now();
        tracing::debug!(sql = %sql, "executing query");

        match Parser::parse(sql) {
            Ok(Statement::Query { tables }) => {
                tracing::debug!(?tables, "query accepted by guard");
            }
            // The SQL engine is the authority on syntax; let it report,
            // unless the text plainly starts as a non-query statement.
            // Flag pragmas take effect while being prepared.
            Err(e) if e.downcast_ref::<ParserError>().is_some() => {
                if let Some(keyword) = leading_keyword(sql).filter(|k| is_write_keyword(k)) {
                    tracing::warn!(keyword = %keyword, "rejected unparsed statement");
                    return Err(QueryError::other(READ_ONLY_MESSAGE));
                }
                tracing::debug!("guard could not parse query: {}", e);
            }
            Err(e) => {
                tracing::warn!("rejected statement: {}", e);
                return Err(QueryError::other(e.to_string()));
            }
        }

        let result = self.run(sql)?;

        tracing::debug!(
            rows = result.row_count(),
            columns = result.column_count(),
            "query executed in {:?}",
            start.elapsed()
        );
        Ok(result)
    }

    fn run(&self, sql: &str) -> std::result::Result<ResultTable, QueryError> {
        let classify = |e: rusqlite::Error| {
            let err = QueryError::classify(e.to_string(), &self.spaced_headers);
            tracing::warn!(kind = ?err.kind, "query failed: {}", err.message);
            err
        };

        let mut stmt = self.conn.prepare(sql).map_err(classify)?;
        if !stmt.readonly() {
            tracing::warn!("rejected statement that writes to the database");
            return Err(QueryError::other(READ_ONLY_MESSAGE));
        }
        read_rows(&mut stmt).map_err(classify)
    }
}

fn read_rows(stmt: &mut rusqlite::Statement<'_>) -> rusqlite::Result<ResultTable> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(value_from_ref(row.get_ref(idx)?));
        }
        rows.push(values);
    }

    Ok(ResultTable::new(columns, rows))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Text(format!("<blob {} bytes>", bytes.len())),
    }
}

const READ_ONLY_MESSAGE: &str =
    "Unsupported statement type: only read-only SELECT queries are supported";

/// Statement keywords that never start a read-only query.
const WRITE_KEYWORDS: &[&str] = &[
    "ALTER", "ANALYZE", "ATTACH", "BEGIN", "COMMIT", "CREATE", "DELETE", "DETACH", "DROP", "END",
    "INSERT", "PRAGMA", "REINDEX", "RELEASE", "REPLACE", "ROLLBACK", "SAVEPOINT", "UPDATE",
    "VACUUM",
];

fn is_write_keyword(keyword: &str) -> bool {
    WRITE_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(keyword))
}

/// First word of `sql`, skipping whitespace and comments.
fn leading_keyword(sql: &str) -> Option<&str> {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map_or("", |(_, after)| after);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map_or("", |(_, after)| after);
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
