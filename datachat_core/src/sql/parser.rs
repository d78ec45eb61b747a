use super::types::Statement;
use anyhow::{anyhow, Result};
use sqlparser::ast::{self, SetExpr, Statement as SqlStatement, TableFactor};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser as SqlParser;

/// Read-only guard in front of the SQL engine.
///
/// Accepts a single query (`SELECT`, `WITH`, set operations) and rejects
/// anything that would modify the table.
pub struct Parser;

impl Parser {
    pub fn parse(sql: &str) -> Result<Statement> {
        let dialect = SQLiteDialect {};
        let statements = SqlParser::parse_sql(&dialect, sql)?;

        if statements.is_empty() {
            return Err(anyhow!("No statements found"));
        }
        if statements.len() > 1 {
            return Err(anyhow!("Only one statement can run at a time"));
        }

        Self::convert_statement(&statements[0])
    }

    fn convert_statement(stmt: &SqlStatement) -> Result<Statement> {
        match stmt {
            SqlStatement::Query(query) => {
                let mut tables = Vec::new();
                Self::collect_query_tables(query, &mut tables)?;
                Ok(Statement::Query { tables })
            }
            _ => Err(read_only_error()),
        }
    }

    fn collect_query_tables(query: &ast::Query, tables: &mut Vec<String>) -> Result<()> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                Self::collect_query_tables(&cte.query, tables)?;
            }
        }
        Self::collect_set_expr_tables(&query.body, tables)
    }

    fn collect_set_expr_tables(body: &SetExpr, tables: &mut Vec<String>) -> Result<()> {
        match body {
            SetExpr::Select(select) => {
                for table in &select.from {
                    Self::collect_factor_tables(&table.relation, tables)?;
                    for join in &table.joins {
                        Self::collect_factor_tables(&join.relation, tables)?;
                    }
                }
                Ok(())
            }
            SetExpr::SetOperation { left, right, .. } => {
                Self::collect_set_expr_tables(left, tables)?;
                Self::collect_set_expr_tables(right, tables)
            }
            SetExpr::Query(query) => Self::collect_query_tables(query, tables),
            // `WITH ... INSERT/UPDATE` parses as a query wrapping a write.
            SetExpr::Insert(_) | SetExpr::Update(_) => Err(read_only_error()),
            _ => Ok(()),
        }
    }

    fn collect_factor_tables(factor: &TableFactor, tables: &mut Vec<String>) -> Result<()> {
        match factor {
            TableFactor::Table { name, .. } => {
                if let Some(ident) = name.0.last() {
                    if !tables.contains(&ident.value) {
                        tables.push(ident.value.clone());
                    }
                }
            }
            TableFactor::Derived { subquery, .. } => Self::collect_query_tables(subquery, tables)?,
            _ => {}
        }
        Ok(())
    }
}

fn read_only_error() -> anyhow::Error {
    anyhow!("Unsupported statement type: only read-only SELECT queries are supported")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select() {
        let stmt = Parser::parse("SELECT id, name FROM df").unwrap();
        assert_eq!(
            stmt,
            Statement::Query {
                tables: vec!["df".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_bracket_quoted_columns() {
        let sql = "SELECT COUNT(*) AS null_count FROM df WHERE [Transaction Value] IS NULL";
        assert!(Parser::parse(sql).is_ok());
    }

    #[test]
    fn test_parse_union_and_subquery_tables() {
        let sql = "SELECT COUNT(*) FROM df UNION ALL SELECT COUNT(*) FROM (SELECT * FROM other)";
        match Parser::parse(sql).unwrap() {
            Statement::Query { tables } => {
                assert_eq!(tables, vec!["df".to_string(), "other".to_string()]);
            }
        }
    }

    #[test]
    fn test_rejects_writes() {
        assert!(Parser::parse("DELETE FROM df").is_err());
        assert!(Parser::parse("INSERT INTO df (a) VALUES (1)").is_err());
        assert!(Parser::parse("DROP TABLE df").is_err());
    }

    #[test]
    fn test_rejects_writes_behind_cte() {
        let err = Parser::parse("WITH c AS (SELECT 1) INSERT INTO df (a) VALUES (9)").unwrap_err();
        assert!(err.downcast_ref::<sqlparser::parser::ParserError>().is_none());
        assert!(Parser::parse("WITH c AS (SELECT 1) UPDATE df SET a = 9").is_err());
    }

    #[test]
    fn test_rejects_multiple_statements() {
        assert!(Parser::parse("SELECT 1; SELECT 2").is_err());
    }
}
