//! Query execution plan tool.
//!
//! This module implements the `explain` MCP tool. Plain `EXPLAIN` is allowed
//! for any statement since it does not run it. `EXPLAIN ANALYZE` executes
//! the statement, so it is restricted to SELECT.

use crate::db::{Database, DatabaseType};
use crate::error::{DbError, DbResult};
use crate::sql::{OperationKind, classify_operation, is_read_statement};
use crate::tools::format::{OutputFormat, render};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

static UPDATE_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)UPDATE\s+(\S+)\s+SET").expect("valid regex"));

static DELETE_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)DELETE\s+FROM\s+(\S+)").expect("valid regex"));

/// Input for the explain tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExplainInput {
    /// SQL statement to explain
    pub query: String,
    /// Run EXPLAIN ANALYZE to collect actual execution statistics. This executes the query, so only SELECT is allowed.
    #[serde(default)]
    pub analyze: bool,
}

/// Output from the explain tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExplainOutput {
    /// "Execution plan for: <query>"
    pub summary: String,
    /// Reminder that EXPLAIN ANALYZE ran the query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Plan rendered as a table
    pub formatted: String,
    /// Time taken to run EXPLAIN in milliseconds
    pub execution_time_ms: u64,
}

/// Handler for the explain tool.
pub struct ExplainToolHandler<D> {
    db: Arc<D>,
}

impl<D: Database> ExplainToolHandler<D> {
    pub fn new(db: Arc<D>) -> Self {
        Self { db }
    }

    pub async fn explain(&self, input: ExplainInput) -> DbResult<ExplainOutput> {
        let sql = input.query.trim();
        if sql.is_empty() {
            return Err(DbError::invalid_input("Query parameter is required"));
        }

        if input.analyze && !is_read_statement(sql) {
            return Err(DbError::invalid_input(analyze_rejection(sql)));
        }

        let explain_sql = format!("{} {}", explain_prefix(self.db.db_type(), input.analyze)?, sql);

        let start = Instant::now();
        let plan = self.db.run_query(&explain_sql).await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let (summary, note) = if input.analyze {
            (
                format!("Execution plan with actual statistics for: {}", sql),
                Some("Note: EXPLAIN ANALYZE actually executes the query to gather statistics.".to_string()),
            )
        } else {
            (format!("Execution plan for: {}", sql), None)
        };

        Ok(ExplainOutput {
            summary,
            note,
            formatted: render(&plan, OutputFormat::Table),
            execution_time_ms,
        })
    }
}

/// Generate the EXPLAIN prefix for the given database type.
///
/// - MySQL: `EXPLAIN` / `EXPLAIN ANALYZE`
/// - SQLite: `EXPLAIN QUERY PLAN` (no ANALYZE form)
fn explain_prefix(db_type: DatabaseType, analyze: bool) -> DbResult<&'static str> {
    match (db_type, analyze) {
        (DatabaseType::MySql, false) => Ok("EXPLAIN"),
        (DatabaseType::MySql, true) => Ok("EXPLAIN ANALYZE"),
        (DatabaseType::SQLite, false) => Ok("EXPLAIN QUERY PLAN"),
        (DatabaseType::SQLite, true) => Err(DbError::invalid_input(
            "EXPLAIN ANALYZE is not supported by SQLite. Use analyze=false.",
        )),
    }
}

fn analyze_rejection(sql: &str) -> String {
    let operation = classify_operation(sql);
    let suggestion = match operation {
        OperationKind::Update => UPDATE_TABLE.captures(sql).map(|c| {
            format!(
                "To analyze UPDATE performance, try: SELECT * FROM {} WHERE <your conditions>",
                &c[1]
            )
        }),
        OperationKind::Delete => DELETE_TABLE.captures(sql).map(|c| {
            format!(
                "To analyze DELETE performance, try: SELECT * FROM {} WHERE <your conditions>",
                &c[1]
            )
        }),
        OperationKind::Insert => Some(
            "To analyze INSERT performance, examine the table structure with the 'schema' tool or analyze a SELECT on the target table"
                .to_string(),
        ),
        _ => None,
    }
    .unwrap_or_else(|| {
        "EXPLAIN ANALYZE can only be used with SELECT queries as it executes the query".to_string()
    });

    format!(
        "EXPLAIN ANALYZE cannot be used with {} queries as it would execute the modification. \
         {}. Alternative: Use EXPLAIN (without ANALYZE) to see the execution plan without running the query.",
        operation, suggestion
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::{MockDatabase, single_row};
    use serde_json::json;

    fn explain(query: &str, analyze: bool) -> ExplainInput {
        ExplainInput {
            query: query.to_string(),
            analyze,
        }
    }

    #[tokio::test]
    async fn test_explain_select() {
        let db = Arc::new(
            MockDatabase::new().with_query(|_| Ok(vec![single_row("type", json!("ALL"))])),
        );
        let handler = ExplainToolHandler::new(Arc::clone(&db));
        let out = handler
            .explain(explain("SELECT * FROM users", false))
            .await
            .unwrap();
        assert_eq!(out.summary, "Execution plan for: SELECT * FROM users");
        assert!(out.note.is_none());
        assert!(out.formatted.contains("| ALL  |"));
        assert_eq!(db.calls(), vec!["query:EXPLAIN SELECT * FROM users"]);
    }

    #[tokio::test]
    async fn test_plain_explain_allows_writes() {
        let db = Arc::new(MockDatabase::new());
        let handler = ExplainToolHandler::new(Arc::clone(&db));
        handler
            .explain(explain("UPDATE users SET a = 1", false))
            .await
            .unwrap();
        assert_eq!(db.calls(), vec!["query:EXPLAIN UPDATE users SET a = 1"]);
    }

    #[tokio::test]
    async fn test_analyze_select() {
        let db = Arc::new(MockDatabase::new());
        let handler = ExplainToolHandler::new(Arc::clone(&db));
        let out = handler
            .explain(explain("SELECT 1", true))
            .await
            .unwrap();
        assert!(out.note.is_some());
        assert_eq!(db.calls(), vec!["query:EXPLAIN ANALYZE SELECT 1"]);
    }

    #[tokio::test]
    async fn test_analyze_rejects_writes_with_suggestion() {
        let db = Arc::new(MockDatabase::new());
        let handler = ExplainToolHandler::new(Arc::clone(&db));

        let err = handler
            .explain(explain("UPDATE users SET a = 1 WHERE id = 2", true))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot be used with UPDATE queries"));
        assert!(err.to_string().contains("SELECT * FROM users WHERE"));

        let err = handler
            .explain(explain("DELETE FROM orders WHERE id = 2", true))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SELECT * FROM orders WHERE"));

        let err = handler
            .explain(explain("INSERT INTO t VALUES (1)", true))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'schema' tool"));

        assert!(db.calls().is_empty());
    }

    #[test]
    fn test_explain_prefix() {
        assert_eq!(explain_prefix(DatabaseType::MySql, false).unwrap(), "EXPLAIN");
        assert_eq!(explain_prefix(DatabaseType::SQLite, false).unwrap(), "EXPLAIN QUERY PLAN");
        assert!(explain_prefix(DatabaseType::SQLite, true).is_err());
    }
}
