//! Query execution tool.
//!
//! This module implements the `query` MCP tool for executing SELECT queries.
//! Results are served from the session's result cache when possible.
//! Anything that is not a SELECT is rejected with a pointer to `execute`.

use crate::db::Database;
use crate::error::{DbError, DbResult};
use crate::session::cache::ResultCache;
use crate::sql::{classify_operation, is_read_statement};
use crate::tools::format::{OutputFormat, render};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Input for the query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// SQL SELECT statement to execute. Write operations must use the execute tool.
    pub query: String,
    /// Output format: "table" (default), "json", "csv" or "markdown". Unknown values fall back to json.
    #[serde(default)]
    pub format: Option<String>,
}

/// Output from the query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueryOutput {
    /// One-line summary: elapsed time, cache status and row count
    pub summary: String,
    /// Rendered result rows
    pub formatted: String,
    /// Format used for `formatted`
    pub format: String,
    /// Number of rows returned
    pub row_count: usize,
    /// Query execution time in milliseconds
    pub execution_time_ms: u64,
    /// True if the rows came from the result cache
    pub cached: bool,
}

/// Handler for query execution.
pub struct QueryToolHandler<D> {
    db: Arc<D>,
    cache: Arc<ResultCache>,
}

impl<D: Database> QueryToolHandler<D> {
    pub fn new(db: Arc<D>, cache: Arc<ResultCache>) -> Self {
        Self { db, cache }
    }

    pub async fn query(&self, input: QueryInput) -> DbResult<QueryOutput> {
        let sql = input.query.as_str();
        if sql.trim().is_empty() {
            return Err(DbError::invalid_input("Query parameter is required"));
        }

        if !is_read_statement(sql) {
            return Err(DbError::wrong_tool(
                format!(
                    "This tool only supports SELECT queries. For {} operations, please use the 'execute' tool instead. \
                     Use the 'execute' tool with dry_run=true first to preview changes before executing data modification queries.",
                    classify_operation(sql)
                ),
                "execute",
            ));
        }

        let format = OutputFormat::from_name(input.format.as_deref());
        let start = Instant::now();

        let (rows, cached) = match self.cache.get(sql).await {
            Some(rows) => {
                debug!(sql = %sql, "Cache hit");
                (rows, true)
            }
            None => {
                let rows = Arc::new(self.db.run_query(sql).await?);
                self.cache.put(sql, Arc::clone(&rows)).await;
                (rows, false)
            }
        };

        let execution_time_ms = start.elapsed().as_millis() as u64;
        let row_count = rows.len();

        info!(
            row_count,
            execution_time_ms,
            cached,
            "Query executed"
        );

        let summary = if cached {
            format!(
                "Query executed in {}ms (cached). {} rows returned.",
                execution_time_ms, row_count
            )
        } else {
            format!(
                "Query executed in {}ms. {} rows returned.",
                execution_time_ms, row_count
            )
        };

        Ok(QueryOutput {
            summary,
            formatted: render(&rows, format),
            format: format.as_str().to_string(),
            row_count,
            execution_time_ms,
            cached,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::{MockDatabase, single_row};
    use crate::session::cache::DEFAULT_CACHE_TTL;
    use serde_json::json;

    fn handler(db: MockDatabase, capacity: usize) -> (QueryToolHandler<MockDatabase>, Arc<MockDatabase>) {
        let db = Arc::new(db);
        let cache = Arc::new(ResultCache::new(DEFAULT_CACHE_TTL, capacity));
        (QueryToolHandler::new(Arc::clone(&db), cache), db)
    }

    fn input(sql: &str, format: Option<&str>) -> QueryInput {
        QueryInput {
            query: sql.to_string(),
            format: format.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_second_query_is_cached() {
        let (h, db) = handler(
            MockDatabase::new().with_query(|_| Ok(vec![single_row("id", json!(1))])),
            10,
        );

        let first = h.query(input("SELECT id FROM users", None)).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.row_count, 1);
        assert_eq!(first.format, "table");
        assert!(first.summary.ends_with("1 rows returned."));

        let second = h.query(input("SELECT id FROM users", Some("json"))).await.unwrap();
        assert!(second.cached);
        assert!(second.summary.contains("(cached)"));
        assert_eq!(second.format, "json");
        assert_eq!(db.calls_starting_with("query:").len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_queries() {
        let (h, db) = handler(MockDatabase::new(), 0);
        h.query(input("SELECT 1", None)).await.unwrap();
        h.query(input("SELECT 1", None)).await.unwrap();
        assert_eq!(db.calls_starting_with("query:").len(), 2);
    }

    #[tokio::test]
    async fn test_non_select_names_execute_tool() {
        let (h, db) = handler(MockDatabase::new(), 10);
        let err = h
            .query(input("DELETE FROM users", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::WrongTool { tool: "execute", .. }));
        assert!(err.to_string().contains("For DELETE operations"));
        assert!(db.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query() {
        let (h, _) = handler(MockDatabase::new(), 10);
        let err = h.query(input("", None)).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: Query parameter is required");
    }

    #[tokio::test]
    async fn test_empty_result() {
        let (h, _) = handler(MockDatabase::new(), 10);
        let out = h
            .query(input("SELECT * FROM t WHERE 1 = 0", Some("csv")))
            .await
            .unwrap();
        assert_eq!(out.row_count, 0);
        assert_eq!(out.formatted, "No results");
    }

    #[tokio::test]
    async fn test_database_error_is_not_cached() {
        let (h, db) = handler(
            MockDatabase::new().with_query(|_| Err(DbError::database("Unknown column", None, "check"))),
            10,
        );
        assert!(h.query(input("SELECT nope FROM t", None)).await.is_err());
        assert!(h.query(input("SELECT nope FROM t", None)).await.is_err());
        assert_eq!(db.calls_starting_with("query:").len(), 2);
    }
}
