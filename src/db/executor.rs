//! Statement execution.
//!
//! Every call is wrapped in `tokio::time::timeout` with the client's query
//! timeout. Statements are sent as raw SQL (text protocol) since callers
//! supply complete statements and some of them (DDL, `SHOW`) cannot be
//! prepared.
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific query and write operations
//! - `sqlite`: SQLite-specific query and write operations
//!
//! Each submodule provides identical functionality adapted to the database's
//! catalog and quoting rules.

use crate::db::Row;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::timeout;

// =============================================================================
// Common Helper Functions
// =============================================================================

fn collect_rows<R: RowToJson>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<Row>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(DbError::from)?.to_json_map());
    }
    Ok(rows)
}

fn timeout_error(operation: &str, limit: Duration) -> DbError {
    DbError::timeout(operation, limit)
}

/// First column of every row as text. Used for catalog listings whose
/// column name depends on the database (`Tables_in_<db>`).
fn first_column_strings(rows: Vec<Row>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| {
            row.into_iter().next().map(|(_, value)| match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
        })
        .collect()
}

/// Quote a possibly schema-qualified MySQL identifier with backticks.
pub fn quote_mysql_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| {
            let part = part.trim_matches('`');
            format!("`{}`", part.replace('`', "``"))
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Quote a SQLite identifier as a string literal for `pragma_*` functions.
fn quote_sqlite_literal(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

pub(crate) mod mysql {
    use super::*;
    use sqlx::{Executor, MySqlPool};

    pub async fn fetch_rows(
        pool: &MySqlPool,
        sql: &str,
        query_timeout: Duration,
    ) -> DbResult<Vec<Row>> {
        let rows_future = pool.fetch(sql).collect::<Vec<_>>();
        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("Query execution", query_timeout)),
        }
    }

    pub async fn execute_write(
        pool: &MySqlPool,
        sql: &str,
        query_timeout: Duration,
    ) -> DbResult<u64> {
        match timeout(query_timeout, pool.execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("Write operation", query_timeout)),
        }
    }

    /// Run `sql` in a transaction and roll it back whatever the outcome.
    ///
    /// If the future is dropped (timeout) the transaction guard rolls back
    /// when the connection returns to the pool.
    pub async fn execute_rolled_back(
        pool: &MySqlPool,
        sql: &str,
        query_timeout: Duration,
    ) -> DbResult<u64> {
        let probe = async {
            let mut tx = pool.begin().await?;
            let result = (&mut *tx).execute(sql).await;
            tx.rollback().await?;
            result.map(|r| r.rows_affected())
        };
        match timeout(query_timeout, probe).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("Rollback probe", query_timeout)),
        }
    }

    pub async fn list_tables(pool: &MySqlPool, query_timeout: Duration) -> DbResult<Vec<String>> {
        let rows = fetch_rows(pool, "SHOW TABLES", query_timeout).await?;
        Ok(first_column_strings(rows))
    }

    pub async fn describe_table(
        pool: &MySqlPool,
        table: &str,
        query_timeout: Duration,
    ) -> DbResult<Vec<Row>> {
        let sql = format!("DESCRIBE {}", quote_mysql_identifier(table));
        fetch_rows(pool, &sql, query_timeout).await
    }
}

pub(crate) mod sqlite {
    use super::*;
    use sqlx::{Executor, SqlitePool};

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        query_timeout: Duration,
    ) -> DbResult<Vec<Row>> {
        let rows_future = pool.fetch(sql).collect::<Vec<_>>();
        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("Query execution", query_timeout)),
        }
    }

    pub async fn execute_write(
        pool: &SqlitePool,
        sql: &str,
        query_timeout: Duration,
    ) -> DbResult<u64> {
        match timeout(query_timeout, pool.execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("Write operation", query_timeout)),
        }
    }

    pub async fn execute_rolled_back(
        pool: &SqlitePool,
        sql: &str,
        query_timeout: Duration,
    ) -> DbResult<u64> {
        let probe = async {
            let mut tx = pool.begin().await?;
            let result = (&mut *tx).execute(sql).await;
            tx.rollback().await?;
            result.map(|r| r.rows_affected())
        };
        match timeout(query_timeout, probe).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("Rollback probe", query_timeout)),
        }
    }

    pub async fn list_tables(pool: &SqlitePool, query_timeout: Duration) -> DbResult<Vec<String>> {
        let rows = fetch_rows(
            pool,
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
            query_timeout,
        )
        .await?;
        Ok(first_column_strings(rows))
    }

    pub async fn describe_table(
        pool: &SqlitePool,
        table: &str,
        query_timeout: Duration,
    ) -> DbResult<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM pragma_table_info({})",
            quote_sqlite_literal(table)
        );
        let rows = fetch_rows(pool, &sql, query_timeout).await?;
        if rows.is_empty() {
            // MySQL's DESCRIBE fails on a missing table; match that
            return Err(DbError::database(
                format!("no such table: {}", table),
                None,
                "Use the 'tables' tool to list available tables",
            ));
        }
        Ok(rows)
    }
}
