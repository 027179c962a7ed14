//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The [`Database`] collaborator trait consumed by the session core
//! - Connection pool management ([`DbClient`] over MySQL or SQLite)
//! - Statement execution with timeouts and rollback-only probes
//! - Row value normalization to JSON
//! - Database dispatch macros for reducing code duplication

pub mod executor;
#[macro_use]
pub mod macros;
#[cfg(test)]
pub(crate) mod mock;
pub mod pool;
pub mod types;

pub use macros::DatabaseType;
pub use pool::{DbClient, DbPool};

use crate::error::DbResult;
use std::future::Future;

/// One result row: column name to normalized value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Operations the session needs from the database.
///
/// Row values must already be normalized to text, number, boolean or null
/// (see [`types::RowToJson`]).
pub trait Database: Send + Sync + 'static {
    /// SQL dialect spoken by this database.
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MySql
    }

    /// Run a statement that returns rows.
    fn run_query(&self, sql: &str) -> impl Future<Output = DbResult<Vec<Row>>> + Send;

    /// Run a statement inside a transaction that is rolled back on every
    /// path, returning the affected-row count the driver reported.
    fn run_in_rollback_only_transaction(
        &self,
        sql: &str,
    ) -> impl Future<Output = DbResult<u64>> + Send;

    /// Run a statement for real (auto-commit) and return affected rows.
    fn run_statement(&self, sql: &str) -> impl Future<Output = DbResult<u64>> + Send;

    /// Names of the tables in the current database.
    fn list_tables(&self) -> impl Future<Output = DbResult<Vec<String>>> + Send;

    /// Column descriptions for one table.
    fn describe_table(&self, table: &str) -> impl Future<Output = DbResult<Vec<Row>>> + Send;
}
