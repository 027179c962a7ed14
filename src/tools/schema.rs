//! Schema introspection tools.
//!
//! This module implements the `tables` and `schema` MCP tools.

use crate::db::{Database, Row};
use crate::error::{DbError, DbResult};
use crate::tools::format::{OutputFormat, render};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Input for the tables tool (no arguments).
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListTablesInput {}

/// Output from the tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    /// "Found N tables:"
    pub summary: String,
    /// Table names in the current database
    pub tables: Vec<String>,
    /// Number of tables
    pub count: usize,
}

/// Input for the schema tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeTableInput {
    /// Table name, optionally qualified as `database.table`
    pub table: String,
}

/// Output from the schema tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DescribeTableOutput {
    pub table: String,
    /// "Schema for table '<name>':"
    pub summary: String,
    /// One row per column, as reported by the database
    pub columns: Vec<Row>,
    /// Column descriptions as pretty-printed JSON
    pub formatted: String,
}

pub struct SchemaToolHandler<D> {
    db: Arc<D>,
}

impl<D: Database> SchemaToolHandler<D> {
    pub fn new(db: Arc<D>) -> Self {
        Self { db }
    }

    pub async fn list_tables(&self, _input: ListTablesInput) -> DbResult<ListTablesOutput> {
        let tables = self.db.list_tables().await?;
        let count = tables.len();
        debug!(count, "Listed tables");
        Ok(ListTablesOutput {
            summary: format!("Found {} tables:", count),
            tables,
            count,
        })
    }

    pub async fn describe_table(&self, input: DescribeTableInput) -> DbResult<DescribeTableOutput> {
        let table = input.table.trim();
        if table.is_empty() {
            return Err(DbError::invalid_input("Table parameter is required"));
        }

        let columns = self.db.describe_table(table).await?;
        Ok(DescribeTableOutput {
            table: table.to_string(),
            summary: format!("Schema for table '{}':", table),
            formatted: render(&columns, OutputFormat::Json),
            columns,
        })
    }
}
