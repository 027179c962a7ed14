//! MCP tool implementations.
//!
//! This module contains all database tool handlers:
//! - `query`: Execute SELECT queries through the result cache
//! - `execute`: Preview and confirm write operations
//! - `tables`: List tables in the current database
//! - `schema`: Get table schema information
//! - `explain`: Show a query execution plan
//! - `format`: Render result rows as table, JSON, CSV or Markdown

pub mod explain;
pub mod format;
pub mod query;
pub mod schema;
pub mod write;

pub use explain::{ExplainInput, ExplainOutput, ExplainToolHandler};
pub use format::OutputFormat;
pub use query::{QueryInput, QueryOutput, QueryToolHandler};
pub use schema::{
    DescribeTableInput, DescribeTableOutput, ListTablesInput, ListTablesOutput, SchemaToolHandler,
};
pub use write::{ExecuteInput, ExecuteOutput, WarningTier, WriteToolHandler};
