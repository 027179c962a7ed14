//! MySQL MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to read from a MySQL database and to change it only through a dry run
//! followed by an explicitly confirmed execution.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod session;
pub mod sql;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::DbService;
pub use session::{Session, SessionConfig};
