//! Error types for the MySQL MCP Server.
//!
//! Every error is recovered at the tool boundary and turned into a JSON-RPC
//! error object carrying an optional `suggestion`. None of them stop the server.

use std::time::Duration;
use thiserror::Error;

/// Why a confirmed execution was refused.
///
/// All of these are recovered by running the statement through a dry run again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("confirm_token is required when dry_run=false")]
    MissingToken,

    #[error("Invalid or expired confirmation token")]
    InvalidToken,

    #[error("Confirmation token has expired. Please run with dry_run=true again.")]
    Expired,

    #[error("SQL does not match the confirmation token")]
    Mismatch,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42S02" for unknown table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("{operation} timed out after {}s", .limit.as_secs())]
    Timeout { operation: String, limit: Duration },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The statement kind does not belong to the tool that received it.
    #[error("{message}")]
    WrongTool { message: String, tool: &'static str },

    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),

    #[error("Failed to analyze query: {message}")]
    Estimation { message: String },

    #[error("Execution failed: {message}")]
    Execution { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Connection-level failure with a recovery hint.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a classification rejection pointing the caller at `tool`.
    pub fn wrong_tool(message: impl Into<String>, tool: &'static str) -> Self {
        Self::WrongTool {
            message: message.into(),
            tool,
        }
    }

    /// Create an estimation error (failed dry run).
    pub fn estimation(message: impl Into<String>) -> Self {
        Self::Estimation {
            message: message.into(),
        }
    }

    /// Create an execution error (failed confirmed statement).
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Recovery hint placed in the error's `data.suggestion`.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::WrongTool { tool, .. } => Some(match *tool {
                "query" => "Use the 'query' tool for SELECT statements",
                _ => "Use the 'execute' tool with dry_run=true first",
            }),
            Self::Confirmation(_) => Some("Run the 'execute' tool with dry_run=true again"),
            Self::Timeout { .. } => Some("Narrow the query or raise MCP_QUERY_TIMEOUT"),
            _ => None,
        }
    }

    /// Transient failures worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Suggestion for a server-reported error, keyed on its SQLSTATE.
fn suggestion_for_state(sql_state: Option<&str>) -> &'static str {
    match sql_state {
        Some("42S02") => "Use the 'tables' tool to see which tables exist",
        Some("42S22") => "Use the 'schema' tool to see the table's columns",
        Some("42000") => "Check the SQL syntax near the reported position",
        Some("23000") => "The statement violates a key or constraint",
        Some(s) if s.starts_with("28") => "Check the MySQL user and password",
        _ => "Check the SQL and the objects it references",
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;

        match err {
            E::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                let suggestion = suggestion_for_state(code.as_deref());
                DbError::database(db_err.message(), code, suggestion)
            }
            E::PoolTimedOut => DbError::timeout(
                "Waiting for a database connection",
                Duration::from_secs(30),
            ),
            E::PoolClosed => DbError::connection("Connection pool is closed", "Restart the server"),
            E::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check MYSQL_HOST, MYSQL_PORT, MYSQL_USER and MYSQL_PASSWORD",
            ),
            E::Io(_) | E::Tls(_) | E::Protocol(_) => DbError::connection(
                err.to_string(),
                "Check that the MySQL server is reachable",
            ),
            E::RowNotFound => DbError::database("No rows returned", None, "Check the query conditions"),
            other => DbError::internal(other.to_string()),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Caller mistakes become `invalid_params`, server-side failures `internal_error`.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = err
            .suggestion()
            .map(|s| serde_json::json!({ "suggestion": s }));

        match &err {
            DbError::InvalidInput { .. } | DbError::WrongTool { .. } | DbError::Confirmation(_) => {
                Self::invalid_params(err.to_string(), data)
            }
            DbError::Database {
                message,
                sql_state: Some(code),
                ..
            } => Self::invalid_params(format!("{} (SQLSTATE: {})", message, code), data),
            DbError::Database { message, .. } => Self::invalid_params(message.clone(), data),
            _ => Self::internal_error(err.to_string(), data),
        }
    }
}
