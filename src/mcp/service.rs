//! MCP service implementation using rmcp.
//!
//! This module defines the DbService struct with all database tools
//! exposed via the MCP protocol using the rmcp framework's macros.
//! Each service wraps one [`Session`], so tokens and cached results never
//! leak between MCP sessions.

use crate::db::DbClient;
use crate::session::{Session, SessionConfig};
use crate::tools::explain::{ExplainInput, ExplainOutput};
use crate::tools::query::{QueryInput, QueryOutput};
use crate::tools::schema::{DescribeTableInput, DescribeTableOutput, ListTablesOutput};
use crate::tools::write::{ExecuteInput, ExecuteOutput};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct DbService {
    /// Per-client state: confirmation tokens and the result cache
    session: Arc<Session<DbClient>>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl DbService {
    /// Create a service with a fresh session and start its sweeps.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(db: Arc<DbClient>, config: SessionConfig) -> Self {
        let session = Session::new(db, config);
        session.start_background_sweeps();
        Self {
            session: Arc::new(session),
            tool_router: Self::tool_router(),
        }
    }

    pub fn session(&self) -> &Arc<Session<DbClient>> {
        &self.session
    }
}

#[tool_router]
impl DbService {
    #[tool(
        description = "Execute a read-only SELECT query and return results.\nOutput format: table (default), json, csv, or markdown.\nIdentical queries are served from a short-lived cache; the summary says when.\nINSERT/UPDATE/DELETE and DDL are rejected; use the execute tool for those."
    )]
    async fn query(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<Json<QueryOutput>, McpError> {
        self.session
            .query(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Execute a write operation (INSERT, UPDATE, DELETE, REPLACE) or DDL (CREATE, DROP, ALTER, TRUNCATE).\nTwo steps are required:\n1. Call with dry_run=true (the default) to preview the estimated affected rows and receive a confirm_token.\n2. Show the preview to the user and get explicit approval, then call again with dry_run=false, the identical sql and the confirm_token.\nTokens are single-use and expire after a few minutes."
    )]
    async fn execute(
        &self,
        Parameters(input): Parameters<ExecuteInput>,
    ) -> Result<Json<ExecuteOutput>, McpError> {
        self.session
            .execute(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "List all tables in the current database.")]
    async fn tables(&self) -> Result<Json<ListTablesOutput>, McpError> {
        self.session
            .list_tables()
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Show the column definitions of a table.")]
    async fn schema(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Result<Json<DescribeTableOutput>, McpError> {
        self.session
            .describe_table(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Show the execution plan for a query without running it.\nWith analyze=true, runs EXPLAIN ANALYZE to collect actual statistics; this executes the query and is only allowed for SELECT."
    )]
    async fn explain(
        &self,
        Parameters(input): Parameters<ExplainInput>,
    ) -> Result<Json<ExplainOutput>, McpError> {
        self.session
            .explain(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mysql-mcp-server".to_owned(),
                title: Some("MySQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for inspecting and querying a MySQL database.\n\
                \n\
                ## Reading\n\
                - `tables` lists tables, `schema` describes one table\n\
                - `query` runs SELECT statements only\n\
                - `explain` shows the execution plan of a statement\n\
                \n\
                ## Writing\n\
                All data and schema changes go through `execute` in two steps:\n\
                1. Dry run (default): returns estimated_rows, a warning_tier and a confirm_token\n\
                2. Ask the user to approve the preview, then call `execute` again with\n\
                   dry_run=false, the same sql and the confirm_token\n\
                \n\
                Never confirm on the user's behalf. A changed sql requires a new dry run.\n\
                A warning_tier of `critical` means the operation cannot be undone."
                    .to_string(),
            ),
        }
    }
}
