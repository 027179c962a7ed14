//! MySQL MCP Server - Main entry point.
//!
//! This server exposes a MySQL (or SQLite) database to MCP clients with
//! read-only queries and previewed, token-confirmed writes.

use clap::Parser;
use mysql_mcp_server::config::{Config, DatabaseTarget, TransportMode};
use mysql_mcp_server::db::DbClient;
use mysql_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries the stdio protocol.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    init_tracing(&config);

    info!(
        transport = %config.transport,
        "Starting MySQL MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let query_timeout = config.query_timeout_duration();
    let connected = match config.database_target() {
        DatabaseTarget::Url(url) => DbClient::connect(&url, query_timeout).await,
        DatabaseTarget::MySql(options) => {
            info!(host = %config.mysql_host, port = config.mysql_port, "Connecting to MySQL");
            DbClient::connect_mysql(options, query_timeout).await
        }
    };

    let db = match connected {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!(error = %e, suggestion = e.suggestion().unwrap_or_default(), "Database connection failed");
            return Err(e.into());
        }
    };

    let session_config = config.session_config();
    info!(
        confirm_ttl_secs = session_config.confirm_ttl.as_secs(),
        cache_ttl_secs = session_config.cache_ttl.as_secs(),
        cache_max_entries = session_config.cache_max_entries,
        "Session settings"
    );

    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            StdioTransport::new(db, session_config).run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                db,
                session_config,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
