//! Streamable HTTP transport.
//!
//! Every MCP session gets its own [`DbService`], and with it its own
//! confirmation tokens and result cache. The connection pool is shared.

use crate::db::DbClient;
use crate::error::{DbError, DbResult};
use crate::mcp::DbService;
use crate::session::SessionConfig;
use crate::transport::{Transport, wait_for_signal};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    db: Arc<DbClient>,
    session_config: SessionConfig,
    host: String,
    port: u16,
    endpoint: String,
}

impl HttpTransport {
    /// `session_config` applies to each session the transport creates.
    pub fn new(
        db: Arc<DbClient>,
        session_config: SessionConfig,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            db,
            session_config,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn router(&self) -> axum::Router {
        let db = Arc::clone(&self.db);
        let session_config = self.session_config;
        let service = StreamableHttpService::new(
            move || {
                debug!("Creating session for new MCP client");
                Ok(DbService::new(Arc::clone(&db), session_config))
            },
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service rejects "/"
        match self.endpoint.as_str() {
            "/" => axum::Router::new().fallback_service(service),
            path => axum::Router::new().nest_service(path, service),
        }
    }
}

/// Resolves on the first signal; a second signal or the grace period
/// ending afterwards forces the server down with clients still attached.
async fn forced_exit(first_signal: Arc<Notify>) {
    first_signal.notified().await;
    info!(
        timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
        "Draining MCP sessions (send the signal again to exit now)"
    );
    tokio::select! {
        _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => warn!("Drain timed out, exiting"),
        _ = wait_for_signal() => warn!("Second signal received, exiting"),
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Choose another MCP_HTTP_PORT or free the port",
            )
        })?;
        info!(addr = %bind_addr, endpoint = %self.endpoint, "Serving MCP over HTTP");

        let first_signal = Arc::new(Notify::new());
        let notify = Arc::clone(&first_signal);
        let server = axum::serve(listener, self.router()).with_graceful_shutdown(async move {
            wait_for_signal().await;
            notify.notify_one();
        });

        let outcome = tokio::select! {
            result = server => result.map_err(|e| {
                error!(error = %e, "HTTP server failed");
                DbError::internal(format!("HTTP server error: {}", e))
            }),
            _ = forced_exit(first_signal) => Ok(()),
        };

        self.db.close().await;
        info!("HTTP transport stopped");
        outcome
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn transport(host: &str, port: u16, endpoint: &str) -> HttpTransport {
        let db = DbClient::connect("sqlite::memory:", Duration::from_secs(1))
            .await
            .unwrap();
        HttpTransport::new(Arc::new(db), SessionConfig::default(), host, port, endpoint)
    }

    #[tokio::test]
    async fn test_http_transport_creation() {
        let transport = transport("127.0.0.1", 8080, "/mcp").await;
        assert_eq!(transport.name(), "http");
        assert_eq!(transport.bind_addr(), "127.0.0.1:8080");
        assert_eq!(transport.endpoint(), "/mcp");
    }

    #[tokio::test]
    async fn test_router_builds_for_root_and_nested_paths() {
        let _ = transport("127.0.0.1", 0, "/").await.router();
        let _ = transport("127.0.0.1", 0, "/mcp").await.router();
    }

    #[tokio::test]
    async fn test_http_transport_root_endpoint() {
        let transport = transport("0.0.0.0", 3000, "/").await;
        assert_eq!(transport.bind_addr(), "0.0.0.0:3000");
        assert_eq!(transport.endpoint(), "/");
    }
}
