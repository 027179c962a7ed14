//! Per-client session state and tool routing.
//!
//! A [`Session`] owns the confirmation store and result cache for one MCP
//! client. Stdio serves a single session for the life of the process; the
//! HTTP transport creates one per MCP session. The database collaborator is
//! shared between sessions.

pub mod cache;
pub mod confirmation;

use crate::db::Database;
use crate::error::DbResult;
use crate::tools::{
    DescribeTableInput, DescribeTableOutput, ExecuteInput, ExecuteOutput, ExplainInput,
    ExplainOutput, ExplainToolHandler, ListTablesInput, ListTablesOutput, QueryInput, QueryOutput,
    QueryToolHandler, SchemaToolHandler, WriteToolHandler,
};
use cache::{DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL, ResultCache};
use confirmation::{ConfirmationStore, DEFAULT_CONFIRM_TTL};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Sweep period for a store whose entries live for `ttl`.
pub(crate) fn sweep_interval(ttl: Duration) -> Duration {
    (ttl / 2).max(Duration::from_secs(1))
}

/// Lifetimes and capacity for session-owned state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub confirm_ttl: Duration,
    pub cache_ttl: Duration,
    /// 0 disables result caching.
    pub cache_max_entries: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            confirm_ttl: DEFAULT_CONFIRM_TTL,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

pub struct Session<D> {
    db: Arc<D>,
    cache: Arc<ResultCache>,
    confirmations: Arc<ConfirmationStore>,
    sweeps: Mutex<Vec<JoinHandle<()>>>,
}

impl<D: Database> Session<D> {
    /// Create a session without background sweeps. Expired entries are
    /// still never served; call [`Session::start_background_sweeps`] to
    /// reclaim their memory.
    pub fn new(db: Arc<D>, config: SessionConfig) -> Self {
        Self {
            db,
            cache: Arc::new(ResultCache::new(config.cache_ttl, config.cache_max_entries)),
            confirmations: Arc::new(ConfirmationStore::new(config.confirm_ttl)),
            sweeps: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the periodic sweeps for both stores. Must be called inside a
    /// tokio runtime. Calling it twice has no effect.
    pub fn start_background_sweeps(&self) {
        let Ok(mut sweeps) = self.sweeps.lock() else {
            return;
        };
        if !sweeps.is_empty() {
            return;
        }
        sweeps.push(self.confirmations.start_sweep_task());
        sweeps.push(self.cache.start_sweep_task());
        debug!(
            confirm_ttl_secs = self.confirmations.ttl().as_secs(),
            cache_ttl_secs = self.cache.ttl().as_secs(),
            "Session sweeps started"
        );
    }

    /// Stop the sweeps. Tokens and cached rows are dropped with the session.
    pub fn shutdown(&self) {
        if let Ok(mut sweeps) = self.sweeps.lock() {
            for handle in sweeps.drain(..) {
                handle.abort();
            }
        }
    }

    pub fn db(&self) -> &Arc<D> {
        &self.db
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn confirmations(&self) -> &Arc<ConfirmationStore> {
        &self.confirmations
    }

    pub async fn query(&self, input: QueryInput) -> DbResult<QueryOutput> {
        QueryToolHandler::new(Arc::clone(&self.db), Arc::clone(&self.cache))
            .query(input)
            .await
    }

    pub async fn execute(&self, input: ExecuteInput) -> DbResult<ExecuteOutput> {
        WriteToolHandler::new(Arc::clone(&self.db), Arc::clone(&self.confirmations))
            .execute(input)
            .await
    }

    pub async fn list_tables(&self) -> DbResult<ListTablesOutput> {
        SchemaToolHandler::new(Arc::clone(&self.db))
            .list_tables(ListTablesInput::default())
            .await
    }

    pub async fn describe_table(&self, input: DescribeTableInput) -> DbResult<DescribeTableOutput> {
        SchemaToolHandler::new(Arc::clone(&self.db))
            .describe_table(input)
            .await
    }

    pub async fn explain(&self, input: ExplainInput) -> DbResult<ExplainOutput> {
        ExplainToolHandler::new(Arc::clone(&self.db))
            .explain(input)
            .await
    }
}

impl<D> Drop for Session<D> {
    fn drop(&mut self) {
        if let Ok(sweeps) = self.sweeps.get_mut() {
            for handle in sweeps.drain(..) {
                handle.abort();
            }
        }
    }
}
