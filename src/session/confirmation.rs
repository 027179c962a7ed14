//! Confirmation tokens for previewed mutations.
//!
//! A dry run stores a [`PendingMutation`] under a fresh token. The token can
//! be redeemed once, with byte-identical SQL, before it expires. Expired
//! records are removed lazily on redemption and by a periodic sweep.

use crate::error::ConfirmationError;
use crate::sql::{OperationKind, RowEstimate};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default lifetime of a confirmation token.
pub const DEFAULT_CONFIRM_TTL: Duration = Duration::from_secs(300);

/// A previewed statement awaiting confirmation.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub token: String,
    pub sql: String,
    /// `-1` when the estimate is unknown.
    pub estimated_rows: i64,
    pub is_exact_count: bool,
    pub operation: OperationKind,
    pub created_at: Instant,
}

impl PendingMutation {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

pub struct ConfirmationStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, PendingMutation>>,
}

impl ConfirmationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `sql` and store the preview.
    pub async fn issue(
        &self,
        sql: &str,
        estimate: RowEstimate,
        operation: OperationKind,
    ) -> PendingMutation {
        let pending = PendingMutation {
            token: generate_token(),
            sql: sql.to_string(),
            estimated_rows: estimate.rows,
            is_exact_count: estimate.is_exact,
            operation,
            created_at: Instant::now(),
        };

        self.entries
            .write()
            .await
            .insert(pending.token.clone(), pending.clone());

        info!(
            token = %pending.token,
            operation = %operation,
            estimated_rows = pending.estimated_rows,
            "Confirmation token issued"
        );
        pending
    }

    /// Consume the token if it is live and bound to `sql`.
    ///
    /// A mismatched statement leaves the token valid.
    pub async fn redeem(
        &self,
        token: &str,
        sql: &str,
    ) -> Result<PendingMutation, ConfirmationError> {
        let mut entries = self.entries.write().await;

        let Some(pending) = entries.get(token) else {
            return Err(ConfirmationError::InvalidToken);
        };

        if pending.is_expired(self.ttl) {
            entries.remove(token);
            debug!(token = %token, "Rejected expired confirmation token");
            return Err(ConfirmationError::Expired);
        }

        if pending.sql != sql {
            debug!(token = %token, "Rejected confirmation token for different SQL");
            return Err(ConfirmationError::Mismatch);
        }

        entries
            .remove(token)
            .ok_or(ConfirmationError::InvalidToken)
    }

    /// Remove every expired record. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, pending| !pending.is_expired(self.ttl));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Swept expired confirmation tokens");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Spawn the periodic sweep. The task exits once the store is dropped.
    pub fn start_sweep_task(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = super::sweep_interval(self.ttl);
        tokio::spawn(sweep_loop(weak, period))
    }
}

async fn sweep_loop(weak: Weak<ConfirmationStore>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let Some(store) = weak.upgrade() else {
            debug!("Confirmation store dropped, sweep task exiting");
            return;
        };
        store.sweep().await;
    }
}

/// Generate a unique confirmation token.
fn generate_token() -> String {
    format!("cfm_{}", uuid::Uuid::new_v4().simple())
}
