//! Result cache for read queries.
//!
//! Keyed by the literal SQL text. Entries go stale `ttl` after they were
//! stored; when the cache is full the entry with the oldest timestamp is
//! evicted (insertion order, not access order).

use crate::db::Row;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;

struct CachedResult {
    rows: Arc<Vec<Row>>,
    cached_at: Instant,
}

pub struct ResultCache {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, CachedResult>>,
}

impl ResultCache {
    /// A cache with `max_entries == 0` stores nothing.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_entries > 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached rows for `key`, unless missing or stale.
    pub async fn get(&self, key: &str) -> Option<Arc<Vec<Row>>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.cached_at.elapsed() <= self.ttl)
            .map(|entry| Arc::clone(&entry.rows))
    }

    /// Store rows under `key`, replacing any previous value.
    pub async fn put(&self, key: impl Into<String>, rows: Arc<Vec<Row>>) {
        if !self.is_enabled() {
            return;
        }
        let key = key.into();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.cached_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                debug!(evicted = %oldest, "Evicted oldest cache entry");
            }
        }

        entries.insert(
            key,
            CachedResult {
                rows,
                cached_at: Instant::now(),
            },
        );
    }

    /// Remove every stale entry. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.cached_at.elapsed() <= self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Swept stale cache entries");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Spawn the periodic sweep. The task exits once the cache is dropped.
    pub fn start_sweep_task(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = super::sweep_interval(self.ttl);
        tokio::spawn(sweep_loop(weak, period))
    }
}

async fn sweep_loop(weak: Weak<ResultCache>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let Some(cache) = weak.upgrade() else {
            debug!("Result cache dropped, sweep task exiting");
            return;
        };
        cache.sweep().await;
    }
}
