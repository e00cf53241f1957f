//! Per-key async locks.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// How often idle locks are swept.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Locks untouched for longer than this are dropped by the sweep.
pub const DEFAULT_MAX_IDLE_AGE: Duration = Duration::from_secs(7200);

type LockTable = DashMap<String, (Arc<Mutex<()>>, Instant)>;

/// A map of async mutexes keyed by string.
///
/// Holders of different keys never wait on each other; holders of the same
/// key are serialized in acquisition order.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<LockTable>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the map and spawn a sweeper for idle entries.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_cleanup(name: &'static str) -> Self {
        let locks = Self::new();
        locks.clone().spawn_cleanup(DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_IDLE_AGE, name);
        locks
    }

    /// Get or create the lock for `key`, refreshing its last-use time.
    pub fn get(&self, key: &str) -> Arc<Mutex<()>> {
        let now = Instant::now();
        self.locks
            .entry(key.to_string())
            .and_modify(|(_, last_used)| *last_used = now)
            .or_insert_with(|| (Arc::new(Mutex::new(())), now))
            .0
            .clone()
    }

    /// Drop entries idle for longer than `max_age` that nobody currently holds.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.locks.len();
        self.locks.retain(|_, (lock, last_used)| {
            Arc::strong_count(lock) > 1 || now.duration_since(*last_used) <= max_age
        });
        before.saturating_sub(self.locks.len())
    }

    fn spawn_cleanup(self, interval: Duration, max_age: Duration, name: &'static str) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.cleanup_stale(max_age);
                if removed > 0 {
                    debug!(removed, remaining = self.len(), locks = name, "swept idle locks");
                }
            }
        });
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
