//! Memory Store - In-Process Cache Store
//!
//! A `HashMap` behind a single reader/writer lock, with a background task that
//! sweeps expired entries on a fixed interval.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::traits::CacheStore;

/// Default interval between expiry sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Stored entry with expiration tracking
#[derive(Debug, Clone)]
struct StoredEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    /// An expiry too far out for `Instant` to represent means no expiry
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: if ttl.is_zero() { None } else { Instant::now().checked_add(ttl) },
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    swept: AtomicU64,
}

/// Snapshot of [`MemoryStore`] counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries reclaimed by the background sweeper
    pub swept: u64,
    /// Entries currently held, including expired ones not yet swept
    pub entries: usize,
}

type EntryMap = RwLock<HashMap<String, StoredEntry>>;

/// In-process cache store
///
/// **Locking**: every mutation takes the write lock, every read the read lock.
/// `increment` performs its read-modify-write under one write lock, which is
/// what makes tag-version bumps atomic.
///
/// **Expiry**: an expired entry is invisible to reads immediately; its memory
/// is reclaimed by the sweeper task. The sweeper only holds a weak reference
/// and stops when the store is dropped.
///
/// **Example**:
/// ```rust
/// use tagged_cache::backends::MemoryStore;
/// use tagged_cache::CacheStore;
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let store = MemoryStore::new();
/// store.set("user:1", b"alice", Duration::from_secs(60)).await?;
/// assert_eq!(store.get("user:1").await?, Some(b"alice".to_vec()));
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    map: Arc<EntryMap>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    /// Create a store sweeping every [`DEFAULT_SWEEP_INTERVAL`]
    #[must_use]
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    /// Create a store with a custom sweep interval
    ///
    /// The sweeper is spawned on the current tokio runtime. Outside a runtime
    /// no sweeper runs and expired entries are only dropped when overwritten,
    /// deleted or flushed. A zero interval is treated as one millisecond.
    #[must_use]
    pub fn with_sweep_interval(interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let store = Self {
            map: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(sweep_loop(
                    Arc::downgrade(&store.map),
                    Arc::clone(&store.counters),
                    interval,
                ));
                info!(
                    interval_secs = interval.as_secs_f64(),
                    "Memory Store initialized with expiry sweeper"
                );
            }
            Err(_) => {
                warn!("Memory Store created outside a tokio runtime; expiry sweeper disabled");
            }
        }

        store
    }

    /// Remove expired entries now, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let removed = purge(&self.map);
        self.counters.swept.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Number of entries held, including expired ones not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Check if the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Get store statistics
    #[must_use]
    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            swept: self.counters.swept.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn purge(map: &EntryMap) -> usize {
    let now = Instant::now();
    let mut guard = map.write();
    let before = guard.len();
    guard.retain(|_, entry| !entry.is_expired(now));
    before - guard.len()
}

/// A counter value: optional `-` then ASCII digits, nothing else
fn parse_counter(raw: &[u8]) -> Option<i64> {
    let digits = raw.strip_prefix(b"-").unwrap_or(raw);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(raw).ok()?.parse().ok()
}

async fn sweep_loop(map: Weak<EntryMap>, counters: Arc<Counters>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(map) = map.upgrade() else {
            debug!("[Memory] Store dropped, stopping expiry sweeper");
            return;
        };
        let removed = purge(&map);
        if removed > 0 {
            counters.swept.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(count = removed, "[Memory] Swept expired entries");
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self.map.read().get(key).is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let value = self
            .map
            .read()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone());

        if value.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let entry = StoredEntry::new(value.to_vec(), ttl);
        self.map.write().insert(key.to_string(), entry);
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl_ms = ttl.as_millis(), "[Memory] Stored key");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.map.write().remove(key).is_some() {
            self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        let removed = {
            let mut guard = self.map.write();
            let before = guard.len();
            guard.retain(|key, _| !key.starts_with(prefix));
            before - guard.len()
        };
        self.counters.deletes.fetch_add(removed as u64, Ordering::Relaxed);
        debug!(prefix = %prefix, count = removed, "[Memory] Deleted keys by prefix");
        Ok(removed)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        let mut guard = self.map.write();

        let live = guard.get(key).filter(|entry| !entry.is_expired(now));
        let current = live.and_then(|entry| parse_counter(&entry.value)).unwrap_or(0);
        let expires_at = live.and_then(|entry| entry.expires_at);

        let next = current.wrapping_add(1);
        guard.insert(
            key.to_string(),
            StoredEntry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn flush_all(&self) -> Result<()> {
        let removed = {
            let mut guard = self.map.write();
            let count = guard.len();
            guard.clear();
            count
        };
        info!(count = removed, "[Memory] Flushed all entries");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}
