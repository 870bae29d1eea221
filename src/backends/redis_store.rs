//! Redis Store - Remote Cache Store
//!
//! Redis-backed implementation of [`CacheStore`] with optional key prefixing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::traits::CacheStore;

/// Default Redis URL when `REDIS_URL` is not set
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Keys requested per SCAN round trip
pub const DEFAULT_SCAN_BATCH: usize = 100;

/// Longest expiry sent to Redis; longer TTLs are clamped to it
///
/// Redis rejects an expiry whose absolute time overflows a signed 64-bit
/// millisecond clock. Half of that range (`i64::MAX / 2`) is still millions
/// of years.
pub const MAX_EXPIRY_MILLIS: u64 = u64::MAX / 4;

/// INCR that treats anything but a plain integer as 0 and keeps the key's TTL
const INCREMENT_SCRIPT: &str = r"
local raw = redis.call('GET', KEYS[1])
local current = 0
if raw and string.match(raw, '^-?%d+$') then
  current = tonumber(raw)
end
local next = current + 1
redis.call('SET', KEYS[1], string.format('%d', next), 'KEEPTTL')
return next
";

/// Redis cache store with `ConnectionManager` for automatic reconnection
///
/// - Every logical key is sent as `{key_prefix}{key}`
/// - Prefix deletion walks the keyspace with cursor-based `SCAN` and deletes
///   batch by batch, so no single command is unbounded
/// - Failures are returned as errors, never panics
pub struct RedisStore {
    /// Redis connection manager - handles reconnection automatically
    conn_manager: ConnectionManager,
    key_prefix: String,
    scan_batch: usize,
    increment_script: Script,
    /// Hit counter
    hits: Arc<AtomicU64>,
    /// Miss counter
    misses: Arc<AtomicU64>,
    /// Set counter
    sets: Arc<AtomicU64>,
}

impl RedisStore {
    /// Create new Redis store using `REDIS_URL` (or [`DEFAULT_REDIS_URL`]) and no key prefix
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis client cannot be created or connection fails.
    pub async fn new() -> Result<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        Self::with_url(&redis_url, "").await
    }

    /// Create new Redis store with custom URL and key prefix
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection string (e.g., `<redis://localhost:6379>`)
    /// * `key_prefix` - Prepended to every key (e.g., `"myapp:"`); may be empty
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis client cannot be created or connection fails.
    pub async fn with_url(redis_url: &str, key_prefix: &str) -> Result<Self> {
        info!(
            redis_url = %redis_url,
            key_prefix = %key_prefix,
            "Initializing Redis Store with ConnectionManager"
        );

        let client = Client::open(redis_url)
            .with_context(|| format!("Failed to create Redis client with URL: {redis_url}"))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .context("Failed to establish Redis connection manager")?;

        // Test connection
        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING health check failed")?;

        info!(redis_url = %redis_url, "Redis Store connected successfully");

        Ok(Self {
            conn_manager,
            key_prefix: key_prefix.to_string(),
            scan_batch: DEFAULT_SCAN_BATCH,
            increment_script: Script::new(INCREMENT_SCRIPT),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            sets: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Set how many keys each `SCAN` round trip asks for
    #[must_use]
    pub fn with_scan_batch(mut self, batch: usize) -> Self {
        self.scan_batch = batch.max(1);
        self
    }

    /// The key prefix applied to every key
    #[must_use]
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// `(hits, misses, sets)` observed by this store
    #[must_use]
    pub fn counters(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.sets.load(Ordering::Relaxed),
        )
    }

    fn full_key(&self, key: &str) -> String {
        prefixed(&self.key_prefix, key)
    }

    /// Delete every physical key starting with `raw_prefix` (already prefixed)
    async fn scan_delete(&self, raw_prefix: &str) -> Result<usize> {
        let mut conn = self.conn_manager.clone();
        let pattern = format!("{}*", escape_glob(raw_prefix));
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            // SCAN cursor MATCH pattern COUNT n
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_batch)
                .query_async(&mut conn)
                .await
                .with_context(|| format!("Redis SCAN failed for pattern {pattern}"))?;

            if !keys.is_empty() {
                let count: usize = conn
                    .del(&keys)
                    .await
                    .context("Redis DEL of scanned batch failed")?;
                removed += count;
            }

            cursor = next;
            // Cursor 0 means iteration is complete
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, count = removed, "[Redis] Deleted keys by prefix");
        Ok(removed)
    }
}

fn prefixed(prefix: &str, key: &str) -> String {
    let mut full = String::with_capacity(prefix.len() + key.len());
    full.push_str(prefix);
    full.push_str(key);
    full
}

/// PSETEX argument for a non-zero `ttl`
///
/// Sub-millisecond TTLs round up so they never mean "no expiry".
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, MAX_EXPIRY_MILLIS)
}

/// Escape Redis glob metacharacters so a prefix matches literally
fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let found: bool = conn
            .exists(self.full_key(key))
            .await
            .with_context(|| format!("Redis EXISTS failed for key {key}"))?;
        Ok(found)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<Vec<u8>> = conn
            .get(self.full_key(key))
            .await
            .with_context(|| format!("Redis GET failed for key {key}"))?;

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let full_key = self.full_key(key);

        if ttl.is_zero() {
            let _: () = conn
                .set(&full_key, value)
                .await
                .with_context(|| format!("Redis SET failed for key {key}"))?;
        } else {
            let millis = expiry_millis(ttl);
            let _: () = conn
                .pset_ex(&full_key, value, millis)
                .await
                .with_context(|| format!("Redis PSETEX failed for key {key}"))?;
        }

        self.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl_ms = ttl.as_millis(), "[Redis] Stored key");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: usize = conn
            .del(self.full_key(key))
            .await
            .with_context(|| format!("Redis DEL failed for key {key}"))?;
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        self.scan_delete(&self.full_key(prefix)).await
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn_manager.clone();
        let next: i64 = self
            .increment_script
            .key(self.full_key(key))
            .invoke_async(&mut conn)
            .await
            .with_context(|| format!("Redis increment failed for key {key}"))?;
        Ok(next)
    }

    async fn flush_all(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            let mut conn = self.conn_manager.clone();
            let _: () = redis::cmd("FLUSHDB")
                .query_async(&mut conn)
                .await
                .context("Redis FLUSHDB failed")?;
            info!("[Redis] Flushed database");
        } else {
            let removed = self.scan_delete(&self.key_prefix).await?;
            info!(
                key_prefix = %self.key_prefix,
                count = removed,
                "[Redis] Flushed all prefixed keys"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}
