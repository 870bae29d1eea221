//! Cache Store and Codec Traits
//!
//! This module defines the two seams of the cache layer:
//!
//! - `CacheCodec`: pluggable serialization of typed values to bytes
//! - `CacheStore`: byte-oriented key/value store with TTL, atomic increment
//!   and prefix deletion
//!
//! Neither choice leaks into call sites: a [`TypedCache`](crate::TypedCache)
//! is built from any store and any codec.
//!
//! # Example: Custom Store
//!
//! ```rust,ignore
//! use tagged_cache::{CacheStore, async_trait};
//! use std::time::Duration;
//! use anyhow::Result;
//!
//! struct MyStore {
//!     // Your implementation
//! }
//!
//! #[async_trait]
//! impl CacheStore for MyStore {
//!     async fn exists(&self, key: &str) -> Result<bool> { todo!() }
//!     async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> { todo!() }
//!     async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> { todo!() }
//!     async fn delete(&self, key: &str) -> Result<()> { todo!() }
//!     async fn delete_by_prefix(&self, prefix: &str) -> Result<usize> { todo!() }
//!     async fn increment(&self, key: &str) -> Result<i64> { todo!() }
//!     async fn flush_all(&self) -> Result<()> { todo!() }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::time::Duration;

/// Trait for cache value serialization/deserialization
///
/// Implementations must round-trip: `deserialize(serialize(v)) == v` for
/// every value type they are used with.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync + Debug` to support concurrent access across async tasks
/// and provide debugging capabilities.
///
/// # Example: Custom Codec
///
/// ```rust,ignore
/// use tagged_cache::CacheCodec;
/// use anyhow::Result;
/// use serde::{Serialize, de::DeserializeOwned};
///
/// #[derive(Debug)]
/// struct MyCustomCodec;
///
/// impl CacheCodec for MyCustomCodec {
///     fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
///         Ok(mycodec::serialize(value)?)
///     }
///
///     fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
///         Ok(mycodec::deserialize(bytes)?)
///     }
///
///     fn name(&self) -> &'static str {
///         "mycodec"
///     }
/// }
/// ```
pub trait CacheCodec: Send + Sync + Debug {
    /// Serialize a value to bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented in this format.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize bytes to a value
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid encoding of `T`.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;

    /// Get the name of the codec, used for logging
    fn name(&self) -> &'static str;
}

/// Byte-oriented cache store
///
/// This trait defines the storage contract shared by the in-process
/// [`MemoryStore`](crate::backends::MemoryStore) and the Redis-backed
/// [`RedisStore`](crate::backends::RedisStore).
///
/// # Semantics
///
/// - A missing key is `Ok(None)` / `Ok(false)`, never an error.
/// - A TTL of [`Duration::ZERO`] means "no expiry".
/// - `increment` is atomic with respect to concurrent callers and treats a
///   missing or non-numeric value as 0 before incrementing.
/// - Connectivity failures are returned as errors, never panics.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to support concurrent access across async tasks.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Check whether a live (non-expired) entry exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Get the raw bytes stored under `key`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(bytes))` - Live entry found
    /// * `Ok(None)` - Key not found or expired
    /// * `Err(e)` - Store fault
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes under `key`, replacing any previous entry
    ///
    /// `ttl == Duration::ZERO` stores the entry without expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every key starting with `prefix`, returning how many were removed
    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize>;

    /// Atomically increment the integer stored under `key` and return the new value
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Evict every entry in the store, regardless of namespace or tag
    async fn flush_all(&self) -> Result<()>;

    /// Check if the store is operational
    ///
    /// The default implementation writes, reads back and removes a probe key.
    async fn health_check(&self) -> bool {
        let test_key = "__health_check";
        let test_value = b"health_check_value";

        match self.set(test_key, test_value, Duration::from_secs(10)).await {
            Ok(()) => match self.get(test_key).await {
                Ok(Some(retrieved)) => {
                    let _ = self.delete(test_key).await;
                    retrieved == test_value
                }
                _ => false,
            },
            Err(_) => false,
        }
    }

    /// Get the name of this store, used for logging
    fn name(&self) -> &'static str {
        "unknown"
    }
}
