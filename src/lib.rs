//! Tagged Cache
//!
//! A type-safe caching layer for services that front a slower source of truth:
//! - **Typed Caches**: one value type per namespace, pluggable serialization
//! - **Tag Invalidation**: versioned tag counters, O(1) per tag, no key scans
//! - **Stampede Protection**: per-key single-flight loads with panic isolation
//! - **Pluggable Stores**: in-process memory store or Redis
//! - **Cache-Aside Repositories**: a decorator that caches any [`Repository`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tagged_cache::{CacheSystem, CacheStrategy};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = CacheSystem::from_env().await?;
//!     let users = cache.typed::<User>("user")?;
//!
//!     // Loads once, even under concurrent misses
//!     let user = users
//!         .get_or_load("info:42", CacheStrategy::MediumTerm.into(), || async {
//!             Ok(User { id: 42, name: "alice".into() })
//!         }, &["user"])
//!         .await?;
//!
//!     // Every key tagged "user" is now unreachable
//!     users.invalidate_tags(&["user"]).await?;
//!
//!     tracing::info!(?user, hit_rate = users.stats().hit_rate, "Loaded user");
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Repository ← CachedRepository → TypedCache<T> → CacheStore (Memory | Redis)
//!                                      ↓ miss
//!                                 SingleFlight → loader (once per key)
//! ```

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod backends;
pub mod builder;
pub mod codecs;
pub mod config;
pub mod error;
pub mod repository;
pub mod singleflight;
pub mod traits;
pub mod typed_cache;

pub use backends::{BackendKind, MemoryStore, MemoryStoreStats};
#[cfg(feature = "redis")]
pub use backends::RedisStore;
pub use builder::CacheSystemBuilder;
pub use codecs::{AnyCodec, CodecKind, JsonCodec};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use repository::{CacheKeyPolicy, CachedRepository, DefaultKeyPolicy, Page, Repository};
pub use singleflight::SingleFlight;
pub use traits::{CacheCodec, CacheStore};
pub use typed_cache::{CacheStrategy, TypedCache, TypedCacheStats};

// Re-export async_trait for user convenience
pub use async_trait::async_trait;

/// Main entry point: a store, a codec and a default TTL
///
/// Built once at startup and passed to whoever needs a cache; there is no
/// global instance. Cloning is cheap and every clone shares the same store.
///
/// # Example
///
/// ```rust,no_run
/// use tagged_cache::CacheSystem;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let cache = CacheSystem::from_env().await?;
///     let scores = cache.typed::<u32>("score")?;
///     scores.set("alice", &100, std::time::Duration::ZERO, &[]).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CacheSystem {
    store: Arc<dyn CacheStore>,
    codec: AnyCodec,
    default_ttl: Duration,
}

impl CacheSystem {
    /// Assemble a cache system from already-built parts
    ///
    /// Prefer [`CacheSystemBuilder`] unless the parts come from elsewhere.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, codec: AnyCodec, default_ttl: Duration) -> Self {
        Self {
            store,
            codec,
            default_ttl,
        }
    }

    /// Build a cache system from environment variables
    ///
    /// See [`CacheConfig::from_env`] for the variables read.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is malformed or the store cannot be built.
    pub async fn from_env() -> Result<Self> {
        info!("Initializing Cache System from environment");
        CacheSystemBuilder::from_config(CacheConfig::from_env()?).build().await
    }

    /// A typed cache over `namespace`, sharing this system's store
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidNamespace`] for an empty or reserved namespace.
    pub fn typed<T>(&self, namespace: &str) -> CacheResult<TypedCache<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        TypedCache::new(namespace, Arc::clone(&self.store), self.codec.clone(), self.default_ttl)
    }

    /// Wrap `inner` in a cache-aside decorator using [`DefaultKeyPolicy`]
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidNamespace`] for an empty or reserved namespace.
    pub fn cached_repository<R>(
        &self,
        namespace: &str,
        inner: Arc<R>,
    ) -> CacheResult<CachedRepository<R>>
    where
        R: Repository + 'static,
    {
        self.cached_repository_with_policy(namespace, inner, DefaultKeyPolicy::default())
    }

    /// Wrap `inner` in a cache-aside decorator with a custom key policy
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidNamespace`] for an empty or reserved namespace.
    pub fn cached_repository_with_policy<R, P>(
        &self,
        namespace: &str,
        inner: Arc<R>,
        policy: P,
    ) -> CacheResult<CachedRepository<R, P>>
    where
        R: Repository + 'static,
        P: CacheKeyPolicy,
    {
        let entities = self.typed::<R::Entity>(namespace)?;
        let lists = self.typed::<Page<R::Entity>>(namespace)?;
        Ok(CachedRepository::new(inner, entities, lists, policy))
    }

    /// Check whether the store is operational
    pub async fn health_check(&self) -> bool {
        let healthy = self.store.health_check().await;
        if healthy {
            info!(store = self.store.name(), "Cache health check passed");
        } else {
            warn!(store = self.store.name(), "Cache health check failed");
        }
        healthy
    }

    /// Evict everything in the store, across all namespaces and tags
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if the store rejects the flush.
    pub async fn flush_all(&self) -> CacheResult<()> {
        self.store.flush_all().await.map_err(CacheError::store)?;
        info!(store = self.store.name(), "Flushed cache store");
        Ok(())
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    #[must_use]
    pub fn codec(&self) -> &AnyCodec {
        &self.codec
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}
