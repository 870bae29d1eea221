//! Cache System Builder
//!
//! Composes a [`CacheSystem`] from a [`CacheConfig`], or from an explicitly
//! supplied store and codec.
//!
//! # Example: From Environment
//!
//! ```rust,no_run
//! use tagged_cache::{CacheConfig, CacheSystemBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = CacheSystemBuilder::from_config(CacheConfig::from_env()?)
//!         .build()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: Custom Store
//!
//! ```rust,ignore
//! use tagged_cache::CacheSystemBuilder;
//! use std::sync::Arc;
//!
//! let cache = CacheSystemBuilder::new()
//!     .with_store(Arc::new(MyCustomStore::new()))
//!     .build()
//!     .await?;
//! ```

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::CacheSystem;
use crate::backends::{BackendKind, MemoryStore};
use crate::codecs::AnyCodec;
use crate::config::CacheConfig;
use crate::traits::{CacheCodec, CacheStore};

/// Builder for [`CacheSystem`]
///
/// # Default Behavior
///
/// Without overrides the builder follows its [`CacheConfig`]:
/// - **Store**: [`MemoryStore`] or [`RedisStore`](crate::backends::RedisStore)
/// - **Codec**: the configured serializer (JSON by default)
/// - **Default TTL**: `default_ttl_secs`
pub struct CacheSystemBuilder {
    config: CacheConfig,
    store: Option<Arc<dyn CacheStore>>,
    codec: Option<AnyCodec>,
    default_ttl: Option<Duration>,
}

impl CacheSystemBuilder {
    /// Create a builder over [`CacheConfig::default`]
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(CacheConfig::default())
    }

    #[must_use]
    pub fn from_config(config: CacheConfig) -> Self {
        Self {
            config,
            store: None,
            codec: None,
            default_ttl: None,
        }
    }

    /// Use `store` instead of building one from the config
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `codec` instead of the configured serializer
    #[must_use]
    pub fn with_codec(mut self, codec: AnyCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Override `default_ttl_secs`
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Build the [`CacheSystem`]
    ///
    /// # Errors
    ///
    /// Returns an error if the configured serializer is not compiled in, or
    /// if the Redis store cannot connect.
    pub async fn build(self) -> Result<CacheSystem> {
        let codec = match self.codec {
            Some(codec) => codec,
            None => AnyCodec::from_kind(self.config.serializer)?,
        };

        let store = match self.store {
            Some(store) => {
                info!(store = store.name(), "Using custom cache store");
                store
            }
            None => build_store(&self.config).await?,
        };

        let default_ttl = self.default_ttl.unwrap_or_else(|| self.config.default_ttl());

        info!(
            store = store.name(),
            codec = codec.name(),
            default_ttl_secs = default_ttl.as_secs(),
            "Cache system built"
        );

        Ok(CacheSystem::new(store, codec, default_ttl))
    }
}

impl Default for CacheSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn build_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    match config.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryStore::with_sweep_interval(
            config.sweep_interval(),
        ))),
        BackendKind::Redis => build_redis_store(config).await,
    }
}

#[cfg(feature = "redis")]
async fn build_redis_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    use crate::backends::redis_store::{DEFAULT_REDIS_URL, RedisStore};

    let url = config.redis_url.as_deref().unwrap_or(DEFAULT_REDIS_URL);
    let store = RedisStore::with_url(url, &config.key_prefix)
        .await?
        .with_scan_batch(config.scan_batch_size);
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
#[allow(clippy::unused_async)]
async fn build_redis_store(_config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    anyhow::bail!("the redis backend is not enabled in this build")
}
