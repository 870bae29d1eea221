//! Typed Cache - Namespaced, Tag-Versioned Cache Operations
//!
//! A [`TypedCache<T>`] stores values of exactly one type under one namespace.
//! It composes physical keys from the namespace, a caller-supplied base key and
//! the current version of every tag the entry depends on.
//!
//! # Key layout
//!
//! ```text
//! {namespace}:{base}|{tag}@{version}|{tag}@{version}...
//! ```
//!
//! Tags are sorted and de-duplicated first, so tag order never matters. Tag
//! versions live in the store under `__tagver:{tag}` and default to 0.
//!
//! The separators `|` and `@` inside a base or tag are percent-escaped (as is
//! `%` itself), so distinct (base, tags) pairs never share a physical key.
//! Namespaces may not contain `:` or either separator.
//! Invalidating a tag increments its version: every key built with the old
//! version is simply never addressed again and ages out by TTL.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::codecs::AnyCodec;
use crate::error::{CacheError, CacheResult};
use crate::singleflight::SingleFlight;
use crate::traits::{CacheCodec, CacheStore};

/// Prefix of the reserved keys holding tag version counters
pub const TAG_VERSION_PREFIX: &str = "__tagver:";

/// Characters a namespace may not contain
const RESERVED_NAMESPACE_CHARS: [char; 4] = [':', '|', '@', '%'];

/// TTL used when a typed cache is built with a zero default TTL
pub const FALLBACK_DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache strategies for different data types
#[derive(Debug, Clone, Copy)]
pub enum CacheStrategy {
    /// Real-time data - 10 seconds TTL
    RealTime,
    /// Short-term data - 5 minutes TTL
    ShortTerm,
    /// Medium-term data - 1 hour TTL
    MediumTerm,
    /// Long-term data - 3 hours TTL
    LongTerm,
    /// Custom TTL
    Custom(Duration),
    /// Use the typed cache's default TTL
    Default,
}

impl CacheStrategy {
    /// Convert strategy to duration. [`CacheStrategy::Default`] maps to
    /// `Duration::ZERO`, which typed cache operations resolve to their default.
    #[must_use]
    pub fn to_duration(&self) -> Duration {
        match self {
            Self::RealTime => Duration::from_secs(10),
            Self::ShortTerm => Duration::from_secs(300),
            Self::MediumTerm => Duration::from_secs(3600),
            Self::LongTerm => Duration::from_secs(10800),
            Self::Custom(duration) => *duration,
            Self::Default => Duration::ZERO,
        }
    }
}

impl From<CacheStrategy> for Duration {
    fn from(strategy: CacheStrategy) -> Self {
        strategy.to_duration()
    }
}

/// Physical key of the version counter for `tag`
#[must_use]
pub fn tag_version_key(tag: &str) -> String {
    format!("{TAG_VERSION_PREFIX}{tag}")
}

/// Append `part` to `key` with the key separators percent-escaped
fn push_escaped(key: &mut String, part: &str) {
    for ch in part.chars() {
        match ch {
            '%' => key.push_str("%25"),
            '@' => key.push_str("%40"),
            '|' => key.push_str("%7C"),
            _ => key.push(ch),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_errors: AtomicU64,
    invalidations: AtomicU64,
}

/// Typed cache statistics
#[derive(Debug, Clone)]
pub struct TypedCacheStats {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    /// Loader invocations
    pub loads: u64,
    /// Loader invocations that returned an error
    pub load_errors: u64,
    /// `get_or_load` calls served by another caller's in-flight load
    pub coalesced: u64,
    pub in_flight: usize,
    /// Tag version increments
    pub invalidations: u64,
}

/// Namespaced cache of `T` values
///
/// Cheap to share behind an `Arc`; holds no per-entry state apart from the
/// in-flight load tickets.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tagged_cache::{backends::MemoryStore, codecs::JsonCodec, TypedCache};
///
/// # async fn example() -> Result<(), tagged_cache::CacheError> {
/// let store = Arc::new(MemoryStore::new());
/// let users: TypedCache<String, JsonCodec> =
///     TypedCache::new("user", store, JsonCodec, Duration::from_secs(3600))?;
///
/// users.set("info:42", &"alice".to_string(), Duration::ZERO, &["user"]).await?;
/// assert_eq!(users.get("info:42", &["user"]).await?, Some("alice".to_string()));
///
/// users.invalidate_tags(&["user"]).await?;
/// assert_eq!(users.get("info:42", &["user"]).await?, None);
/// # Ok(())
/// # }
/// ```
pub struct TypedCache<T, C = AnyCodec> {
    namespace: String,
    store: Arc<dyn CacheStore>,
    codec: Arc<C>,
    flight: SingleFlight<T>,
    default_ttl: Duration,
    counters: Arc<Counters>,
}

impl<T, C> TypedCache<T, C>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    C: CacheCodec + 'static,
{
    /// Create a typed cache
    ///
    /// A zero `default_ttl` is replaced by [`FALLBACK_DEFAULT_TTL`]; entries
    /// written through a typed cache always expire.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidNamespace`] for an empty namespace, one
    /// starting with `__` (reserved for tag version counters), or one
    /// containing `:`, `|`, `@` or `%`.
    pub fn new(
        namespace: impl Into<String>,
        store: Arc<dyn CacheStore>,
        codec: C,
        default_ttl: Duration,
    ) -> CacheResult<Self> {
        let namespace = namespace.into();
        if namespace.is_empty()
            || namespace.starts_with("__")
            || namespace.contains(RESERVED_NAMESPACE_CHARS)
        {
            return Err(CacheError::InvalidNamespace(namespace));
        }

        let default_ttl = if default_ttl.is_zero() {
            FALLBACK_DEFAULT_TTL
        } else {
            default_ttl
        };

        debug!(
            namespace = %namespace,
            store = store.name(),
            codec = codec.name(),
            default_ttl_secs = default_ttl.as_secs(),
            "Created typed cache"
        );

        Ok(Self {
            namespace,
            store,
            codec: Arc::new(codec),
            flight: SingleFlight::new(),
            default_ttl,
            counters: Arc::new(Counters::default()),
        })
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    #[must_use]
    pub fn codec_name(&self) -> &'static str {
        self.codec.name()
    }

    /// The store this cache writes to
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    fn resolve_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() { self.default_ttl } else { ttl }
    }

    /// Current version of `tag` (0 when never invalidated)
    ///
    /// # Errors
    ///
    /// Returns a store error if the store fails or the counter is not an integer.
    pub async fn tag_version(&self, tag: &str) -> CacheResult<i64> {
        let key = tag_version_key(tag);
        match self.store.get(&key).await.map_err(CacheError::store)? {
            None => Ok(0),
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|text| text.trim().parse::<i64>().ok())
                .ok_or_else(|| {
                    CacheError::store(anyhow::anyhow!(
                        "tag version counter {key} is not an integer"
                    ))
                }),
        }
    }

    /// Build the physical key for `base` bound to the current versions of `tags`
    ///
    /// # Errors
    ///
    /// Returns a store error if a tag version cannot be read.
    pub async fn build_key(&self, base: &str, tags: &[&str]) -> CacheResult<String> {
        let mut key = format!("{}:", self.namespace);
        push_escaped(&mut key, base);
        if tags.is_empty() {
            return Ok(key);
        }

        let mut sorted = tags.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        for tag in sorted {
            let version = self.tag_version(tag).await?;
            key.push('|');
            push_escaped(&mut key, tag);
            let _ = write!(key, "@{version}");
        }
        Ok(key)
    }

    /// Get a value
    ///
    /// # Returns
    /// * `Ok(Some(value))` - Cache hit
    /// * `Ok(None)` - Cache miss (absent, expired, or orphaned by a tag bump)
    /// * `Err(CacheError::Codec)` - Entry present but undecodable
    /// * `Err(CacheError::Store)` - Store fault
    ///
    /// # Errors
    ///
    /// See above. A decode failure is never reported as a miss.
    pub async fn get(&self, base: &str, tags: &[&str]) -> CacheResult<Option<T>> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let key = self.build_key(base, tags).await?;

        let value = read_entry::<T, C>(self.store.as_ref(), &self.codec, &key).await?;
        if value.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    /// Store a value. A zero `ttl` uses the cache's default TTL.
    ///
    /// # Errors
    ///
    /// Returns a codec error if encoding fails or a store error if the write fails.
    pub async fn set(
        &self,
        base: &str,
        value: &T,
        ttl: Duration,
        tags: &[&str],
    ) -> CacheResult<()> {
        let key = self.build_key(base, tags).await?;
        let bytes = self.codec.serialize(value).map_err(CacheError::codec)?;
        let ttl = self.resolve_ttl(ttl);

        self.store
            .set(&key, &bytes, ttl)
            .await
            .map_err(CacheError::store)?;
        debug!(
            key = %key,
            ttl_secs = ttl.as_secs(),
            codec = self.codec.name(),
            "Cached typed value"
        );
        Ok(())
    }

    /// Remove the entry for `base` under the current versions of `tags`
    ///
    /// # Errors
    ///
    /// Returns a store error if the store fails.
    pub async fn delete(&self, base: &str, tags: &[&str]) -> CacheResult<()> {
        let key = self.build_key(base, tags).await?;
        self.store.delete(&key).await.map_err(CacheError::store)?;
        debug!(key = %key, "Deleted cache entry");
        Ok(())
    }

    /// Invalidate every entry built with any of `tags`
    ///
    /// Costs one atomic increment per tag, however many entries reference it.
    ///
    /// # Errors
    ///
    /// Returns a store error on the first failed increment.
    pub async fn invalidate_tags(&self, tags: &[&str]) -> CacheResult<()> {
        let mut sorted = tags.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        for tag in sorted {
            let version = self
                .store
                .increment(&tag_version_key(tag))
                .await
                .map_err(CacheError::store)?;
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            info!(namespace = %self.namespace, tag = %tag, version, "Invalidated cache tag");
        }
        Ok(())
    }

    /// Delete every entry of this namespace whose base key starts with `prefix`
    ///
    /// The escape hatch for emergency purges and for entries that cannot be
    /// tag-versioned. Returns the number of removed entries.
    ///
    /// # Errors
    ///
    /// Returns a store error if the store fails.
    pub async fn batch_delete_by_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut full_prefix = format!("{}:", self.namespace);
        push_escaped(&mut full_prefix, prefix);
        let removed = self
            .store
            .delete_by_prefix(&full_prefix)
            .await
            .map_err(CacheError::store)?;
        info!(prefix = %full_prefix, count = removed, "Purged cache entries by prefix");
        Ok(removed)
    }

    /// Get a value, loading it with stampede protection on a miss
    ///
    /// 1. Check the store → decode and return on hit
    /// 2. On miss, join or start the single in-flight load for the key
    /// 3. Inside the load: re-check the store, else call `loader`
    /// 4. Encode and write the loaded value back with the resolved TTL
    ///
    /// Concurrent callers for the same key share one `loader` invocation.
    /// A loader error is returned to every waiter and nothing is cached.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Loader`] with the loader's own error
    /// - [`CacheError::Codec`] if a cached entry cannot be decoded or the loaded
    ///   value cannot be encoded
    /// - [`CacheError::Store`] if the store fails while reading
    /// - [`CacheError::LoadAborted`] if the loader panicked
    pub async fn get_or_load<F, Fut>(
        &self,
        base: &str,
        ttl: Duration,
        loader: F,
        tags: &[&str],
    ) -> CacheResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let key = self.build_key(base, tags).await?;

        // 1. Fast path
        if let Some(value) = read_entry::<T, C>(self.store.as_ref(), &self.codec, &key).await? {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        // 2. Miss - coalesce with any in-flight load for the same key
        let store = Arc::clone(&self.store);
        let codec = Arc::clone(&self.codec);
        let counters = Arc::clone(&self.counters);
        let ttl = self.resolve_ttl(ttl);
        let load_key = key.clone();

        self.flight
            .run(&key, move || async move {
                // 3. Double-check: the previous load may have finished between our
                // miss and taking the ticket
                if let Some(value) = read_entry::<T, C>(store.as_ref(), &codec, &load_key).await? {
                    debug!(key = %load_key, "Cache filled while waiting for load ticket");
                    return Ok(value);
                }

                counters.loads.fetch_add(1, Ordering::Relaxed);
                debug!(key = %load_key, "Loading value (stampede protected)");
                let value = match loader().await {
                    Ok(value) => value,
                    Err(err) => {
                        counters.load_errors.fetch_add(1, Ordering::Relaxed);
                        return Err(CacheError::loader(err));
                    }
                };

                // 4. Write back. A store failure here is not fatal: the caller has its value.
                let bytes = codec.serialize(&value).map_err(|err| {
                    CacheError::codec(err.context(format!(
                        "Failed to serialize type {} for caching",
                        std::any::type_name::<T>()
                    )))
                })?;
                if let Err(err) = store.set(&load_key, &bytes, ttl).await {
                    warn!(key = %load_key, error = %err, "Failed to cache loaded value");
                } else {
                    debug!(key = %load_key, ttl_secs = ttl.as_secs(), "Cached loaded value");
                }
                Ok(value)
            })
            .await
    }

    /// Get cache statistics
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> TypedCacheStats {
        let requests = self.counters.requests.load(Ordering::Relaxed);
        let hits = self.counters.hits.load(Ordering::Relaxed);

        TypedCacheStats {
            requests,
            hits,
            misses: self.counters.misses.load(Ordering::Relaxed),
            hit_rate: if requests > 0 {
                (hits as f64 / requests as f64) * 100.0
            } else {
                0.0
            },
            loads: self.counters.loads.load(Ordering::Relaxed),
            load_errors: self.counters.load_errors.load(Ordering::Relaxed),
            coalesced: self.flight.coalesced(),
            in_flight: self.flight.in_flight(),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }
}

async fn read_entry<T, C>(store: &dyn CacheStore, codec: &C, key: &str) -> CacheResult<Option<T>>
where
    T: DeserializeOwned,
    C: CacheCodec,
{
    let Some(bytes) = store.get(key).await.map_err(CacheError::store)? else {
        return Ok(None);
    };
    codec
        .deserialize::<T>(&bytes)
        .map(Some)
        .map_err(|err| {
            CacheError::codec(err.context(format!("Failed to decode cached entry {key}")))
        })
}
