//! Cache-Aside Repository Decorator
//!
//! [`CachedRepository`] wraps any [`Repository`] and implements the same
//! trait, so services depend on `Repository` and never know whether they got
//! the plain or the cached one.
//!
//! - **Reads** go through [`TypedCache::get_or_load`]: single-entity reads
//!   under `info:{id}`, list reads under `list:{hash-of-query}`.
//! - **Writes** always hit the wrapped repository first. On success the
//!   entity key is evicted and the whole list prefix is purged. List keys are
//!   derived from arbitrary query parameters, so they cannot be evicted one by
//!   one.
//! - **Cache faults** on reads (store down, undecodable entry) fall back to
//!   the wrapped repository; callers only ever see the repository's errors.
//!   Eviction failures after a successful write are logged, never returned.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::codecs::AnyCodec;
use crate::error::CacheError;
use crate::traits::CacheCodec;
use crate::typed_cache::{CacheStrategy, TypedCache};

/// One page of a list query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<E> {
    pub items: Vec<E>,
    /// Total number of matching rows, across all pages
    pub total: u64,
}

/// Data-access contract shared by the plain and the cached repository
///
/// Reads must be pure functions of their arguments; the cached decorator
/// relies on that to serve them from cache.
#[async_trait]
pub trait Repository: Send + Sync {
    type Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    type Id: Display + Clone + Send + Sync + 'static;
    /// Filter and pagination parameters of a list query
    type Query: Serialize + Clone + Send + Sync + 'static;

    async fn find_by_id(&self, id: &Self::Id) -> anyhow::Result<Option<Self::Entity>>;

    async fn list(&self, query: &Self::Query) -> anyhow::Result<Page<Self::Entity>>;

    async fn create(&self, entity: Self::Entity) -> anyhow::Result<Self::Entity>;

    async fn update(&self, id: &Self::Id, entity: Self::Entity) -> anyhow::Result<Self::Entity>;

    async fn delete(&self, id: &Self::Id) -> anyhow::Result<()>;
}

/// Key and TTL strategy of a [`CachedRepository`]
///
/// Every key returned by `list_key` must start with `list_prefix`, or write
/// invalidation will miss it.
pub trait CacheKeyPolicy: Send + Sync + 'static {
    /// Base key of a single entity
    fn entity_key(&self, id: &dyn Display) -> String;

    /// Base-key prefix shared by every list entry
    fn list_prefix(&self) -> &str;

    /// Base key of a list query
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be serialized.
    fn list_key<Q: Serialize>(&self, query: &Q) -> anyhow::Result<String> {
        Ok(format!("{}{}", self.list_prefix(), canonical_query_hash(query)?))
    }

    fn entity_ttl(&self) -> Duration;

    fn list_ttl(&self) -> Duration;
}

/// `info:{id}` / `list:{sha256}` keys with per-kind TTLs
#[derive(Debug, Clone)]
pub struct DefaultKeyPolicy {
    pub entity_prefix: String,
    pub list_prefix: String,
    pub entity_ttl: Duration,
    pub list_ttl: Duration,
}

impl Default for DefaultKeyPolicy {
    fn default() -> Self {
        Self {
            entity_prefix: "info:".to_string(),
            list_prefix: "list:".to_string(),
            entity_ttl: CacheStrategy::MediumTerm.to_duration(),
            // Lists go stale on every write anywhere in the domain
            list_ttl: CacheStrategy::ShortTerm.to_duration(),
        }
    }
}

impl CacheKeyPolicy for DefaultKeyPolicy {
    fn entity_key(&self, id: &dyn Display) -> String {
        format!("{}{}", self.entity_prefix, id)
    }

    fn list_prefix(&self) -> &str {
        &self.list_prefix
    }

    fn entity_ttl(&self) -> Duration {
        self.entity_ttl
    }

    fn list_ttl(&self) -> Duration {
        self.list_ttl
    }
}

/// Stable hash of a query's parameters
///
/// The query is serialized to JSON with object keys sorted at every level, so
/// two queries with the same field values hash identically no matter how the
/// fields were declared or inserted.
///
/// # Errors
///
/// Returns an error if the query cannot be serialized to JSON.
pub fn canonical_query_hash<Q: Serialize + ?Sized>(query: &Q) -> anyhow::Result<String> {
    let value = serde_json::to_value(query)?;
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical);
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Marks "the repository had no such entity" inside a load, so it is not cached
#[derive(Debug)]
struct Absent;

impl fmt::Display for Absent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("entity not found")
    }
}

impl std::error::Error for Absent {}

fn is_absent(err: &CacheError) -> bool {
    err.loader_error().is_some_and(anyhow::Error::is::<Absent>)
}

/// Cache-aside decorator over a [`Repository`]
pub struct CachedRepository<R: Repository, P = DefaultKeyPolicy, C = AnyCodec> {
    inner: Arc<R>,
    entities: TypedCache<R::Entity, C>,
    lists: TypedCache<Page<R::Entity>, C>,
    policy: P,
}

impl<R, P, C> CachedRepository<R, P, C>
where
    R: Repository + 'static,
    P: CacheKeyPolicy,
    C: CacheCodec + 'static,
{
    /// Compose the decorator from the wrapped repository and its two caches
    ///
    /// `entities` and `lists` normally share one namespace and store; their
    /// keys are kept apart by the policy's prefixes.
    pub fn new(
        inner: Arc<R>,
        entities: TypedCache<R::Entity, C>,
        lists: TypedCache<Page<R::Entity>, C>,
        policy: P,
    ) -> Self {
        Self {
            inner,
            entities,
            lists,
            policy,
        }
    }

    /// The wrapped repository
    #[must_use]
    pub fn inner(&self) -> &Arc<R> {
        &self.inner
    }

    #[must_use]
    pub fn entity_cache(&self) -> &TypedCache<R::Entity, C> {
        &self.entities
    }

    #[must_use]
    pub fn list_cache(&self) -> &TypedCache<Page<R::Entity>, C> {
        &self.lists
    }

    async fn evict_entity(&self, id: &R::Id) {
        let key = self.policy.entity_key(id);
        if let Err(err) = self.entities.delete(&key, &[]).await {
            warn!(
                namespace = %self.entities.namespace(),
                key = %key,
                error = %err,
                "Failed to evict cached entity after write"
            );
        }
    }

    async fn purge_lists(&self) {
        match self.lists.batch_delete_by_prefix(self.policy.list_prefix()).await {
            Ok(count) => {
                debug!(
                    namespace = %self.lists.namespace(),
                    count,
                    "Purged cached lists after write"
                );
            }
            Err(err) => {
                warn!(
                    namespace = %self.lists.namespace(),
                    error = %err,
                    "Failed to purge cached lists after write"
                );
            }
        }
    }
}

#[async_trait]
impl<R, P, C> Repository for CachedRepository<R, P, C>
where
    R: Repository + 'static,
    P: CacheKeyPolicy,
    C: CacheCodec + 'static,
{
    type Entity = R::Entity;
    type Id = R::Id;
    type Query = R::Query;

    async fn find_by_id(&self, id: &Self::Id) -> anyhow::Result<Option<Self::Entity>> {
        let key = self.policy.entity_key(id);
        let inner = Arc::clone(&self.inner);
        let owned_id = id.clone();

        let loaded = self
            .entities
            .get_or_load(
                &key,
                self.policy.entity_ttl(),
                move || async move {
                    inner
                        .find_by_id(&owned_id)
                        .await?
                        .ok_or_else(|| anyhow::Error::new(Absent))
                },
                &[],
            )
            .await;

        match loaded {
            Ok(entity) => Ok(Some(entity)),
            Err(err) if is_absent(&err) => Ok(None),
            Err(err) if err.is_cache_fault() => {
                warn!(key = %key, error = %err, "Cache read failed, falling back to repository");
                let found = self.inner.find_by_id(id).await?;
                if let Some(entity) = &found {
                    let ttl = self.policy.entity_ttl();
                    if let Err(err) = self.entities.set(&key, entity, ttl, &[]).await {
                        debug!(
                            key = %key,
                            error = %err,
                            "Could not repopulate cache after fallback"
                        );
                    }
                }
                Ok(found)
            }
            Err(err) => Err(err.into_anyhow()),
        }
    }

    async fn list(&self, query: &Self::Query) -> anyhow::Result<Page<Self::Entity>> {
        let key = match self.policy.list_key(query) {
            Ok(key) => key,
            Err(err) => {
                warn!(error = %err, "Cannot derive list cache key, bypassing cache");
                return self.inner.list(query).await;
            }
        };
        let inner = Arc::clone(&self.inner);
        let owned_query = query.clone();

        let loaded = self
            .lists
            .get_or_load(
                &key,
                self.policy.list_ttl(),
                move || async move { inner.list(&owned_query).await },
                &[],
            )
            .await;

        match loaded {
            Ok(page) => Ok(page),
            Err(err) if err.is_cache_fault() => {
                warn!(key = %key, error = %err, "Cache read failed, falling back to repository");
                let page = self.inner.list(query).await?;
                if let Err(err) = self.lists.set(&key, &page, self.policy.list_ttl(), &[]).await {
                    debug!(key = %key, error = %err, "Could not repopulate cache after fallback");
                }
                Ok(page)
            }
            Err(err) => Err(err.into_anyhow()),
        }
    }

    async fn create(&self, entity: Self::Entity) -> anyhow::Result<Self::Entity> {
        let created = self.inner.create(entity).await?;
        self.purge_lists().await;
        Ok(created)
    }

    async fn update(&self, id: &Self::Id, entity: Self::Entity) -> anyhow::Result<Self::Entity> {
        let updated = self.inner.update(id, entity).await?;
        self.evict_entity(id).await;
        self.purge_lists().await;
        Ok(updated)
    }

    async fn delete(&self, id: &Self::Id) -> anyhow::Result<()> {
        self.inner.delete(id).await?;
        self.evict_entity(id).await;
        self.purge_lists().await;
        Ok(())
    }
}
