//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - Cache system setup (memory, and Redis when available)
//! - Test data generators
//! - An in-memory repository with call counters

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Once;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tagged_cache::{BackendKind, CacheConfig, CacheSystem, CacheSystemBuilder, Page, Repository};

use test_data::User;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Get Redis URL from environment or use default
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Generate a unique key prefix to avoid conflicts between test runs
pub fn test_key_prefix() -> String {
    format!("test:{}:", rand::random::<u32>())
}

/// Create a test key with unique suffix
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Initialize a memory-backed cache system for testing
pub async fn setup_cache_system() -> Result<CacheSystem> {
    init_tracing();
    CacheSystemBuilder::new()
        .with_default_ttl(Duration::from_secs(60))
        .build()
        .await
}

/// Initialize a Redis-backed cache system under a unique key prefix
pub async fn setup_redis_cache_system() -> Result<CacheSystem> {
    init_tracing();
    let config = CacheConfig {
        backend: BackendKind::Redis,
        redis_url: Some(redis_url()),
        key_prefix: test_key_prefix(),
        scan_batch_size: 10,
        ..CacheConfig::default()
    };
    CacheSystemBuilder::from_config(config).build().await
}

/// Generate test data of various types
pub mod test_data {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct User {
        pub id: u64,
        pub name: String,
        pub email: String,
    }

    impl User {
        pub fn new(id: u64) -> Self {
            Self {
                id,
                name: format!("User {}", id),
                email: format!("user{}@example.com", id),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Product {
        pub id: u64,
        pub name: String,
        pub price: f64,
        pub category: String,
    }

    impl Product {
        pub fn new(id: u64) -> Self {
            Self {
                id,
                name: format!("Product {}", id),
                price: 99.99 + (id as f64),
                category: format!("Category {}", id % 5),
            }
        }
    }
}

/// List filter for [`UserRepository`]
#[derive(Debug, Clone, Serialize)]
pub struct UserQuery {
    pub name_contains: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl UserQuery {
    pub fn all() -> Self {
        Self {
            name_contains: None,
            offset: 0,
            limit: 100,
        }
    }
}

/// In-memory source of truth that counts how often it is asked
#[derive(Default)]
pub struct UserRepository {
    rows: Mutex<BTreeMap<u64, User>>,
    next_id: AtomicU64,
    pub find_calls: AtomicU32,
    pub list_calls: AtomicU32,
}

impl UserRepository {
    pub fn seeded(count: u64) -> Self {
        let repo = Self::default();
        {
            let mut rows = repo.rows.lock();
            for id in 1..=count {
                rows.insert(id, User::new(id));
            }
        }
        repo.next_id.store(count, Ordering::SeqCst);
        repo
    }

    pub fn finds(&self) -> u32 {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for UserRepository {
    type Entity = User;
    type Id = u64;
    type Query = UserQuery;

    async fn find_by_id(&self, id: &u64) -> Result<Option<User>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn list(&self, query: &UserQuery) -> Result<Page<User>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.lock();
        let matching: Vec<User> = rows
            .values()
            .filter(|user| {
                query
                    .name_contains
                    .as_deref()
                    .is_none_or(|needle| user.name.contains(needle))
            })
            .cloned()
            .collect();
        let total = matching.len() as u64;
        let items = matching.into_iter().skip(query.offset).take(query.limit).collect();
        Ok(Page { items, total })
    }

    async fn create(&self, mut user: User) -> Result<User> {
        user.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.rows.lock().insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: &u64, mut user: User) -> Result<User> {
        let mut rows = self.rows.lock();
        if !rows.contains_key(id) {
            anyhow::bail!("user {id} does not exist");
        }
        user.id = *id;
        rows.insert(*id, user.clone());
        Ok(user)
    }

    async fn delete(&self, id: &u64) -> Result<()> {
        self.rows.lock().remove(id);
        Ok(())
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    use tokio::time::sleep;

    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }

    false
}

/// Assert that typed cache stats meet expectations
#[macro_export]
macro_rules! assert_cache_stats {
    ($cache:expr, $field:ident > $value:expr) => {
        let stats = $cache.stats();
        assert!(
            stats.$field > $value,
            "Expected {} > {}, got {}",
            stringify!($field),
            $value,
            stats.$field
        );
    };
    ($cache:expr, $field:ident == $value:expr) => {
        let stats = $cache.stats();
        assert_eq!(
            stats.$field,
            $value,
            "Expected {} == {}, got {}",
            stringify!($field),
            $value,
            stats.$field
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let key1 = test_key("user");
        let key2 = test_key("user");
        assert_ne!(key1, key2, "Keys should be unique");
        assert!(key1.starts_with("test_user_"));
    }

    #[test]
    fn test_data_generation() {
        let user = test_data::User::new(123);
        assert_eq!(user.id, 123);
        assert_eq!(user.name, "User 123");
        assert_eq!(user.email, "user123@example.com");
    }

    #[tokio::test]
    async fn test_repository_pagination() {
        let repo = UserRepository::seeded(5);
        let page = repo
            .list(&UserQuery {
                name_contains: None,
                offset: 1,
                limit: 2,
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.iter().map(|u| u.id).collect::<Vec<_>>(), vec![2, 3]);
    }
}
