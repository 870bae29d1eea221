//! Integration tests for basic typed cache operations
//!
//! Tests set/get/delete, expiry, statistics and health checks against the
//! memory store

mod common;

use common::*;
use std::time::Duration;
use tagged_cache::{CacheError, CacheStrategy};

/// Set then get within the TTL returns the value; after expiry it is gone
#[tokio::test]
async fn test_set_get_then_expiry() {
    let cache = setup_cache_system().await.unwrap();
    let users = cache.typed::<test_data::User>("user").unwrap();
    let alice = test_data::User::new(42);

    users
        .set("info:42", &alice, Duration::from_secs(3600), &[])
        .await
        .unwrap();
    assert_eq!(users.get("info:42", &[]).await.unwrap(), Some(alice.clone()));

    // Overwrite with a short TTL to force expiry
    users
        .set("info:42", &alice, Duration::from_millis(50), &[])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(users.get("info:42", &[]).await.unwrap(), None);
}

/// Test cache miss behavior
#[tokio::test]
async fn test_cache_miss() {
    let cache = setup_cache_system().await.unwrap();
    let users = cache.typed::<test_data::User>("user").unwrap();

    let result = users.get(&test_key("missing"), &[]).await.unwrap();
    assert!(result.is_none(), "Missing key should be Ok(None), not an error");
}

/// Test delete removes the entry
#[tokio::test]
async fn test_delete() {
    let cache = setup_cache_system().await.unwrap();
    let products = cache.typed::<test_data::Product>("product").unwrap();
    let key = test_key("product");

    products
        .set(&key, &test_data::Product::new(3), Duration::ZERO, &["catalog"])
        .await
        .unwrap();
    products.delete(&key, &["catalog"]).await.unwrap();

    assert_eq!(products.get(&key, &["catalog"]).await.unwrap(), None);
    // Deleting again is not an error
    products.delete(&key, &["catalog"]).await.unwrap();
}

/// Namespaces with the same base key never see each other's entries
#[tokio::test]
async fn test_namespace_isolation() {
    let cache = setup_cache_system().await.unwrap();
    let users = cache.typed::<String>("user").unwrap();
    let orders = cache.typed::<String>("order").unwrap();

    users.set("info:1", &"alice".to_string(), Duration::ZERO, &[]).await.unwrap();
    orders.set("info:1", &"order #1".to_string(), Duration::ZERO, &[]).await.unwrap();

    assert_eq!(users.get("info:1", &[]).await.unwrap().as_deref(), Some("alice"));
    assert_eq!(orders.get("info:1", &[]).await.unwrap().as_deref(), Some("order #1"));
}

/// Reserved and empty namespaces are rejected at construction
#[tokio::test]
async fn test_invalid_namespace() {
    let cache = setup_cache_system().await.unwrap();

    for namespace in ["", "__tagver"] {
        match cache.typed::<u32>(namespace) {
            Err(CacheError::InvalidNamespace(ns)) => assert_eq!(ns, namespace),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("namespace '{namespace}' should be rejected"),
        }
    }
}

/// A stored value of another type is a codec error, not a miss
#[tokio::test]
async fn test_type_mismatch_is_codec_error() {
    let cache = setup_cache_system().await.unwrap();
    let as_text = cache.typed::<String>("shared").unwrap();
    let as_user = cache.typed::<test_data::User>("shared").unwrap();

    as_text.set("k", &"plain text".to_string(), Duration::ZERO, &[]).await.unwrap();

    let err = as_user.get("k", &[]).await.unwrap_err();
    assert!(matches!(err, CacheError::Codec(_)), "got {err:?}");
    assert!(err.is_cache_fault());
}

/// Test compute-on-miss pattern
#[tokio::test]
async fn test_load_on_miss_then_hit() {
    let cache = setup_cache_system().await.unwrap();
    let users = cache.typed::<test_data::User>("user").unwrap();
    let key = test_key("load");

    let loaded = users
        .get_or_load(
            &key,
            CacheStrategy::ShortTerm.into(),
            || async { Ok(test_data::User::new(9)) },
            &[],
        )
        .await
        .unwrap();
    assert_eq!(loaded.id, 9);

    let cached = users
        .get_or_load(
            &key,
            CacheStrategy::ShortTerm.into(),
            || async { anyhow::bail!("loader must not run on a hit") },
            &[],
        )
        .await
        .unwrap();
    assert_eq!(cached, loaded);
}

/// Test cache statistics tracking
#[tokio::test]
async fn test_statistics_tracking() {
    let cache = setup_cache_system().await.unwrap();
    let counters = cache.typed::<u64>("counter").unwrap();

    for _ in 0..3 {
        counters
            .get_or_load("total", Duration::ZERO, || async { Ok(7) }, &[])
            .await
            .unwrap();
    }

    assert_cache_stats!(counters, requests == 3);
    assert_cache_stats!(counters, hits == 2);
    assert_cache_stats!(counters, misses == 1);
    assert_cache_stats!(counters, loads == 1);
    assert_cache_stats!(counters, hit_rate > 60.0);
}

/// Test health check functionality
#[tokio::test]
async fn test_health_check() {
    let cache = setup_cache_system().await.unwrap();
    assert!(cache.health_check().await);
}

/// Flushing the system removes entries from every namespace
#[tokio::test]
async fn test_flush_all() {
    let cache = setup_cache_system().await.unwrap();
    let users = cache.typed::<u32>("user").unwrap();
    let orders = cache.typed::<u32>("order").unwrap();

    users.set("a", &1, Duration::ZERO, &["t"]).await.unwrap();
    orders.set("b", &2, Duration::ZERO, &[]).await.unwrap();
    cache.flush_all().await.unwrap();

    assert_eq!(users.get("a", &["t"]).await.unwrap(), None);
    assert_eq!(orders.get("b", &[]).await.unwrap(), None);
}

/// Test different cache strategies
#[tokio::test]
async fn test_cache_strategies() {
    let cache = setup_cache_system().await.unwrap();
    let values = cache.typed::<String>("strategy").unwrap();

    let strategies = [
        CacheStrategy::RealTime,
        CacheStrategy::ShortTerm,
        CacheStrategy::MediumTerm,
        CacheStrategy::LongTerm,
        CacheStrategy::Custom(Duration::from_secs(5)),
        CacheStrategy::Default,
    ];

    for (i, strategy) in strategies.into_iter().enumerate() {
        let key = format!("s{i}");
        values.set(&key, &key, strategy.into(), &[]).await.unwrap();
        assert_eq!(values.get(&key, &[]).await.unwrap(), Some(key));
    }
}

/// A very large TTL caches forever instead of failing
#[tokio::test]
async fn test_very_large_ttl_caches_forever() {
    let cache = setup_cache_system().await.unwrap();
    let users = cache.typed::<u32>("user").unwrap();

    users.set("info:1", &1, Duration::MAX, &[]).await.unwrap();
    assert_eq!(users.get("info:1", &[]).await.unwrap(), Some(1));

    let loaded = users
        .get_or_load("info:2", Duration::from_secs(u64::MAX), || async { Ok(7) }, &[])
        .await
        .unwrap();
    assert_eq!(loaded, 7);
    assert_eq!(users.get("info:2", &[]).await.unwrap(), Some(7));
    assert_cache_stats!(users, load_errors == 0);
}
