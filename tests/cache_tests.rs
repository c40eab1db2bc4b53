//! End-to-end behaviour of `HashedKeyCache`
//!
//! Covers the read/write contract for plain and obfuscated values, TTL
//! expiry, hash-bucket collisions, rejection of non-cachable values and
//! instance isolation.

mod common;

use cachekit_sealed::{CacheError, CacheValue, HashedKeyCache, Ttl};
use common::capture_logs;
use common::fixtures::*;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_roundtrip_every_type_plain_and_obfuscated() {
    let cache = test_cache();

    for obfuscate in [false, true] {
        for (name, value) in sample_values() {
            let key = format!("{name}:{obfuscate}");
            cache
                .write(&key, value.clone(), Ttl::Never, obfuscate)
                .await
                .unwrap();
        }
    }
    cache.flush().await.unwrap();

    for obfuscate in [false, true] {
        for (name, value) in sample_values() {
            let key = format!("{name}:{obfuscate}");
            assert_eq!(
                cache.read(&key).await.unwrap(),
                Some(value),
                "roundtrip failed for {key}"
            );
        }
    }
    assert_eq!(cache.len(), sample_values().len() * 2);
}

#[tokio::test]
async fn test_numeric_string_keeps_string_type() {
    let cache = test_cache();
    cache.write("n", "42", Ttl::Never, false).await.unwrap();
    cache.write("m", 42, Ttl::Never, true).await.unwrap();
    cache.flush().await.unwrap();

    assert_eq!(cache.read("n").await.unwrap(), Some(CacheValue::from("42")));
    assert_eq!(cache.read("m").await.unwrap(), Some(CacheValue::Number(42.0)));
}

#[tokio::test]
async fn test_read_missing_key() {
    let cache = test_cache();
    assert_eq!(cache.read("absent").await.unwrap(), None);
    assert!(!cache.has("absent"));
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let cache = test_cache();
    cache
        .write("session", "token", Ttl::After(Duration::from_millis(100)), true)
        .await
        .unwrap();
    cache.flush().await.unwrap();
    assert!(cache.has("session"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cache.has("session"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!cache.has("session"));
    assert_eq!(cache.read("session").await.unwrap(), None);
    assert_eq!(cache.metrics().expirations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_entry_without_ttl_persists() {
    let cache = test_cache();
    cache.write("config", true, Ttl::Never, false).await.unwrap();
    cache.flush().await.unwrap();

    tokio::time::sleep(Duration::from_secs(30 * 24 * 60 * 60)).await;
    assert_eq!(
        cache.read("config").await.unwrap(),
        Some(CacheValue::Boolean(true))
    );
}

#[tokio::test]
async fn test_collision_evicts_both_keys() {
    let (logs, _guard) = capture_logs();
    let cache = test_cache();
    let (first, second) = COLLIDING_KEYS;

    cache.write(first, "A", Ttl::Never, false).await.unwrap();
    cache.write(second, "B", Ttl::Never, false).await.unwrap();
    cache.flush().await.unwrap();

    assert!(!cache.has(first));
    assert!(!cache.has(second));
    assert_eq!(cache.read(first).await.unwrap(), None);
    assert_eq!(cache.read(second).await.unwrap(), None);
    assert_eq!(cache.metrics().collisions, 1);
    assert!(
        logs.contents().contains("hash collision"),
        "collision warning not logged: {}",
        logs.contents()
    );
}

#[tokio::test]
async fn test_bucket_reusable_after_collision() {
    let cache = test_cache();
    let (first, second) = COLLIDING_KEYS;

    cache.write(first, "A", Ttl::Never, false).await.unwrap();
    cache.write(second, "B", Ttl::Never, false).await.unwrap();
    cache.write(second, "B again", Ttl::Never, false).await.unwrap();
    cache.flush().await.unwrap();

    assert_eq!(
        cache.read(second).await.unwrap(),
        Some(CacheValue::from("B again"))
    );
    assert!(!cache.has(first));
}

#[tokio::test]
async fn test_non_cachable_values_rejected_up_front() {
    let cache = test_cache();

    let null = cache.write("k", json!(null), Ttl::Never, false).await;
    let nan = cache.write("k", f64::NAN, Ttl::Never, true).await;
    let infinite = cache.write("k", f64::INFINITY, Ttl::Never, false).await;

    for result in [null, nan, infinite] {
        assert!(matches!(result, Err(CacheError::NonCachableValue(_))));
    }
    assert_eq!(cache.pending_writes(), 0);
    cache.flush().await.unwrap();
    assert!(cache.is_empty());
    assert_eq!(cache.metrics().writes_applied, 0);
}

#[tokio::test]
async fn test_last_write_wins() {
    let cache = test_cache();
    for i in 0..100 {
        cache.write("counter", i, Ttl::Never, i % 3 == 0).await.unwrap();
    }
    cache.flush().await.unwrap();

    assert_eq!(
        cache.read("counter").await.unwrap(),
        Some(CacheValue::Number(99.0))
    );
    assert_eq!(cache.metrics().writes_applied, 100);
}

#[tokio::test]
async fn test_delete_and_destroy() {
    let cache = test_cache();
    for (name, value) in sample_values() {
        cache.write(name, value, Ttl::Never, true).await.unwrap();
    }
    cache.flush().await.unwrap();

    assert!(cache.delete("string").await);
    assert!(!cache.has("string"));
    assert_eq!(cache.len(), sample_values().len() - 1);

    cache.destroy().await;
    assert!(cache.is_empty());
    assert_eq!(cache.read("number").await.unwrap(), None);

    cache.write("after", "destroy", Ttl::Never, false).await.unwrap();
    cache.flush().await.unwrap();
    assert!(cache.has("after"));
}

#[tokio::test]
async fn test_instances_are_isolated() {
    let left = test_cache();
    let right = test_cache();

    left.write("shared-name", "left", Ttl::Never, true).await.unwrap();
    left.flush().await.unwrap();

    assert!(left.has("shared-name"));
    assert!(!right.has("shared-name"));
    right.engine().rotate_key().await.unwrap();
    assert_eq!(left.engine().generation(), 0);
    assert_eq!(
        left.read("shared-name").await.unwrap(),
        Some(CacheValue::from("left"))
    );
}

#[tokio::test]
async fn test_different_seeds_route_keys_differently() {
    let seeded = HashedKeyCache::new(test_config()).unwrap();
    let other = HashedKeyCache::new(cachekit_sealed::CacheConfig::new(TEST_HASH_SEED + 1)).unwrap();

    assert_ne!(
        cachekit_sealed::cache::hash_key("k", TEST_HASH_SEED),
        cachekit_sealed::cache::hash_key("k", TEST_HASH_SEED + 1)
    );

    seeded.write("k", 1, Ttl::Never, false).await.unwrap();
    other.write("k", 2, Ttl::Never, false).await.unwrap();
    seeded.flush().await.unwrap();
    other.flush().await.unwrap();

    assert_eq!(seeded.read("k").await.unwrap(), Some(CacheValue::Number(1.0)));
    assert_eq!(other.read("k").await.unwrap(), Some(CacheValue::Number(2.0)));
}

#[tokio::test]
async fn test_shared_engine_across_caches() {
    let engine = test_engine(ONE_HOUR);
    let first = HashedKeyCache::with_engine(test_config(), engine.clone()).unwrap();
    let second = HashedKeyCache::with_engine(test_config(), engine.clone()).unwrap();

    first.write("a", "one", Ttl::Never, true).await.unwrap();
    second.write("b", "two", Ttl::Never, true).await.unwrap();
    first.flush().await.unwrap();
    second.flush().await.unwrap();

    engine.rotate_key().await.unwrap();

    assert_eq!(first.read("a").await.unwrap(), Some(CacheValue::from("one")));
    assert_eq!(second.read("b").await.unwrap(), Some(CacheValue::from("two")));
}

#[tokio::test]
async fn test_zero_queue_capacity_rejected() {
    let result = HashedKeyCache::new(test_config().with_queue_capacity(0));
    assert!(matches!(result, Err(CacheError::Config(_))));
}
