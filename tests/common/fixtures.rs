//! Test fixtures and constants for cachekit-sealed tests.
//!
//! Key material and seeds are fixed so failures reproduce exactly.

use cachekit_sealed::{CacheConfig, CacheValue, HashedKeyCache, ObfuscationEngine};
use serde_json::json;
use std::time::Duration;

// ============================================================================
// Seeds and Key Material
// ============================================================================

/// Hash seed shared by every test cache
pub const TEST_HASH_SEED: u64 = 0x00c0_ffee_5eed;

/// Fixed starting key for engines built by [`test_engine`]
pub const TEST_KEY: [u8; 32] = [
    0x3e, 0x5a, 0x89, 0x7f, 0x2c, 0x1d, 0x4b, 0x91, 0xa2, 0x6f, 0x3c, 0xd4, 0x8e, 0x5b, 0x72, 0x19,
    0xf6, 0x4a, 0x21, 0x98, 0xc7, 0x65, 0x3d, 0xb0, 0x84, 0x59, 0x2e, 0xd1, 0xa6, 0x7b, 0x30, 0xe5,
];

/// Two distinct keys that share a hash bucket (whitespace is ignored by the hash)
pub const COLLIDING_KEYS: (&str, &str) = ("user 1", "user1");

/// Default rotation period used by the rotation tests
pub const ONE_HOUR: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// Builders
// ============================================================================

pub fn test_config() -> CacheConfig {
    CacheConfig::new(TEST_HASH_SEED)
}

/// Cache with default settings; call from inside a Tokio runtime
pub fn test_cache() -> HashedKeyCache {
    HashedKeyCache::new(test_config()).unwrap()
}

/// Cache rotating its key every `period`
pub fn test_cache_rotating_every(period: Duration) -> HashedKeyCache {
    HashedKeyCache::new(test_config().with_rotation_period(period)).unwrap()
}

/// Engine starting from [`TEST_KEY`]
pub fn test_engine(period: Duration) -> ObfuscationEngine {
    ObfuscationEngine::with_key(TEST_KEY, period).unwrap()
}

// ============================================================================
// Sample Values
// ============================================================================

/// One value of every supported type, keyed by a descriptive name
pub fn sample_values() -> Vec<(&'static str, CacheValue)> {
    vec![
        ("string", CacheValue::from("Hello 世界 🚀 Rust")),
        ("empty-string", CacheValue::from("")),
        ("colon-string", CacheValue::from("a:b:c")),
        ("number", CacheValue::Number(-1234.5625)),
        ("integer", CacheValue::from(42)),
        ("boolean", CacheValue::Boolean(false)),
        ("bigint", CacheValue::BigInt(170_141_183_460_469_231_731_687_303_715_884_105_727)),
        (
            "object",
            CacheValue::try_from(json!({"user": {"id": 7, "roles": ["admin"]}, "active": true}))
                .unwrap(),
        ),
        ("array", CacheValue::try_from(json!([1, "two", null, {"three": 3}])).unwrap()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_constants() {
        assert_eq!(TEST_KEY.len(), 32);
        assert_ne!(COLLIDING_KEYS.0, COLLIDING_KEYS.1);
        assert_eq!(
            cachekit_sealed::cache::hash_key(COLLIDING_KEYS.0, TEST_HASH_SEED),
            cachekit_sealed::cache::hash_key(COLLIDING_KEYS.1, TEST_HASH_SEED)
        );
    }

    #[test]
    fn test_sample_values_cover_every_type() {
        let types: std::collections::HashSet<_> = sample_values()
            .iter()
            .map(|(_, value)| value.value_type())
            .collect();
        assert_eq!(types.len(), 6);
    }
}
