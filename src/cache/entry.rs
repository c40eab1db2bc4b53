//! Stored entries and key derivation
//!
//! Entries are indexed by a seeded xxHash3-64 of the key with all
//! whitespace removed. That hash is fast but not collision-free, so every
//! entry also carries a SHA-256 checksum of the untouched key; a mismatch
//! means two different keys landed in the same bucket.

use crate::value::ValueType;
use sha2::{Digest, Sha256};
use std::time::Duration;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Time-to-live of a cache entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ttl {
    /// Lives as long as the cache does
    #[default]
    Never,
    /// Removed once the duration has elapsed after the write is applied
    After(Duration),
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::After(duration)
    }
}

/// One stored value, indexed by its hashed key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub hashed_key: u64,
    /// Hex SHA-256 of the original key
    pub checksum: String,
    /// Ciphertext when `is_obfuscated`, otherwise the plain serialization
    pub value: String,
    pub value_type: ValueType,
    pub expires_on: Ttl,
    pub is_obfuscated: bool,
    /// Identifies the write that produced this entry, so an expiry timer
    /// from an earlier write never removes a later one
    pub(crate) stamp: u64,
}

/// Derive the bucket index for `key`
pub fn hash_key(key: &str, seed: u64) -> u64 {
    let stripped: String = key.chars().filter(|c| !c.is_whitespace()).collect();
    xxh3_64_with_seed(stripped.as_bytes(), seed)
}

/// Hex SHA-256 of the original key, used only to tell keys apart
pub fn checksum(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
