//! # cachekit-sealed
//!
//! In-process key/value cache with seeded key hashing, per-entry TTL and
//! optional AES-256-GCM obfuscation of stored values under a key that
//! rotates on a schedule.
//!
//! Writes are funnelled through a bounded FIFO and applied one at a time in
//! submission order. Key rotation briefly closes the cache, re-encodes every
//! obfuscated entry under the new key and reopens it, so readers never see
//! a value they cannot decode.
//!
//! ## Configuration
//!
//! | Variable | Description | Default |
//! |:---------|:------------|:-------:|
//! | `CACHEKIT_HASH_SEED` | Seed for the key hash | required |
//! | `CACHEKIT_KEY_ROTATION_SECS` | Seconds between key rotations | 90 days |
//! | `CACHEKIT_WRITE_QUEUE_CAPACITY` | Maximum pending writes | 5000 |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cachekit_sealed::{CacheConfig, CacheValue, HashedKeyCache, Ttl};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), cachekit_sealed::CacheError> {
//! let cache = HashedKeyCache::new(CacheConfig::new(0x5eed))?;
//!
//! cache.write("session:42", "token", Ttl::After(Duration::from_secs(60)), true).await?;
//! cache.flush().await?;
//!
//! assert_eq!(cache.read("session:42").await?, Some(CacheValue::from("token")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! - **AES-256-GCM**: Authenticated encryption via `ring`, fresh random IV per value
//! - **Type binding**: The value type tag is authenticated alongside the ciphertext
//! - **SHA-256 checksums**: Distinct keys sharing a hash bucket are never confused
//! - **Memory safety**: `zeroize` on drop for all key material

// Configuration
pub mod config;
pub use config::{CacheConfig, ConfigError};

// Metrics and observability
pub mod metrics;
pub use metrics::MetricsSnapshot;

// Write path
pub mod queue;
pub use queue::{BoundedFifoQueue, QueueError};

pub mod serializer;
pub use serializer::{JobError, JobResult, SerializerError, WriteSerializer};

// Values and obfuscation
pub mod value;
pub use value::{CacheValue, ValueError, ValueType};

pub mod obfuscation;
pub use obfuscation::{
    EngineEvent, HookContext, HookError, HookPhase, ObfuscationEngine, ObfuscationError,
};

// Cache
pub mod cache;
pub use cache::{CacheEntry, CacheError, HashedKeyCache, Ttl};
