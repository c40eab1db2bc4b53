//! Hashed-key cache with TTL, value obfuscation and rotation-safe access
//!
//! All mutations from `write` go through a [`WriteSerializer`], so they are
//! applied strictly in submission order. Reads are not queued; they only
//! wait for the pause gate.
//!
//! # Pause gate
//!
//! The gate is an async read/write lock. `read`, `write`, `delete` and TTL
//! expiry hold a shared guard while they touch the map or the key; key
//! rotation and [`HashedKeyCache::destroy`] hold the exclusive guard. Waiters
//! are woken by the lock itself the moment the exclusive holder finishes.
//!
//! # Rotation
//!
//! The cache registers itself on the engine's `key_rotated` event:
//!
//! 1. before: close the gate, wait for every accepted write to be applied,
//!    then decode each obfuscated entry with the outgoing key
//! 2. the engine installs the new key
//! 3. after: re-encode the snapshot with the new key, swap it in as the
//!    live map and reopen the gate
//!
//! Callers therefore never see a map holding ciphertext from two keys.
//!
//! Hooks registered by callers must not call back into `read`/`write` of a
//! cache bound to the same engine: they can run while the gate is closed.

pub mod entry;

pub use entry::{CacheEntry, Ttl, checksum, hash_key};

use crate::config::{CacheConfig, ConfigError};
use crate::metrics::{CacheMetrics, MetricsSnapshot};
use crate::obfuscation::{EngineEvent, HookError, ObfuscationEngine, ObfuscationError};
use crate::queue::QueueError;
use crate::serializer::{JobError, SerializerError, WriteSerializer};
use crate::value::{CacheValue, ValueError, ValueType};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OwnedRwLockWriteGuard;
use tracing::{debug, info, warn};

/// Errors surfaced to cache callers
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("value cannot be cached: {0}")]
    NonCachableValue(&'static str),

    #[error("stored value is corrupt: {0}")]
    Value(ValueError),

    #[error(transparent)]
    Obfuscation(#[from] ObfuscationError),

    #[error("write rejected: {0}")]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no Tokio runtime available to apply writes")]
    NoRuntime,
}

impl From<SerializerError> for CacheError {
    fn from(error: SerializerError) -> Self {
        match error {
            SerializerError::Queue(queue) => CacheError::Queue(queue),
            SerializerError::NoRuntime => CacheError::NoRuntime,
        }
    }
}

impl From<ValueError> for CacheError {
    fn from(error: ValueError) -> Self {
        match error {
            ValueError::NonCachable(reason) => CacheError::NonCachableValue(reason),
            other => CacheError::Value(other),
        }
    }
}

impl From<Infallible> for CacheError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// A write accepted by `write` and waiting in the serializer
struct PendingWrite {
    hashed_key: u64,
    checksum: String,
    value: String,
    value_type: ValueType,
    ttl: Ttl,
    is_obfuscated: bool,
}

/// An entry captured before rotation, decoded when it was obfuscated
struct SnapshotEntry {
    entry: CacheEntry,
    plaintext: Option<CacheValue>,
}

/// State held between the before and after `key_rotated` hooks
struct RotationWindow {
    gate: OwnedRwLockWriteGuard<()>,
    snapshot: Vec<SnapshotEntry>,
}

struct CacheInner {
    hash_seed: u64,
    entries: RwLock<HashMap<u64, CacheEntry>>,
    serializer: WriteSerializer,
    engine: ObfuscationEngine,
    gate: Arc<tokio::sync::RwLock<()>>,
    paused: AtomicBool,
    rotation: Mutex<Option<RotationWindow>>,
    next_stamp: AtomicU64,
    metrics: CacheMetrics,
}

/// In-process key/value cache keyed by a seeded string hash
///
/// `HashedKeyCache` is a cheap, cloneable handle. Build one at startup and
/// pass clones to every component that needs it; independent instances
/// are fully isolated from each other.
#[derive(Clone)]
pub struct HashedKeyCache {
    inner: Arc<CacheInner>,
}

impl HashedKeyCache {
    /// Build a cache with its own obfuscation engine
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let engine = ObfuscationEngine::with_rotation_period(config.rotation_period)?;
        Self::with_engine(config, engine)
    }

    /// Build a cache from `CACHEKIT_*` environment variables
    pub fn from_env() -> Result<Self, CacheError> {
        Self::new(CacheConfig::from_env()?)
    }

    /// Build a cache on top of an existing engine
    ///
    /// The engine's own rotation period is left untouched.
    pub fn with_engine(config: CacheConfig, engine: ObfuscationEngine) -> Result<Self, CacheError> {
        config.validate()?;

        let inner = Arc::new(CacheInner {
            hash_seed: config.hash_seed,
            entries: RwLock::new(HashMap::new()),
            serializer: WriteSerializer::new(config.queue_capacity)?,
            engine,
            gate: Arc::new(tokio::sync::RwLock::new(())),
            paused: AtomicBool::new(false),
            rotation: Mutex::new(None),
            next_stamp: AtomicU64::new(0),
            metrics: CacheMetrics::new(),
        });
        CacheInner::register_rotation_hooks(&inner);

        Ok(Self { inner })
    }

    /// Look up `key`, decoding obfuscated values
    ///
    /// Returns `None` when nothing is stored for the key, including when its
    /// bucket holds a different key.
    pub async fn read(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        let _admit = self.inner.gate.read().await;
        self.inner.lookup(key)
    }

    /// Queue a write of `value` under `key`
    ///
    /// Resolves once the write is accepted by the serializer, not once it is
    /// applied; use [`flush`](Self::flush) to wait for application. When
    /// `obfuscate` is set the value is encoded before it is queued.
    pub async fn write<V>(
        &self,
        key: &str,
        value: V,
        ttl: Ttl,
        obfuscate: bool,
    ) -> Result<(), CacheError>
    where
        V: TryInto<CacheValue>,
        CacheError: From<V::Error>,
    {
        let value: CacheValue = value.try_into()?;
        value.validate()?;

        let _admit = self.inner.gate.read().await;

        let value_type = value.value_type();
        let stored = if obfuscate {
            self.inner.engine.encode(&value).await?
        } else {
            value.serialize()?
        };

        let write = PendingWrite {
            hashed_key: hash_key(key, self.inner.hash_seed),
            checksum: checksum(key),
            value: stored,
            value_type,
            ttl,
            is_obfuscated: obfuscate,
        };

        let inner = Arc::clone(&self.inner);
        self.inner.serializer.enqueue(move || async move {
            inner.apply_write(write);
            Ok::<_, JobError>(())
        })?;
        Ok(())
    }

    /// Whether a live entry exists for `key`; does not wait for the gate
    pub fn has(&self, key: &str) -> bool {
        let hashed_key = hash_key(key, self.inner.hash_seed);
        let checksum = checksum(key);
        self.inner
            .read_entries()
            .get(&hashed_key)
            .is_some_and(|entry| entry.checksum == checksum)
    }

    /// Remove the entry for `key`, returning whether one was removed
    pub async fn delete(&self, key: &str) -> bool {
        let _admit = self.inner.gate.read().await;

        let hashed_key = hash_key(key, self.inner.hash_seed);
        let checksum = checksum(key);
        let mut entries = self.inner.write_entries();
        let owned = entries
            .get(&hashed_key)
            .is_some_and(|entry| entry.checksum == checksum);
        if owned {
            entries.remove(&hashed_key);
            drop(entries);
            self.inner.metrics.record_delete();
            debug!(hashed_key, "entry deleted");
        }
        owned
    }

    /// Remove every entry, holding the gate closed while doing so
    pub async fn destroy(&self) {
        let _gate = self.inner.gate.write().await;
        self.inner.paused.store(true, Ordering::SeqCst);
        let cleared = self.inner.clear_entries();
        self.inner.paused.store(false, Ordering::SeqCst);
        info!(cleared, "cache destroyed");
    }

    /// Wait until every write accepted before this call has been applied
    pub async fn flush(&self) -> Result<(), CacheError> {
        self.inner.serializer.flush().await?;
        Ok(())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.inner.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read_entries().is_empty()
    }

    /// Writes accepted but not yet applied
    pub fn pending_writes(&self) -> usize {
        self.inner.serializer.len()
    }

    /// Whether a rotation (or `destroy`) currently holds the gate closed
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// The engine encoding this cache's values
    pub fn engine(&self) -> &ObfuscationEngine {
        &self.inner.engine
    }
}

impl std::fmt::Debug for HashedKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashedKeyCache")
            .field("entries", &self.len())
            .field("pending_writes", &self.pending_writes())
            .field("paused", &self.is_paused())
            .field("engine", &self.inner.engine)
            .finish()
    }
}

impl CacheInner {
    fn register_rotation_hooks(inner: &Arc<Self>) {
        let cache = Arc::downgrade(inner);
        inner.engine.before(EngineEvent::KeyRotated, move |_| {
            let cache = Weak::clone(&cache);
            async move {
                if let Some(inner) = cache.upgrade() {
                    inner.begin_rotation().await;
                }
                Ok::<_, HookError>(())
            }
        });

        let cache = Arc::downgrade(inner);
        inner.engine.after(EngineEvent::KeyRotated, move |ctx| {
            let cache = Weak::clone(&cache);
            async move {
                if let Some(inner) = cache.upgrade() {
                    inner.finish_rotation(ctx.generation).await;
                }
                Ok::<_, HookError>(())
            }
        });
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<u64, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<u64, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        let hashed_key = hash_key(key, self.hash_seed);
        let checksum = checksum(key);

        let stored = self
            .read_entries()
            .get(&hashed_key)
            .filter(|entry| entry.checksum == checksum)
            .map(|entry| (entry.value.clone(), entry.value_type, entry.is_obfuscated));

        let Some((raw, value_type, is_obfuscated)) = stored else {
            self.metrics.record_miss();
            return Ok(None);
        };
        self.metrics.record_hit();

        let value = if is_obfuscated {
            self.engine.decode(&raw)?
        } else {
            CacheValue::deserialize(&raw, value_type)?
        };
        Ok(Some(value))
    }

    /// Serializer job body: store the write or resolve a bucket collision
    fn apply_write(self: &Arc<Self>, write: PendingWrite) {
        let mut entries = self.write_entries();

        let collides = entries
            .get(&write.hashed_key)
            .is_some_and(|existing| existing.checksum != write.checksum);
        if collides {
            // First writer keeps the bucket until it is gone; the new value
            // is dropped and the old one evicted so neither key is served.
            entries.remove(&write.hashed_key);
            drop(entries);
            self.metrics.record_collision();
            warn!(
                hashed_key = write.hashed_key,
                "hash collision between distinct keys; evicted existing entry and dropped write"
            );
            return;
        }

        let stamp = self.next_stamp.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            write.hashed_key,
            CacheEntry {
                hashed_key: write.hashed_key,
                checksum: write.checksum,
                value: write.value,
                value_type: write.value_type,
                expires_on: write.ttl,
                is_obfuscated: write.is_obfuscated,
                stamp,
            },
        );
        drop(entries);

        self.metrics.record_write();
        debug!(
            hashed_key = write.hashed_key,
            obfuscated = write.is_obfuscated,
            "write applied"
        );

        if let Ttl::After(ttl) = write.ttl {
            self.schedule_expiry(write.hashed_key, stamp, ttl);
        }
    }

    fn schedule_expiry(self: &Arc<Self>, hashed_key: u64, stamp: u64, ttl: Duration) {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(inner) = cache.upgrade() else {
                return;
            };
            let _admit = inner.gate.read().await;
            inner.expire(hashed_key, stamp);
        });
    }

    fn expire(&self, hashed_key: u64, stamp: u64) {
        let mut entries = self.write_entries();
        let current = entries
            .get(&hashed_key)
            .is_some_and(|entry| entry.stamp == stamp);
        if current {
            entries.remove(&hashed_key);
            drop(entries);
            self.metrics.record_expiration();
            debug!(hashed_key, "entry expired");
        }
    }

    fn clear_entries(&self) -> usize {
        let mut entries = self.write_entries();
        let cleared = entries.len();
        entries.clear();
        cleared
    }

    /// Before `key_rotated`: close the gate and decode everything
    async fn begin_rotation(&self) {
        let gate = Arc::clone(&self.gate).write_owned().await;
        self.paused.store(true, Ordering::SeqCst);

        // Writers are locked out now, so once the serializer is idle every
        // queued old-key ciphertext has reached the map.
        self.serializer.wait_idle().await;

        let snapshot = self.snapshot_entries();
        debug!(entries = snapshot.len(), "cache snapshot taken for rotation");
        self.park_rotation(RotationWindow { gate, snapshot });
    }

    /// After `key_rotated`: re-encode the snapshot and reopen the gate
    async fn finish_rotation(&self, generation: u64) {
        let Some(window) = self.take_rotation() else {
            warn!(generation, "key rotated without a cache snapshot");
            return;
        };
        let RotationWindow { gate, snapshot } = window;

        let mut rebuilt = HashMap::with_capacity(snapshot.len());
        for SnapshotEntry {
            mut entry,
            plaintext,
        } in snapshot
        {
            if let Some(value) = plaintext {
                match self.engine.encode(&value).await {
                    Ok(encoded) => entry.value = encoded,
                    Err(error) => {
                        warn!(
                            hashed_key = entry.hashed_key,
                            error = %error,
                            "dropping entry that could not be re-encoded"
                        );
                        continue;
                    }
                }
            }
            rebuilt.insert(entry.hashed_key, entry);
        }

        let restored = rebuilt.len();
        *self.write_entries() = rebuilt;
        self.metrics.record_rotation();
        self.paused.store(false, Ordering::SeqCst);
        drop(gate);

        info!(generation, restored, "cache re-encoded under rotated key");
    }

    fn snapshot_entries(&self) -> Vec<SnapshotEntry> {
        self.read_entries()
            .values()
            .filter_map(|entry| {
                if !entry.is_obfuscated {
                    return Some(SnapshotEntry {
                        entry: entry.clone(),
                        plaintext: None,
                    });
                }
                match self.engine.decode(&entry.value) {
                    Ok(value) => Some(SnapshotEntry {
                        entry: entry.clone(),
                        plaintext: Some(value),
                    }),
                    Err(error) => {
                        warn!(
                            hashed_key = entry.hashed_key,
                            error = %error,
                            "dropping entry that could not be decoded before rotation"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    fn park_rotation(&self, window: RotationWindow) {
        *self.rotation.lock().unwrap_or_else(PoisonError::into_inner) = Some(window);
    }

    fn take_rotation(&self) -> Option<RotationWindow> {
        self.rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
