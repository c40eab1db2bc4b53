//! Observability metrics for cache operations
//!
//! Counters are updated lock-free on the hot paths; [`CacheMetrics::snapshot`]
//! produces a serializable point-in-time copy for export.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a cache instance
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    writes_applied: AtomicU64,
    collisions: AtomicU64,
    expirations: AtomicU64,
    deletes: AtomicU64,
    rotations: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes_applied: self.writes_applied.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CacheMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Reads that found a live entry
    pub hits: u64,
    /// Reads that found nothing (or a different key in the same bucket)
    pub misses: u64,
    /// Writes stored by the serializer
    pub writes_applied: u64,
    /// Writes dropped because another key occupied the hash bucket
    pub collisions: u64,
    /// Entries removed by their TTL timer
    pub expirations: u64,
    /// Entries removed by `delete`
    pub deletes: u64,
    /// Completed key rotations
    pub rotations: u64,
}

impl MetricsSnapshot {
    /// Fraction of reads that hit (1.0 when there were no reads)
    pub fn hit_ratio(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            return 1.0;
        }
        self.hits as f64 / reads as f64
    }
}
