//! Cache configuration
//!
//! The hash seed has no default: a cache without one refuses to start.
//! Everything else falls back to the documented defaults.
//!
//! | Variable | Meaning | Default |
//! |:---------|:--------|:-------:|
//! | `CACHEKIT_HASH_SEED` | u64 seed for the key hash | required |
//! | `CACHEKIT_KEY_ROTATION_SECS` | seconds between key rotations | 90 days |
//! | `CACHEKIT_WRITE_QUEUE_CAPACITY` | max pending writes | 5000 |

use crate::obfuscation::key_rotation::{DEFAULT_ROTATION_PERIOD, MAX_ROTATION_PERIOD};
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const HASH_SEED_VAR: &str = "CACHEKIT_HASH_SEED";
pub const ROTATION_SECS_VAR: &str = "CACHEKIT_KEY_ROTATION_SECS";
pub const QUEUE_CAPACITY_VAR: &str = "CACHEKIT_WRITE_QUEUE_CAPACITY";

/// Default bound on pending writes
pub const DEFAULT_QUEUE_CAPACITY: usize = 5000;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CACHEKIT_HASH_SEED is not set; the cache cannot hash keys without a seed")]
    MissingHashSeed,

    #[error("CACHEKIT_HASH_SEED must be an unsigned 64-bit integer, got {0:?}")]
    InvalidHashSeed(String),

    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("write queue capacity must be greater than zero")]
    ZeroQueueCapacity,

    #[error("rotation period must be greater than zero")]
    ZeroRotationPeriod,

    #[error("rotation period {requested:?} exceeds the maximum of {max:?}")]
    RotationPeriodTooLong { requested: Duration, max: Duration },
}

/// Runtime settings for a [`HashedKeyCache`](crate::HashedKeyCache)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub hash_seed: u64,
    pub rotation_period: Duration,
    pub queue_capacity: usize,
}

impl CacheConfig {
    /// Defaults with the given hash seed
    pub fn new(hash_seed: u64) -> Self {
        Self {
            hash_seed,
            rotation_period: DEFAULT_ROTATION_PERIOD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_seed = lookup(HASH_SEED_VAR).ok_or(ConfigError::MissingHashSeed)?;
        let hash_seed = raw_seed
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidHashSeed(raw_seed.clone()))?;

        let mut config = Self::new(hash_seed);
        if let Some(secs) = parse_optional(&lookup, ROTATION_SECS_VAR)? {
            config.rotation_period = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_optional(&lookup, QUEUE_CAPACITY_VAR)? {
            config.queue_capacity = usize::try_from(capacity).map_err(|_| {
                ConfigError::InvalidNumber {
                    var: QUEUE_CAPACITY_VAR,
                    value: capacity.to_string(),
                }
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_rotation_period(mut self, period: Duration) -> Self {
        self.rotation_period = period;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.rotation_period.is_zero() {
            return Err(ConfigError::ZeroRotationPeriod);
        }
        if self.rotation_period > MAX_ROTATION_PERIOD {
            return Err(ConfigError::RotationPeriodTooLong {
                requested: self.rotation_period,
                max: MAX_ROTATION_PERIOD,
            });
        }
        Ok(())
    }
}

fn parse_optional<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber { var, value: raw })
        })
        .transpose()
}
