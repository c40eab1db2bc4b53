//! Active key state and the rotation schedule
//!
//! Exactly one key is live at a time: the same key encodes and decodes, and
//! rotation swaps it atomically under a write lock. Ciphertext produced
//! under a previous generation is not decodable afterwards, which is why
//! dependents re-encode their data through the `key_rotated` hooks.

use super::core::ObfuscationError;
use ring::rand::{SecureRandom, SystemRandom};
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// Default interval between automatic rotations (90 days)
pub const DEFAULT_ROTATION_PERIOD: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Longest rotation period accepted (50 years)
pub const MAX_ROTATION_PERIOD: Duration = Duration::from_secs(50 * 365 * 24 * 60 * 60);

/// Longest single timer delay; longer periods are waited out in slices
///
/// Mirrors the common 2^31-1 millisecond ceiling of platform timers.
pub const MAX_TIMER_SLICE: Duration = Duration::from_millis(i32::MAX as u64);

/// The live obfuscation key and its generation counter
///
/// Key material is erased on drop. Clone is intentionally not derived.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyState {
    key: [u8; KEY_LEN],
    /// Incremented on every rotation; 0 is the key the engine started with
    #[zeroize(skip)]
    generation: u64,
}

impl KeyState {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key, generation: 0 }
    }

    /// Replace the active key, returning the new generation
    pub fn install(&mut self, key: Zeroizing<[u8; KEY_LEN]>) -> u64 {
        self.key.zeroize();
        self.key = *key;
        self.generation += 1;
        self.generation
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Debug for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyState")
            .field("key", &"<redacted>")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Draw a fresh random 256-bit key
pub fn generate_key(rng: &SystemRandom) -> Result<Zeroizing<[u8; KEY_LEN]>, ObfuscationError> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    rng.fill(&mut key[..])
        .map_err(|_| ObfuscationError::RngFailure)?;
    Ok(key)
}

/// Check a requested rotation period against the accepted range
pub fn validate_rotation_period(period: Duration) -> Result<(), ObfuscationError> {
    if period.is_zero() {
        return Err(ObfuscationError::ZeroRotationPeriod);
    }
    if period > MAX_ROTATION_PERIOD {
        return Err(ObfuscationError::RotationPeriodTooLong {
            requested: period,
            max: MAX_ROTATION_PERIOD,
        });
    }
    Ok(())
}

/// Split `period` into consecutive delays no longer than [`MAX_TIMER_SLICE`]
pub fn timer_slices(period: Duration) -> impl Iterator<Item = Duration> {
    let mut remaining = period;
    std::iter::from_fn(move || {
        if remaining.is_zero() {
            return None;
        }
        let slice = remaining.min(MAX_TIMER_SLICE);
        remaining -= slice;
        Some(slice)
    })
}

/// Sleep for the whole of `period` by chaining bounded delays
pub async fn sleep_chained(period: Duration) {
    for slice in timer_slices(period) {
        tokio::time::sleep(slice).await;
    }
}
