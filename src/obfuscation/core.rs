//! Value obfuscation using AES-256-GCM
//!
//! Encoded format: `iv_hex:ciphertext_hex:value_type`
//! - `iv_hex`: 12-byte nonce drawn fresh from the system RNG per encode
//! - `ciphertext_hex`: sealed payload with the 16-byte authentication tag
//! - `value_type`: the [`ValueType`] tag, also bound as additional
//!   authenticated data so a tampered tag fails authentication
//!
//! The engine owns exactly one live key (see [`KeyState`]). Rotation
//! replaces it under a write lock, wrapped in the `key_rotated` event so
//! dependents can decode their data before the swap and re-encode it after.

use super::hooks::{EngineEvent, HookContext, HookError, HookPhase, HookRegistry};
use super::key_rotation::{
    DEFAULT_ROTATION_PERIOD, KEY_LEN, KeyState, generate_key, sleep_chained,
    validate_rotation_period,
};
use crate::value::{CacheValue, ValueError, ValueType};
use ring::{
    aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey},
    rand::{SecureRandom, SystemRandom},
};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// AES-GCM authentication tag length
const TAG_LEN: usize = 16;

/// Errors that can occur during obfuscation operations
#[derive(Error, Debug)]
pub enum ObfuscationError {
    #[error("Invalid encoded value format: {0}")]
    InvalidFormat(String),

    #[error("Invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Invalid nonce length: expected 12 bytes, got {0}")]
    InvalidNonceLength(usize),

    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("Authentication verification failed")]
    AuthenticationFailed,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Random number generation failed")]
    RngFailure,

    #[error("Decrypted payload is not valid UTF-8")]
    InvalidUtf8,

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("Rotation period must be greater than zero")]
    ZeroRotationPeriod,

    #[error("Rotation period {requested:?} exceeds the maximum of {max:?}")]
    RotationPeriodTooLong { requested: Duration, max: Duration },

    #[error("No Tokio runtime available to schedule key rotation")]
    NoRuntime,

    #[error("Key rotation task did not complete: {0}")]
    RotationTask(String),
}

struct EngineInner {
    key: RwLock<KeyState>,
    rng: SystemRandom,
    hooks: HookRegistry,
    rotation_period: Mutex<Duration>,
    /// Serializes rotations (manual and timer-driven)
    rotation_lock: tokio::sync::Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(timer) = self
            .timer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.abort();
        }
    }
}

/// Symmetric value obfuscation with scheduled key rotation
///
/// Cloning yields another handle onto the same key, hooks and timer. The
/// rotation timer stops once the last handle is dropped.
#[derive(Clone)]
pub struct ObfuscationEngine {
    inner: Arc<EngineInner>,
}

impl ObfuscationEngine {
    /// Create an engine with a random key and the default 90-day rotation
    ///
    /// Must be called from within a Tokio runtime, which drives the timer.
    pub fn new() -> Result<Self, ObfuscationError> {
        Self::with_rotation_period(DEFAULT_ROTATION_PERIOD)
    }

    /// Create an engine with a random key and a custom rotation period
    pub fn with_rotation_period(period: Duration) -> Result<Self, ObfuscationError> {
        let rng = SystemRandom::new();
        let key = generate_key(&rng)?;
        Self::build(*key, rng, period)
    }

    /// Create an engine starting from an explicit key
    pub fn with_key(key: [u8; KEY_LEN], period: Duration) -> Result<Self, ObfuscationError> {
        Self::build(key, SystemRandom::new(), period)
    }

    fn build(
        key: [u8; KEY_LEN],
        rng: SystemRandom,
        period: Duration,
    ) -> Result<Self, ObfuscationError> {
        validate_rotation_period(period)?;
        let runtime = Handle::try_current().map_err(|_| ObfuscationError::NoRuntime)?;

        let engine = Self {
            inner: Arc::new(EngineInner {
                key: RwLock::new(KeyState::new(key)),
                rng,
                hooks: HookRegistry::new(),
                rotation_period: Mutex::new(period),
                rotation_lock: tokio::sync::Mutex::new(()),
                timer: Mutex::new(None),
            }),
        };
        engine.schedule_rotation(&runtime, period);
        Ok(engine)
    }

    /// Generation of the live key (0 until the first rotation)
    pub fn generation(&self) -> u64 {
        self.read_key().generation()
    }

    pub fn rotation_period(&self) -> Duration {
        *self
            .inner
            .rotation_period
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a hook that runs before `event`
    pub fn before<F, Fut>(&self, event: EngineEvent, hook: F)
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.inner.hooks.register(HookPhase::Before, event, hook);
    }

    /// Register a hook that runs after `event`
    pub fn after<F, Fut>(&self, event: EngineEvent, hook: F)
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.inner.hooks.register(HookPhase::After, event, hook);
    }

    /// Encode `value` under the live key, firing the `obfuscated` hooks
    pub async fn encode(&self, value: &CacheValue) -> Result<String, ObfuscationError> {
        self.fire(HookPhase::Before, EngineEvent::Obfuscated).await;
        let encoded = self.seal(value);
        self.fire(HookPhase::After, EngineEvent::Obfuscated).await;
        encoded
    }

    /// Decode a string produced by [`encode`](Self::encode) under the live key
    pub fn decode(&self, encoded: &str) -> Result<CacheValue, ObfuscationError> {
        let parts: Vec<&str> = encoded.split(':').collect();
        let [iv_hex, ciphertext_hex, type_tag] = parts.as_slice() else {
            return Err(ObfuscationError::InvalidFormat(format!(
                "expected 3 ':'-separated parts, got {}",
                parts.len()
            )));
        };

        let value_type: ValueType = type_tag.parse()?;
        let nonce_bytes: [u8; NONCE_LEN] = hex::decode(iv_hex)?
            .try_into()
            .map_err(|bytes: Vec<u8>| ObfuscationError::InvalidNonceLength(bytes.len()))?;
        let mut in_out = hex::decode(ciphertext_hex)?;
        if in_out.len() < TAG_LEN {
            return Err(ObfuscationError::InvalidCiphertext(
                "Ciphertext too short".into(),
            ));
        }

        let plaintext_len = {
            let key = self.read_key();
            let aead_key = Self::aead_key(key.key())?;
            aead_key
                .open_in_place(
                    Nonce::assume_unique_for_key(nonce_bytes),
                    Aad::from(value_type.as_str().as_bytes()),
                    &mut in_out,
                )
                .map_err(|_| ObfuscationError::AuthenticationFailed)?
                .len()
        };
        in_out.truncate(plaintext_len);

        let plaintext = String::from_utf8(in_out).map_err(|_| ObfuscationError::InvalidUtf8)?;
        Ok(CacheValue::deserialize(&plaintext, value_type)?)
    }

    /// Replace the live key with a fresh random one
    ///
    /// Fires the `key_rotated` before-hooks, installs the key, then fires the
    /// after-hooks. Concurrent rotations are serialized. Returns the new
    /// generation.
    ///
    /// The rotation runs on its own task: dropping the returned future (for
    /// example on a timeout) stops waiting for it but never cuts it off
    /// between its before and after hooks.
    pub async fn rotate_key(&self) -> Result<u64, ObfuscationError> {
        let runtime = Handle::try_current().map_err(|_| ObfuscationError::NoRuntime)?;
        let engine = self.clone();
        runtime
            .spawn(async move { engine.run_rotation().await })
            .await
            .map_err(|error| ObfuscationError::RotationTask(error.to_string()))?
    }

    async fn run_rotation(&self) -> Result<u64, ObfuscationError> {
        let _rotation = self.inner.rotation_lock.lock().await;

        // Draw the key first so an RNG failure cannot strand dependents
        // between their before and after hooks.
        let new_key = generate_key(&self.inner.rng)?;

        let outgoing = self.generation();
        self.inner
            .hooks
            .fire(HookPhase::Before, EngineEvent::KeyRotated, outgoing)
            .await;

        let incoming = self
            .inner
            .key
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .install(new_key);
        info!(from = outgoing, to = incoming, "obfuscation key rotated");

        self.inner
            .hooks
            .fire(HookPhase::After, EngineEvent::KeyRotated, incoming)
            .await;
        Ok(incoming)
    }

    /// Change the automatic rotation period, restarting the timer
    pub async fn set_rotation_period(&self, period: Duration) -> Result<(), ObfuscationError> {
        validate_rotation_period(period)?;
        let runtime = Handle::try_current().map_err(|_| ObfuscationError::NoRuntime)?;

        self.fire(HookPhase::Before, EngineEvent::RotationDurationChanged)
            .await;
        *self
            .inner
            .rotation_period
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = period;
        self.schedule_rotation(&runtime, period);
        info!(period_secs = period.as_secs(), "rotation period changed");
        self.fire(HookPhase::After, EngineEvent::RotationDurationChanged)
            .await;
        Ok(())
    }

    async fn fire(&self, phase: HookPhase, event: EngineEvent) {
        let generation = self.generation();
        self.inner.hooks.fire(phase, event, generation).await;
    }

    fn seal(&self, value: &CacheValue) -> Result<String, ObfuscationError> {
        let value_type = value.value_type();
        let mut in_out = value.serialize()?.into_bytes();

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.inner
            .rng
            .fill(&mut nonce_bytes)
            .map_err(|_| ObfuscationError::RngFailure)?;

        {
            let key = self.read_key();
            let aead_key = Self::aead_key(key.key())?;
            aead_key
                .seal_in_place_append_tag(
                    Nonce::assume_unique_for_key(nonce_bytes),
                    Aad::from(value_type.as_str().as_bytes()),
                    &mut in_out,
                )
                .map_err(|e| {
                    ObfuscationError::EncryptionFailed(format!(
                        "AES-GCM encryption failed: {:?}",
                        e
                    ))
                })?;
        }

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(in_out),
            value_type
        ))
    }

    fn aead_key(key: &[u8; KEY_LEN]) -> Result<LessSafeKey, ObfuscationError> {
        let unbound_key = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| ObfuscationError::EncryptionFailed("Invalid key".into()))?;
        Ok(LessSafeKey::new(unbound_key))
    }

    fn read_key(&self) -> RwLockReadGuard<'_, KeyState> {
        self.inner.key.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel any pending rotation timer and start a new one for `period`
    fn schedule_rotation(&self, runtime: &Handle, period: Duration) {
        let engine = Arc::downgrade(&self.inner);
        let timer = runtime.spawn(Self::rotation_timer(engine, period));

        let previous = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(timer);
        if let Some(previous) = previous {
            previous.abort();
        }
        debug!(period_secs = period.as_secs(), "rotation timer scheduled");
    }

    async fn rotation_timer(engine: Weak<EngineInner>, period: Duration) {
        loop {
            sleep_chained(period).await;

            let Some(inner) = engine.upgrade() else {
                return;
            };
            let handle = ObfuscationEngine { inner };

            // Aborting this timer (period change) only drops the wait;
            // `rotate_key` keeps the rotation itself running to completion.
            if let Err(error) = handle.rotate_key().await {
                warn!(error = %error, "scheduled key rotation failed");
            }
        }
    }
}

impl std::fmt::Debug for ObfuscationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObfuscationEngine")
            .field("generation", &self.generation())
            .field("rotation_period", &self.rotation_period())
            .field("hooks", &self.inner.hooks)
            .finish()
    }
}
