//! Value Obfuscation Module
//!
//! Reversible encryption of cache values with a single live key that is
//! replaced on a schedule.
//!
//! # Features
//! - AES-256-GCM via `ring`, fresh random nonce per encode
//! - Type tag bound as additional authenticated data
//! - Automatic rotation every 90 days by default, reconfigurable at runtime
//! - Before/after hooks on `key_rotated`, `obfuscated` and
//!   `rotation_duration_changed`
//! - Key material zeroized on drop

pub mod core;
pub mod hooks;
pub mod key_rotation;

// Re-exports for convenience
pub use core::{ObfuscationEngine, ObfuscationError};
pub use hooks::{EngineEvent, HookContext, HookError, HookPhase};
pub use key_rotation::{DEFAULT_ROTATION_PERIOD, KEY_LEN, MAX_ROTATION_PERIOD};
