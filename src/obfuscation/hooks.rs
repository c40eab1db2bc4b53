//! Before/after hook protocol around engine events
//!
//! Hooks run sequentially in registration order and are awaited one at a
//! time. A hook that fails or panics is logged and skipped; it never aborts
//! the surrounding event.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Error type returned by hook callbacks
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

type Hook = Arc<dyn Fn(HookContext) -> BoxFuture<'static, Result<(), HookError>> + Send + Sync>;

/// Events that expose before/after hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEvent {
    /// The active key is being replaced
    KeyRotated,
    /// A value is being encoded
    Obfuscated,
    /// The automatic rotation period is being changed
    RotationDurationChanged,
}

impl EngineEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineEvent::KeyRotated => "key_rotated",
            EngineEvent::Obfuscated => "obfuscated",
            EngineEvent::RotationDurationChanged => "rotation_duration_changed",
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a hook runs before or after its event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Before,
    After,
}

/// Details handed to every hook invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookContext {
    pub event: EngineEvent,
    pub phase: HookPhase,
    /// Key generation at the time the hook runs
    ///
    /// For `key_rotated` this is the outgoing generation in the before phase
    /// and the incoming one in the after phase.
    pub generation: u64,
}

/// Ordered hook lists keyed by phase and event
#[derive(Default)]
pub struct HookRegistry {
    hooks: Mutex<HashMap<(HookPhase, EngineEvent), Vec<Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&self, phase: HookPhase, event: EngineEvent, hook: F)
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        let hook: Hook = Arc::new(move |ctx| hook(ctx).boxed());
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((phase, event))
            .or_default()
            .push(hook);
    }

    /// Number of hooks registered for a phase/event pair
    pub fn count(&self, phase: HookPhase, event: EngineEvent) -> usize {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(phase, event))
            .map_or(0, Vec::len)
    }

    /// Run every hook for `phase`/`event` in registration order
    pub async fn fire(&self, phase: HookPhase, event: EngineEvent, generation: u64) {
        // Snapshot the list so hooks may register further hooks without
        // deadlocking on the registry lock.
        let hooks: Vec<Hook> = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(phase, event))
            .cloned()
            .unwrap_or_default();

        let ctx = HookContext {
            event,
            phase,
            generation,
        };

        for (index, hook) in hooks.iter().enumerate() {
            match AssertUnwindSafe(hook(ctx)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(event = %event, ?phase, index, error = %error, "hook failed");
                }
                Err(_) => {
                    warn!(event = %event, ?phase, index, "hook panicked");
                }
            }
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: usize = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum();
        f.debug_struct("HookRegistry")
            .field("registered", &registered)
            .finish()
    }
}
