//! Combo execution: press keys in order, hold, release in reverse
//!
//! [`ComboExecutor`] is the unit of synthetic input. For `"lctrl+shift+f"` it
//! emits:
//!
//! ```text
//! press LEFTCTRL -> press LEFTSHIFT -> press 'f'
//!   (settle)
//! release 'f' -> release LEFTSHIFT -> release LEFTCTRL
//! ```
//!
//! The whole combo is resolved before the first press, so an invalid token
//! never produces partial input. Once a key is down it is owned by a
//! [`HeldKeys`] guard, which releases everything in reverse order when it goes
//! out of scope. That covers the normal path, a failed press, and the combo
//! future being dropped mid-hold (e.g. the HTTP client went away).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::injector::{InjectError, KeyInjector};
use crate::keys::{resolve_combo, KeyId, ResolveError};

#[derive(Debug, Error)]
pub enum ComboError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to press {key}: {source}")]
    Press {
        key: KeyId,
        #[source]
        source: InjectError,
    },
}

/// Executes combos against a shared injector.
///
/// Cheap to clone; clones share the injector, clock and (if enabled) the
/// combo lock.
#[derive(Clone)]
pub struct ComboExecutor {
    injector: Arc<dyn KeyInjector>,
    clock: Arc<dyn Clock>,
    settle: Duration,
    /// Serializes press..release across executors when set
    lock: Option<Arc<Mutex<()>>>,
}

impl ComboExecutor {
    pub fn new(injector: Arc<dyn KeyInjector>, clock: Arc<dyn Clock>, settle: Duration) -> Self {
        Self {
            injector,
            clock,
            settle,
            lock: None,
        }
    }

    /// Hold a global lock for the press..release section of every combo, so
    /// one combo's release can never land between another's press and release.
    pub fn serialized(mut self) -> Self {
        self.lock = Some(Arc::new(Mutex::new(())));
        self
    }

    pub fn is_serialized(&self) -> bool {
        self.lock.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.injector.name()
    }

    /// Press every key of `combo` in order, hold, then release in reverse.
    ///
    /// # Errors
    ///
    /// - [`ComboError::Resolve`] if any token is unknown; nothing is pressed.
    /// - [`ComboError::Press`] if the backend rejects a press; keys already
    ///   down are released before the error is returned.
    ///
    /// Release failures are logged and never returned.
    pub async fn execute(&self, combo: &str) -> Result<(), ComboError> {
        let keys = resolve_combo(combo)?;

        let _serial = match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let mut held = HeldKeys::new(self.injector.as_ref(), keys.len());
        for key in keys {
            if let Err(source) = self.injector.press(key) {
                tracing::warn!(combo, %key, "Press failed, releasing held keys: {}", source);
                return Err(ComboError::Press { key, source });
            }
            held.push(key);
        }

        if !self.settle.is_zero() {
            self.clock.sleep(self.settle).await;
        }

        drop(held);
        tracing::debug!(combo, "Combo executed");
        Ok(())
    }
}

/// Keys currently held down by one combo, released in reverse on drop
struct HeldKeys<'a> {
    injector: &'a dyn KeyInjector,
    keys: Vec<KeyId>,
}

impl<'a> HeldKeys<'a> {
    fn new(injector: &'a dyn KeyInjector, capacity: usize) -> Self {
        Self {
            injector,
            keys: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, key: KeyId) {
        self.keys.push(key);
    }
}

impl Drop for HeldKeys<'_> {
    fn drop(&mut self) {
        while let Some(key) = self.keys.pop() {
            if let Err(e) = self.injector.release(key) {
                // Keep going: a stuck key is worse than a noisy log
                tracing::warn!(%key, "Release failed: {}", e);
            }
        }
    }
}
