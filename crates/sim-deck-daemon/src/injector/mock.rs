//! Recording backend for tests.
//!
//! The `RecordingInjector` touches no OS API. Every press/release call is
//! pushed into a `Mutex<Vec<KeyEvent>>` so assertions can check exactly what
//! was sent and in what order, including calls that were made to fail.
//!
//! ```
//! use std::sync::Arc;
//! use sim_deck_daemon::injector::{KeyEvent, KeyInjector, RecordingInjector};
//! use sim_deck_daemon::keys::KeyId;
//!
//! let injector = Arc::new(RecordingInjector::new());
//! injector.press(KeyId::Char('a')).unwrap();
//! assert_eq!(injector.events(), vec![KeyEvent::Press(KeyId::Char('a'))]);
//! ```

use std::collections::HashSet;
use std::sync::Mutex;

use crate::keys::KeyId;

use super::{InjectError, KeyInjector};

/// One call made against a [`RecordingInjector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Press(KeyId),
    Release(KeyId),
}

impl KeyEvent {
    pub fn key(&self) -> KeyId {
        match self {
            KeyEvent::Press(key) | KeyEvent::Release(key) => *key,
        }
    }
}

/// A backend that records calls instead of injecting them.
///
/// Keys registered with [`fail_press`](Self::fail_press) or
/// [`fail_release`](Self::fail_release) return an error; the attempt is still
/// recorded.
#[derive(Debug, Default)]
pub struct RecordingInjector {
    events: Mutex<Vec<KeyEvent>>,
    failing_presses: HashSet<KeyId>,
    failing_releases: HashSet<KeyId>,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every press of `key` fail
    pub fn fail_press(mut self, key: KeyId) -> Self {
        self.failing_presses.insert(key);
        self
    }

    /// Make every release of `key` fail
    pub fn fail_release(mut self, key: KeyId) -> Self {
        self.failing_releases.insert(key);
        self
    }

    /// Snapshot of all recorded calls, in call order
    pub fn events(&self) -> Vec<KeyEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn record(&self, event: KeyEvent, fail: bool) -> Result<(), InjectError> {
        self.events.lock().unwrap().push(event);
        if fail {
            return Err(InjectError::Backend(format!("mock failure on {:?}", event)));
        }
        Ok(())
    }
}

impl KeyInjector for RecordingInjector {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn press(&self, key: KeyId) -> Result<(), InjectError> {
        self.record(KeyEvent::Press(key), self.failing_presses.contains(&key))
    }

    fn release(&self, key: KeyId) -> Result<(), InjectError> {
        self.record(KeyEvent::Release(key), self.failing_releases.contains(&key))
    }
}
