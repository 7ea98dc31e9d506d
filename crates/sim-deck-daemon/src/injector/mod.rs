//! Key injection backends
//!
//! Everything above this module talks to the keyboard through the
//! [`KeyInjector`] trait. One backend is selected at startup with
//! [`create_injector`] and shared behind an `Arc` by every combo and macro.

mod log;
pub mod mock;
mod uinput;

use std::sync::Arc;

use anyhow::{Context, Result};
use sim_deck_config::BackendKind;
use thiserror::Error;

use crate::keys::KeyId;

pub use self::log::LogInjector;
pub use self::mock::{KeyEvent, RecordingInjector};
pub use self::uinput::{KeyEmitter, UinputInjector, VirtualDevice};

/// Name given to the uinput virtual keyboard
pub const VIRTUAL_DEVICE_NAME: &str = "sim-deck virtual keyboard";

#[derive(Debug, Error)]
pub enum InjectError {
    /// The backend has no way to type this key (e.g. a non-ASCII character)
    #[error("backend '{backend}' cannot inject {key}")]
    Unsupported { backend: &'static str, key: KeyId },

    #[error("failed to write key event: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),
}

/// Press/release of a single key on the host.
///
/// Implementations must be safe to call from many tasks at once; they are
/// shared by every concurrent combo and macro.
pub trait KeyInjector: Send + Sync {
    /// Short backend name for logs and the health endpoint
    fn name(&self) -> &'static str;

    fn press(&self, key: KeyId) -> Result<(), InjectError>;

    fn release(&self, key: KeyId) -> Result<(), InjectError>;
}

/// Create the configured backend.
///
/// # Errors
///
/// Returns an error if the backend cannot be initialised, e.g. when
/// `/dev/uinput` is not writable by the current user.
pub fn create_injector(kind: BackendKind) -> Result<Arc<dyn KeyInjector>> {
    let injector: Arc<dyn KeyInjector> = match kind {
        BackendKind::Uinput => Arc::new(
            UinputInjector::new(VIRTUAL_DEVICE_NAME)
                .context("Failed to create uinput virtual keyboard (is /dev/uinput writable?)")?,
        ),
        BackendKind::Log => Arc::new(LogInjector),
    };

    tracing::info!("Using '{}' key injection backend", injector.name());
    Ok(injector)
}
