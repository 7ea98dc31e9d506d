//! Dry-run backend that only logs

use crate::keys::KeyId;

use super::{InjectError, KeyInjector};

/// Logs every key event at info level and injects nothing.
///
/// Useful for trying a catalog on a machine without uinput access.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogInjector;

impl KeyInjector for LogInjector {
    fn name(&self) -> &'static str {
        "log"
    }

    fn press(&self, key: KeyId) -> Result<(), InjectError> {
        tracing::info!(%key, "press");
        Ok(())
    }

    fn release(&self, key: KeyId) -> Result<(), InjectError> {
        tracing::info!(%key, "release");
        Ok(())
    }
}
