//! Runtime errors.

use chatsync_core::SyncError;
use thiserror::Error;

use crate::ConfigError;

/// Errors surfaced by the runtime and its handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Configuration rejected at startup
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    /// Command refused by the session
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Runtime has stopped; commands go nowhere
    #[error("runtime stopped")]
    Stopped,
}

impl RuntimeError {
    /// Returns true if the same command may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sync(e) => e.is_transient(),
            Self::Config(_) | Self::Stopped => false,
        }
    }
}
