//! Runtime error types.

use thiserror::Error;
use ward_core::PlatformError;
use ward_framework::DataError;

use crate::config::ConfigError;

/// Errors that abort [`Ward::start`](crate::Ward::start) or runtime setup.
///
/// Hook, save and backup failures never surface here; they are logged
/// where they happen.
#[derive(Error, Debug)]
pub enum WardError {
    /// Logging in to the platform failed.
    #[error("Failed to connect to the platform: {0}")]
    Connection(#[source] PlatformError),

    /// The configured guild could not be resolved after login.
    #[error("Failed to resolve guild {guild_id}: {source}")]
    Guild {
        guild_id: String,
        #[source]
        source: PlatformError,
    },

    /// The data directories could not be prepared.
    #[error("Data store error: {0}")]
    Data(#[from] DataError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for runtime operations.
pub type WardResult<T> = Result<T, WardError>;
