//! Error types for platform operations.

use thiserror::Error;

/// Errors surfaced by a [`ChatClient`](crate::ChatClient) implementation.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The platform rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The client is not connected (never logged in or already destroyed).
    #[error("client is not connected")]
    NotConnected,

    /// A guild, member, channel, message or role does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// What kind of object was looked up.
        kind: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The bot lacks the permission to perform the operation.
    #[error("missing permission: {0}")]
    Permission(String),

    /// The request was rate limited by the platform.
    #[error("rate limited, retry after {retry_after_ms} ms")]
    RateLimited {
        /// Suggested wait before retrying.
        retry_after_ms: u64,
    },

    /// Any other transport or protocol failure.
    #[error("platform request failed: {0}")]
    Request(String),
}

impl PlatformError {
    /// Shorthand for a [`PlatformError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;
