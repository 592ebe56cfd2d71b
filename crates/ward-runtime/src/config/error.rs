//! Errors raised while loading and validating a Ward configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    #[error("could not read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Malformed file content or a value of the wrong shape.
    #[error("could not parse config: {0}")]
    ParseError(String),

    #[error("invalid config: {message}")]
    ValidationError { message: String },

    #[error("config field `{field}` is required")]
    MissingField { field: String },

    /// Two guild sections share a `guild_id`.
    #[error("guild `{0}` is configured more than once")]
    DuplicateGuildId(String),

    /// The requested guild has no section.
    #[error("guild `{0}` is not configured")]
    UnknownGuild(String),
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
