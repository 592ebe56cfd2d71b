//! Configuration module for the Ward runtime.
//!
//! This module provides layered JSON configuration loading and validation
//! for guild sections and logging.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    GuildConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig,
    WardConfig,
};
pub use validation::{validate_config, validate_guild_config};
