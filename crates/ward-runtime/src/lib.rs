//! Ward Runtime - Orchestration layer for the Ward bot host.
//!
//! This crate provides:
//! - The [`Ward`] host: registration, dependency injection, event dispatch,
//!   the update/autosave loop and signal-driven shutdown
//! - Layered configuration loading ([`config`])
//! - Logging initialisation ([`logging`])
//!
//! ```ignore
//! use std::sync::Arc;
//! use ward_runtime::{Ward, config, logging};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config()?;
//!     config::validate_config(&config)?;
//!     logging::init_from_config(&config.logging);
//!
//!     let guild = config.guilds[0].clone();
//!     let ward = Arc::new(Ward::new(client, guild));
//!     ward.add_plugin(Ping::default());
//!
//!     // Run until Ctrl+C
//!     ward.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod ward;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, GuildConfig, LoggingConfig, WardConfig,
};
pub use error::{WardError, WardResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use ward::{Ward, WardState};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
