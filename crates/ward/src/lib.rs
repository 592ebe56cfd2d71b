//! # Ward
//!
//! A plugin host for community chat bots. One [`Ward`](runtime::Ward)
//! connects to one guild, hosts a fixed set of plugins and apis, routes
//! messages, commands and reactions to them, and keeps their data on disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  events   ┌─────────────────────────┐  hooks   ┌────────────────┐
//! │ ChatClient │──────────▶│ Ward                    │─────────▶│ Plugins / Apis │
//! │ (platform) │◀──────────│ tick: update, autosave, │◀─────────│ Inject<T>      │
//! └────────────┘  replies  │ backup                  │  data    │ DataContainer  │
//!                          └─────────────────────────┘          └────────────────┘
//!                                       │
//!                                       ▼
//!                 data/{guild}/{id}.json, data/backups/{date}/{guild}/
//! ```
//!
//! - **Core**: the [`ChatClient`](core::ChatClient) trait, model types and the clock
//! - **Framework**: [`Plugin`](framework::Plugin), [`Api`](framework::Api),
//!   configuration views, data containers, injection, commands, pagination
//! - **Runtime**: the host itself, configuration loading and logging
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ward::prelude::*;
//!
//! #[derive(Default)]
//! struct Ping {
//!     core: ImportableCore<NoData>,
//! }
//!
//! impl Importable for Ping {
//!     type Data = NoData;
//!     fn default_id(&self) -> String { "ping".into() }
//!     fn core(&self) -> &ImportableCore<NoData> { &self.core }
//! }
//!
//! #[async_trait]
//! impl Plugin for Ping {
//!     async fn on_command(&self, message: &Message, command: &CommandInvocation) -> HookResult {
//!         if command.is("ping") && let Some(guild) = self.guild() {
//!             guild.reply(message, "pong").await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     init_from_config(&config.logging);
//!     let ward = Arc::new(Ward::new(client, config.guilds[0].clone()));
//!     ward.add_plugin(Ping::default());
//!     ward.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `console`: the stdin/stdout [`ConsoleClient`](console::ConsoleClient)
//! - `toml-config` / `yaml-config`: extra configuration file formats
//! - `json-log`: JSON log output

pub use ward_core as core;
pub use ward_framework as framework;
pub use ward_runtime as runtime;

#[cfg(feature = "console")]
pub use ward_adapter_console as console;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use ward::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use ward_runtime::config::{
        ConfigLoader, GuildConfig, WardConfig, load_config, load_config_from_file,
        validate_config,
    };
    pub use ward_runtime::logging::{LoggingBuilder, SpanEvents, init_from_config};
    pub use ward_runtime::{Ward, WardError, WardResult, WardState};

    // Importables
    pub use ward_framework::{
        Api, CommandInvocation, CommandSpec, CommandTable, ConfigView, DataContainer, GuildContext,
        HookResult, Importable, ImportableCore, Inject, Injection, NoData, Paginator, Plugin,
    };

    // Platform
    pub use ward_core::{
        BoxedClient, ChatClient, Guild, Member, Message, PlatformError, PlatformEvent, Reaction,
        Role, User,
    };

    #[cfg(feature = "console")]
    pub use ward_adapter_console::ConsoleClient;

    // Logging macros
    pub use ward_runtime::prelude::*;

    // Async trait support for implementing hooks
    pub use async_trait::async_trait;
}
