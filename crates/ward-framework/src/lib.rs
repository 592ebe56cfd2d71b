//! # Ward Framework
//!
//! Building blocks for the units the Ward host manages.
//!
//! This layer provides:
//! - [`Importable`], [`Plugin`] and [`Api`]: identity, configuration and
//!   lifecycle hooks
//! - [`ConfigView`]: base configuration with per-instance `_config` overrides
//! - [`DataContainer`] and [`DataStore`]: persisted JSON state with dirty
//!   tracking, autosave and daily backups
//! - [`Inject`] and [`Injection`]: dependencies between plugins and apis
//! - [`parse_command`] and [`CommandTable`]: prefix commands
//! - [`Paginator`]: multi-page replies navigated with reactions
//!
//! The runtime drives everything here through the type-erased handles in
//! [`hosted`].

pub mod command;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod hosted;
pub mod importable;
pub mod inject;
pub mod paginate;
pub mod plugin;

pub use command::{
    CommandHandler, CommandInvocation, CommandPredicate, CommandSpec, CommandTable, parse_command,
    split_args,
};
pub use config::{ConfigView, deep_merge, follow_keys};
pub use context::GuildContext;
pub use data::{
    BackupOutcome, CONFIG_KEY, ContainerHost, DEFAULT_AUTOSAVE_INTERVAL, DataContainer, DataEvent,
    DataStore, SaveHandle,
};
pub use error::{
    BoxError, DataError, DataResult, HookResult, InjectError, SharedDataError,
};
pub use hosted::{HostedApi, HostedPlugin, ImportableHandle, PluginHandle};
pub use importable::{Importable, ImportableCore, NoData};
pub use inject::{AnyInstance, Inject, InjectSlot, Injection, InjectionKind};
pub use paginate::{NEXT_PAGE, PREVIOUS_PAGE, Paginator};
pub use plugin::{Api, Plugin};
