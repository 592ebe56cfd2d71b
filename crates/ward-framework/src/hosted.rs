//! Type-erased handles the host keeps for its importables.
//!
//! [`Importable`](crate::importable::Importable) has an associated data
//! type, so plugins of different kinds cannot share one registry directly.
//! The host stores them as `Arc<dyn PluginHandle>` (plugins) and
//! `Arc<dyn ImportableHandle>` (apis); [`HostedPlugin`] and [`HostedApi`]
//! forward every call to the concrete type.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use ward_core::{Message, Reaction};

use crate::command::CommandInvocation;
use crate::context::GuildContext;
use crate::data::DataStore;
use crate::error::{DataResult, HookResult, SharedDataError};
use crate::inject::{AnyInstance, Injection};
use crate::plugin::{Api, Plugin};

/// Operations the host performs on any importable.
#[async_trait]
pub trait ImportableHandle: Send + Sync {
    fn id(&self) -> String;

    fn default_id(&self) -> String;

    fn set_id(&self, id: &str);

    fn apply_config(&self, section: Option<&Value>);

    /// Binds the importable to the data store and its guild.
    fn attach(&self, store: &Arc<DataStore>, guild: &GuildContext);

    fn is_external(&self) -> bool;

    fn autosave_interval(&self) -> Duration;

    /// The concrete instance, for injection.
    fn instance(&self) -> AnyInstance;

    /// Whether the data container exists and is loaded.
    fn is_loaded(&self) -> bool;

    async fn load_data(&self) -> DataResult<()>;

    /// Saves loaded data. Returns `false` when there is nothing loaded.
    async fn save_data(&self) -> Result<bool, SharedDataError>;

    async fn start(&self) -> HookResult;

    async fn stop(&self) -> HookResult;
}

/// Additional operations the host performs on plugins.
#[async_trait]
pub trait PluginHandle: ImportableHandle {
    fn update_interval(&self) -> Option<Duration>;

    fn injections(&self) -> Vec<Injection<'_>>;

    async fn update(&self) -> HookResult;

    async fn message(&self, message: &Message) -> HookResult;

    async fn command(&self, message: &Message, command: &CommandInvocation) -> HookResult;

    async fn reaction(&self, reaction: &Reaction, added: bool) -> HookResult;
}

/// A registered plugin.
pub struct HostedPlugin<P> {
    inner: Arc<P>,
}

/// A registered api.
pub struct HostedApi<A> {
    inner: Arc<A>,
}

macro_rules! impl_hosted {
    ($hosted:ident, $kind:ident) => {
        impl<T: $kind> $hosted<T> {
            pub fn new(inner: Arc<T>) -> Self {
                Self { inner }
            }

            pub fn inner(&self) -> &Arc<T> {
                &self.inner
            }
        }

        #[async_trait]
        impl<T: $kind> ImportableHandle for $hosted<T> {
            fn id(&self) -> String {
                self.inner.id()
            }

            fn default_id(&self) -> String {
                self.inner.default_id()
            }

            fn set_id(&self, id: &str) {
                self.inner.core().set_id(id);
            }

            fn apply_config(&self, section: Option<&Value>) {
                self.inner.apply_config(section);
            }

            fn attach(&self, store: &Arc<DataStore>, guild: &GuildContext) {
                let core = self.inner.core();
                core.attach_store(Arc::clone(store));
                core.attach_guild(guild.clone());
            }

            fn is_external(&self) -> bool {
                self.inner.is_external()
            }

            fn autosave_interval(&self) -> Duration {
                self.inner.autosave_interval()
            }

            fn instance(&self) -> AnyInstance {
                self.inner.clone()
            }

            fn is_loaded(&self) -> bool {
                self.inner
                    .core()
                    .existing_data()
                    .is_some_and(|data| data.is_loaded())
            }

            async fn load_data(&self) -> DataResult<()> {
                let data = self.inner.data()?;
                data.ensure_loaded(|| self.inner.init_data()).await
            }

            async fn save_data(&self) -> Result<bool, SharedDataError> {
                match self.inner.core().existing_data() {
                    Some(data) if data.is_loaded() => {
                        data.save().await?;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }

            async fn start(&self) -> HookResult {
                $kind::on_start(self.inner.as_ref()).await
            }

            async fn stop(&self) -> HookResult {
                $kind::on_stop(self.inner.as_ref()).await
            }
        }
    };
}

impl_hosted!(HostedPlugin, Plugin);
impl_hosted!(HostedApi, Api);

#[async_trait]
impl<P: Plugin> PluginHandle for HostedPlugin<P> {
    fn update_interval(&self) -> Option<Duration> {
        self.inner.update_interval()
    }

    fn injections(&self) -> Vec<Injection<'_>> {
        self.inner.injections()
    }

    async fn update(&self) -> HookResult {
        self.inner.on_update().await
    }

    async fn message(&self, message: &Message) -> HookResult {
        self.inner.on_message(message).await
    }

    async fn command(&self, message: &Message, command: &CommandInvocation) -> HookResult {
        self.inner.on_command(message, command).await
    }

    async fn reaction(&self, reaction: &Reaction, added: bool) -> HookResult {
        self.inner.on_reaction(reaction, added).await
    }
}
