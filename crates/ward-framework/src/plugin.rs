//! The two kinds of importables, [`Plugin`] and [`Api`].
//!
//! Plugins implement features: they receive messages, commands and
//! reactions, and may run a periodic `on_update`. Apis wrap external
//! services and are injected into plugins; they only have lifecycle hooks.
//!
//! Every hook is optional. Whether a plugin wants `on_update` at all is
//! decided by [`Plugin::update_interval`].
//!
//! ```text
//! on_start ──▶ [ on_update | on_message | on_command | on_reaction ]* ──▶ on_stop
//! ```

use std::time::Duration;

use async_trait::async_trait;
use ward_core::{Message, Reaction};

use crate::command::CommandInvocation;
use crate::error::HookResult;
use crate::importable::Importable;
use crate::inject::Injection;

#[async_trait]
pub trait Plugin: Importable {
    /// How often `on_update` runs. `None` means never.
    fn update_interval(&self) -> Option<Duration> {
        None
    }

    /// Dependencies to resolve before `on_start`.
    fn injections(&self) -> Vec<Injection<'_>> {
        Vec::new()
    }

    async fn on_start(&self) -> HookResult {
        Ok(())
    }

    async fn on_stop(&self) -> HookResult {
        Ok(())
    }

    async fn on_update(&self) -> HookResult {
        Ok(())
    }

    /// A guild message that is not a command.
    async fn on_message(&self, _message: &Message) -> HookResult {
        Ok(())
    }

    /// A message starting with the command prefix.
    async fn on_command(&self, _message: &Message, _command: &CommandInvocation) -> HookResult {
        Ok(())
    }

    /// A reaction was added (`added == true`) or removed.
    async fn on_reaction(&self, _reaction: &Reaction, _added: bool) -> HookResult {
        Ok(())
    }
}

#[async_trait]
pub trait Api: Importable {
    async fn on_start(&self) -> HookResult {
        Ok(())
    }

    async fn on_stop(&self) -> HookResult {
        Ok(())
    }
}
