//! The chat-platform collaborator.
//!
//! The host never speaks a wire protocol itself. Everything it needs from
//! the platform goes through [`ChatClient`]: connecting, receiving events,
//! sending/editing/deleting messages, reactions, and member/role queries.
//! Any binding that exposes this surface is substitutable.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::PlatformResult;
use crate::model::{Guild, Member, Message, PlatformEvent, Role, User};

/// Connection to a chat platform.
///
/// Implementations must be cheap to share behind an `Arc`; the host, the
/// paginator and plugins all hold clones of the same [`BoxedClient`].
#[async_trait]
pub trait ChatClient: Send + Sync + 'static {
    /// Connects and authenticates. Returns the bot's own account.
    async fn login(&self, token: &str) -> PlatformResult<User>;

    /// Disconnects. Calling it on a disconnected client is not an error.
    async fn destroy(&self) -> PlatformResult<()>;

    /// Subscribes to inbound platform events.
    ///
    /// Every call returns an independent receiver; events published before
    /// the call are not replayed.
    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent>;

    async fn guild(&self, guild_id: &str) -> PlatformResult<Guild>;

    async fn member(&self, guild_id: &str, user_id: &str) -> PlatformResult<Member>;

    async fn roles(&self, guild_id: &str) -> PlatformResult<Vec<Role>>;

    /// Sends a message and returns it as stored by the platform.
    async fn send_message(&self, channel_id: &str, content: &str) -> PlatformResult<Message>;

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> PlatformResult<()>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> PlatformResult<()>;

    /// Adds a reaction as the bot.
    async fn react(&self, channel_id: &str, message_id: &str, emoji: &str) -> PlatformResult<()>;

    /// Removes one user's reaction.
    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> PlatformResult<()>;

    /// Removes every reaction from a message.
    async fn clear_reactions(&self, channel_id: &str, message_id: &str) -> PlatformResult<()>;

    async fn add_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> PlatformResult<()>;

    async fn remove_role(&self, guild_id: &str, user_id: &str, role_id: &str)
    -> PlatformResult<()>;
}

/// A shared chat client trait object.
pub type BoxedClient = Arc<dyn ChatClient>;
