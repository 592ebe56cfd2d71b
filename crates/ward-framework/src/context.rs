//! What an importable knows about where it runs.
//!
//! The host attaches one context to every importable exactly once, after it
//! has connected and resolved its guild. Hooks reach the platform through
//! it instead of through any global state.

use std::fmt;

use ward_core::{BoxedClient, Guild, Message, PlatformResult, User};

#[derive(Clone)]
pub struct GuildContext {
    client: BoxedClient,
    guild: Guild,
    user: User,
    command_prefix: String,
}

impl GuildContext {
    pub fn new(
        client: BoxedClient,
        guild: Guild,
        user: User,
        command_prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            guild,
            user,
            command_prefix: command_prefix.into(),
        }
    }

    pub fn client(&self) -> &BoxedClient {
        &self.client
    }

    pub fn guild(&self) -> &Guild {
        &self.guild
    }

    /// The bot's own account.
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    /// Sends `content` to the channel `message` came from.
    pub async fn reply(&self, message: &Message, content: &str) -> PlatformResult<Message> {
        self.client.send_message(&message.channel_id, content).await
    }
}

impl fmt::Debug for GuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuildContext")
            .field("guild", &self.guild.id)
            .field("user", &self.user.id)
            .field("command_prefix", &self.command_prefix)
            .finish_non_exhaustive()
    }
}
