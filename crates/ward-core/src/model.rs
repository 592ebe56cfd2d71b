//! Platform model types.
//!
//! These are the plain data records a [`ChatClient`](crate::ChatClient)
//! hands to the host. They carry only what the host and its plugins need;
//! bindings for a concrete platform convert their own payloads into them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A platform account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Whether the account is an automated (bot) account.
    #[serde(default)]
    pub bot: bool,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bot: false,
        }
    }

    /// Marks the account as a bot account.
    pub fn as_bot(mut self) -> Self {
        self.bot = true;
        self
    }
}

/// A user's membership record inside one guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub guild_id: String,
    pub user: User,
    #[serde(default)]
    pub nickname: Option<String>,
    /// Role ids held by the member.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Member {
    pub fn new(guild_id: impl Into<String>, user: User) -> Self {
        Self {
            guild_id: guild_id.into(),
            user,
            nickname: None,
            roles: Vec::new(),
        }
    }

    /// Returns the nickname if set, otherwise the account name.
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.user.name)
    }

    pub fn has_role(&self, role_id: &str) -> bool {
        self.roles.iter().any(|r| r == role_id)
    }
}

/// A guild (server / community) the bot serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl Guild {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner_id: None,
        }
    }
}

/// A guild role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    /// RGB color, if the role has one.
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub position: i32,
}

/// An inbound or sent chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    /// `None` for direct messages.
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: User,
    /// The author's guild membership; attached by the host when missing.
    #[serde(default)]
    pub member: Option<Member>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        author: User,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            guild_id: None,
            author,
            member: None,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    pub fn with_member(mut self, member: Member) -> Self {
        self.member = Some(member);
        self
    }

    /// Whether the message was written by a bot account.
    pub fn is_from_bot(&self) -> bool {
        self.author.bot
    }
}

/// A reaction added to or removed from a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub channel_id: String,
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
}

/// Events pushed by the platform to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    Message(Message),
    ReactionAdd(Reaction),
    ReactionRemove(Reaction),
}

impl PlatformEvent {
    /// Short name used in log fields.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::ReactionAdd(_) => "reaction_add",
            Self::ReactionRemove(_) => "reaction_remove",
        }
    }
}
