//! In-process [`ChatClient`] that keeps all platform state in memory.
//!
//! Used for embedding the host without a network connection and as the
//! platform double in tests: events are injected with
//! [`MemoryClient::emit`] and everything the bot does is recorded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::client::ChatClient;
use crate::error::{PlatformError, PlatformResult};
use crate::model::{Guild, Member, Message, PlatformEvent, Role, User};

const EVENT_CAPACITY: usize = 256;

/// A reaction currently present on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReaction {
    pub channel_id: String,
    pub message_id: String,
    pub emoji: String,
    pub user_id: String,
}

pub struct MemoryClient {
    bot_user: User,
    /// Accepted token; `None` accepts any non-empty token.
    token: Option<String>,
    connected: AtomicBool,
    next_id: AtomicU64,
    guilds: Mutex<HashMap<String, Guild>>,
    members: Mutex<HashMap<(String, String), Member>>,
    roles: Mutex<HashMap<String, Vec<Role>>>,
    messages: Mutex<Vec<Message>>,
    reactions: Mutex<Vec<StoredReaction>>,
    events: broadcast::Sender<PlatformEvent>,
}

impl MemoryClient {
    pub fn new(bot_user: User) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            bot_user: bot_user.as_bot(),
            token: None,
            connected: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            guilds: Mutex::new(HashMap::new()),
            members: Mutex::new(HashMap::new()),
            roles: Mutex::new(HashMap::new()),
            messages: Mutex::new(Vec::new()),
            reactions: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Only accept `token` on login.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_guild(self, guild: Guild) -> Self {
        self.guilds.lock().insert(guild.id.clone(), guild);
        self
    }

    pub fn with_member(self, member: Member) -> Self {
        self.add_member(member);
        self
    }

    pub fn add_member(&self, member: Member) {
        self.members
            .lock()
            .insert((member.guild_id.clone(), member.user.id.clone()), member);
    }

    pub fn add_role(&self, guild_id: &str, role: Role) {
        self.roles
            .lock()
            .entry(guild_id.to_string())
            .or_default()
            .push(role);
    }

    /// The bot's own account.
    pub fn bot_user(&self) -> &User {
        &self.bot_user
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Publishes an event to all subscribers. Returns the number of
    /// receivers it reached.
    pub fn emit(&self, event: PlatformEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Messages sent by the bot, with edits applied and deletions removed.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn message(&self, message_id: &str) -> Option<Message> {
        self.messages
            .lock()
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    pub fn reactions_on(&self, message_id: &str) -> Vec<StoredReaction> {
        self.reactions
            .lock()
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect()
    }

    fn ensure_connected(&self) -> PlatformResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(PlatformError::NotConnected)
        }
    }

    fn next_message_id(&self) -> String {
        format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChatClient for MemoryClient {
    async fn login(&self, token: &str) -> PlatformResult<User> {
        let accepted = match &self.token {
            Some(expected) => expected == token,
            None => !token.is_empty(),
        };
        if !accepted {
            return Err(PlatformError::Auth("invalid token".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        debug!(user = %self.bot_user.name, "Memory client logged in");
        Ok(self.bot_user.clone())
    }

    async fn destroy(&self) -> PlatformResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events.subscribe()
    }

    async fn guild(&self, guild_id: &str) -> PlatformResult<Guild> {
        self.ensure_connected()?;
        self.guilds
            .lock()
            .get(guild_id)
            .cloned()
            .ok_or_else(|| PlatformError::not_found("guild", guild_id))
    }

    async fn member(&self, guild_id: &str, user_id: &str) -> PlatformResult<Member> {
        self.ensure_connected()?;
        self.members
            .lock()
            .get(&(guild_id.to_string(), user_id.to_string()))
            .cloned()
            .ok_or_else(|| PlatformError::not_found("member", user_id))
    }

    async fn roles(&self, guild_id: &str) -> PlatformResult<Vec<Role>> {
        self.ensure_connected()?;
        Ok(self.roles.lock().get(guild_id).cloned().unwrap_or_default())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> PlatformResult<Message> {
        self.ensure_connected()?;
        let mut message = Message::new(
            self.next_message_id(),
            channel_id,
            self.bot_user.clone(),
            content,
        );
        message.timestamp = Utc::now();
        self.messages.lock().push(message.clone());
        Ok(message)
    }

    async fn edit_message(
        &self,
        _channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> PlatformResult<()> {
        self.ensure_connected()?;
        let mut messages = self.messages.lock();
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| PlatformError::not_found("message", message_id))?;
        message.content = content.to_string();
        Ok(())
    }

    async fn delete_message(&self, _channel_id: &str, message_id: &str) -> PlatformResult<()> {
        self.ensure_connected()?;
        let mut messages = self.messages.lock();
        let before = messages.len();
        messages.retain(|m| m.id != message_id);
        if messages.len() == before {
            return Err(PlatformError::not_found("message", message_id));
        }
        Ok(())
    }

    async fn react(&self, channel_id: &str, message_id: &str, emoji: &str) -> PlatformResult<()> {
        self.ensure_connected()?;
        self.reactions.lock().push(StoredReaction {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            user_id: self.bot_user.id.clone(),
        });
        Ok(())
    }

    async fn remove_reaction(
        &self,
        _channel_id: &str,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> PlatformResult<()> {
        self.ensure_connected()?;
        self.reactions
            .lock()
            .retain(|r| !(r.message_id == message_id && r.emoji == emoji && r.user_id == user_id));
        Ok(())
    }

    async fn clear_reactions(&self, _channel_id: &str, message_id: &str) -> PlatformResult<()> {
        self.ensure_connected()?;
        self.reactions.lock().retain(|r| r.message_id != message_id);
        Ok(())
    }

    async fn add_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> PlatformResult<()> {
        self.ensure_connected()?;
        let mut members = self.members.lock();
        let member = members
            .get_mut(&(guild_id.to_string(), user_id.to_string()))
            .ok_or_else(|| PlatformError::not_found("member", user_id))?;
        if !member.has_role(role_id) {
            member.roles.push(role_id.to_string());
        }
        Ok(())
    }

    async fn remove_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> PlatformResult<()> {
        self.ensure_connected()?;
        let mut members = self.members.lock();
        let member = members
            .get_mut(&(guild_id.to_string(), user_id.to_string()))
            .ok_or_else(|| PlatformError::not_found("member", user_id))?;
        member.roles.retain(|r| r != role_id);
        Ok(())
    }
}
