//! The terminal as a chat platform, via [`ConsoleClient`].

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ward_core::{
    ChatClient, Guild, Member, Message, PlatformError, PlatformEvent, PlatformResult, Reaction,
    Role, User,
};

use crate::input::{ConsoleLine, parse_line};

/// The only channel of the console guild.
pub const CONSOLE_CHANNEL: &str = "console";

const EVENT_CAPACITY: usize = 64;

/// Turns console lines into platform events.
#[derive(Clone)]
struct Inbound {
    events: broadcast::Sender<PlatformEvent>,
    author: User,
    guild_id: String,
    next_id: Arc<AtomicU64>,
}

impl Inbound {
    fn next_message_id(&self) -> String {
        format!("con-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn feed(&self, line: &str) -> Option<PlatformEvent> {
        let event = match parse_line(line) {
            ConsoleLine::Empty => return None,
            ConsoleLine::Say(text) => PlatformEvent::Message(
                Message::new(
                    self.next_message_id(),
                    CONSOLE_CHANNEL,
                    self.author.clone(),
                    text,
                )
                .in_guild(self.guild_id.clone()),
            ),
            ConsoleLine::React { message_id, emoji } => {
                PlatformEvent::ReactionAdd(self.reaction(message_id, emoji))
            }
            ConsoleLine::Unreact { message_id, emoji } => {
                PlatformEvent::ReactionRemove(self.reaction(message_id, emoji))
            }
        };
        // No subscriber just means nobody is listening yet.
        let _ = self.events.send(event.clone());
        Some(event)
    }

    fn reaction(&self, message_id: String, emoji: String) -> Reaction {
        Reaction {
            channel_id: CONSOLE_CHANNEL.to_string(),
            message_id,
            user_id: self.author.id.clone(),
            emoji,
        }
    }
}

/// A single-guild, single-channel client on stdin/stdout.
///
/// Any non-empty token is accepted. The console user and the bot are the
/// only members of the guild.
pub struct ConsoleClient {
    bot_user: User,
    guild: Guild,
    inbound: Inbound,
    read_stdin: bool,
    connected: AtomicBool,
    output: Mutex<Box<dyn Write + Send>>,
    messages: Mutex<HashMap<String, Message>>,
    roles: Mutex<Vec<Role>>,
    member_roles: Mutex<HashMap<String, Vec<String>>>,
    shutdown: Mutex<Option<CancellationToken>>,
}

impl ConsoleClient {
    pub fn new(guild_id: impl Into<String>) -> Self {
        let guild_id = guild_id.into();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            bot_user: User::new("ward", "ward").as_bot(),
            guild: Guild::new(guild_id.clone(), "console"),
            inbound: Inbound {
                events,
                author: User::new("console-user", "you"),
                guild_id,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            read_stdin: true,
            connected: AtomicBool::new(false),
            output: Mutex::new(Box::new(io::stdout())),
            messages: Mutex::new(HashMap::new()),
            roles: Mutex::new(Vec::new()),
            member_roles: Mutex::new(HashMap::new()),
            shutdown: Mutex::new(None),
        }
    }

    /// The account lines typed into the console are attributed to.
    pub fn with_user(mut self, user: User) -> Self {
        self.inbound.author = user;
        self
    }

    pub fn with_bot(mut self, bot: User) -> Self {
        self.bot_user = bot.as_bot();
        self
    }

    pub fn with_role(self, role: Role) -> Self {
        self.roles.lock().push(role);
        self
    }

    /// Writes bot output here instead of stdout.
    pub fn with_output<W: Write + Send + 'static>(self, output: W) -> Self {
        *self.output.lock() = Box::new(output);
        self
    }

    /// Does not read stdin after login; lines only come from
    /// [`feed_line`](Self::feed_line).
    pub fn without_stdin(mut self) -> Self {
        self.read_stdin = false;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Handles one console line as if it had been typed. Returns the event
    /// it produced, if any.
    pub fn feed_line(&self, line: &str) -> Option<PlatformEvent> {
        self.inbound.feed(line)
    }

    fn ensure_connected(&self) -> PlatformResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(PlatformError::NotConnected)
        }
    }

    fn ensure_guild(&self, guild_id: &str) -> PlatformResult<()> {
        if guild_id == self.guild.id {
            Ok(())
        } else {
            Err(PlatformError::not_found("guild", guild_id))
        }
    }

    fn print(&self, line: &str) {
        let mut output = self.output.lock();
        if let Err(err) = writeln!(output, "{line}").and_then(|()| output.flush()) {
            warn!(error = %err, "Failed to write console output");
        }
    }

    fn spawn_reader(&self, token: CancellationToken) {
        let inbound = self.inbound.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            inbound.feed(&line);
                        }
                        Ok(None) => {
                            debug!("Console input closed");
                            break;
                        }
                        Err(err) => {
                            warn!(error = %err, "Failed to read console input");
                            break;
                        }
                    },
                }
            }
        });
    }
}

#[async_trait]
impl ChatClient for ConsoleClient {
    async fn login(&self, token: &str) -> PlatformResult<User> {
        if token.is_empty() {
            return Err(PlatformError::Auth("empty token".to_string()));
        }
        if !self.connected.swap(true, Ordering::SeqCst) && self.read_stdin {
            let token = CancellationToken::new();
            self.spawn_reader(token.clone());
            *self.shutdown.lock() = Some(token);
        }
        info!(
            user = %self.inbound.author.name,
            "Console connected, type messages or /react <message id> <emoji>"
        );
        Ok(self.bot_user.clone())
    }

    async fn destroy(&self) -> PlatformResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(token) = self.shutdown.lock().take() {
            token.cancel();
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.inbound.events.subscribe()
    }

    async fn guild(&self, guild_id: &str) -> PlatformResult<Guild> {
        self.ensure_connected()?;
        self.ensure_guild(guild_id)?;
        Ok(self.guild.clone())
    }

    async fn member(&self, guild_id: &str, user_id: &str) -> PlatformResult<Member> {
        self.ensure_connected()?;
        self.ensure_guild(guild_id)?;
        let user = if user_id == self.inbound.author.id {
            self.inbound.author.clone()
        } else if user_id == self.bot_user.id {
            self.bot_user.clone()
        } else {
            return Err(PlatformError::not_found("member", user_id));
        };
        let mut member = Member::new(guild_id, user);
        member.roles = self
            .member_roles
            .lock()
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        Ok(member)
    }

    async fn roles(&self, guild_id: &str) -> PlatformResult<Vec<Role>> {
        self.ensure_connected()?;
        self.ensure_guild(guild_id)?;
        Ok(self.roles.lock().clone())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> PlatformResult<Message> {
        self.ensure_connected()?;
        let message = Message::new(
            self.inbound.next_message_id(),
            channel_id,
            self.bot_user.clone(),
            content,
        )
        .in_guild(self.guild.id.clone());
        self.print(&format!("[{} #{}] {content}", self.bot_user.name, message.id));
        self.messages
            .lock()
            .insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn edit_message(
        &self,
        _channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> PlatformResult<()> {
        self.ensure_connected()?;
        {
            let mut messages = self.messages.lock();
            let message = messages
                .get_mut(message_id)
                .ok_or_else(|| PlatformError::not_found("message", message_id))?;
            message.content = content.to_string();
        }
        self.print(&format!("[{} #{message_id} edited] {content}", self.bot_user.name));
        Ok(())
    }

    async fn delete_message(&self, _channel_id: &str, message_id: &str) -> PlatformResult<()> {
        self.ensure_connected()?;
        if self.messages.lock().remove(message_id).is_none() {
            return Err(PlatformError::not_found("message", message_id));
        }
        self.print(&format!("[#{message_id} deleted]"));
        Ok(())
    }

    async fn react(&self, _channel_id: &str, message_id: &str, emoji: &str) -> PlatformResult<()> {
        self.ensure_connected()?;
        self.print(&format!("[#{message_id}] {} reacted {emoji}", self.bot_user.name));
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
        debug!(message = %message_id, emoji, user = %user_id, "Reaction removed");
        Ok(())
    }

    async fn clear_reactions(&self, _channel_id: &str, message_id: &str) -> PlatformResult<()> {
        self.ensure_connected()?;
        self.print(&format!("[#{message_id}] reactions cleared"));
        Ok(())
    }

    async fn add_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> PlatformResult<()> {
        self.ensure_connected()?;
        self.ensure_guild(guild_id)?;
        let mut member_roles = self.member_roles.lock();
        let roles = member_roles.entry(user_id.to_string()).or_default();
        if !roles.iter().any(|r| r == role_id) {
            roles.push(role_id.to_string());
        }
        drop(member_roles);
        self.print(&format!("[role] {user_id} +{role_id}"));
        Ok(())
    }

    async fn remove_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> PlatformResult<()> {
        self.ensure_connected()?;
        self.ensure_guild(guild_id)?;
        if let Some(roles) = self.member_roles.lock().get_mut(user_id) {
            roles.retain(|r| r != role_id);
        }
        self.print(&format!("[role] {user_id} -{role_id}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    async fn client() -> (ConsoleClient, Buffer) {
        let buffer = Buffer::default();
        let client = ConsoleClient::new("dev")
            .without_stdin()
            .with_output(buffer.clone());
        client.login("local").await.unwrap();
        (client, buffer)
    }

    #[tokio::test]
    async fn test_lines_become_events() {
        let (client, _) = client().await;
        let mut events = client.subscribe();

        client.feed_line("!ping");
        client.feed_line("   ");
        client.feed_line("/react con-9 👍");

        match events.recv().await.unwrap() {
            PlatformEvent::Message(message) => {
                assert_eq!(message.content, "!ping");
                assert_eq!(message.guild_id.as_deref(), Some("dev"));
                assert_eq!(message.channel_id, CONSOLE_CHANNEL);
                assert!(!message.is_from_bot());
            }
            other => panic!("unexpected event {other:?}"),
        }
        match events.recv().await.unwrap() {
            PlatformEvent::ReactionAdd(reaction) => {
                assert_eq!(reaction.message_id, "con-9");
                assert_eq!(reaction.user_id, "console-user");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_edit_delete_print() {
        let (client, buffer) = client().await;
        let sent = client.send_message(CONSOLE_CHANNEL, "pong").await.unwrap();
        assert!(sent.is_from_bot());

        client
            .edit_message(CONSOLE_CHANNEL, &sent.id, "pong!")
            .await
            .unwrap();
        client.delete_message(CONSOLE_CHANNEL, &sent.id).await.unwrap();
        assert!(matches!(
            client.delete_message(CONSOLE_CHANNEL, &sent.id).await,
            Err(PlatformError::NotFound { .. })
        ));

        let text = buffer.text();
        assert!(text.contains(&format!("[ward #{}] pong\n", sent.id)));
        assert!(text.contains("edited] pong!"));
        assert!(text.contains("deleted]"));
    }

    #[tokio::test]
    async fn test_members_and_roles() {
        let (client, _) = client().await;
        client.add_role("dev", "console-user", "r1").await.unwrap();
        client.add_role("dev", "console-user", "r1").await.unwrap();

        let member = client.member("dev", "console-user").await.unwrap();
        assert_eq!(member.roles, vec!["r1"]);
        assert!(client.member("dev", "stranger").await.is_err());
        assert!(client.guild("elsewhere").await.is_err());

        client.remove_role("dev", "console-user", "r1").await.unwrap();
        let member = client.member("dev", "console-user").await.unwrap();
        assert!(member.roles.is_empty());
    }

    #[tokio::test]
    async fn test_requires_login() {
        let client = ConsoleClient::new("dev").without_stdin();
        assert!(matches!(
            client.guild("dev").await,
            Err(PlatformError::NotConnected)
        ));
        assert!(client.login("").await.is_err());

        client.login("local").await.unwrap();
        client.destroy().await.unwrap();
        assert!(!client.is_connected());
    }
}
