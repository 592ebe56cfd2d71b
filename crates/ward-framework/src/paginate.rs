//! Paginated replies navigated with reactions.
//!
//! ```text
//!  send page 1 "(1/N)" ──▶ react ◀️ ▶️ ──▶ wait for the invoking user's reaction
//!                                             │            │
//!                                         ◀️ / ▶️       timeout
//!                                             │            │
//!                         edit page, drop the user's    clear all
//!                         reaction, restart the timer   reactions
//! ```
//!
//! Navigation wraps around in both directions. Reactions from other users
//! or on other messages are ignored.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};
use ward_core::{BoxedClient, Message, PlatformError, PlatformEvent, PlatformResult};

pub const PREVIOUS_PAGE: &str = "◀️";
pub const NEXT_PAGE: &str = "▶️";

/// Inactivity timeout used when none is set.
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct Paginator {
    pages: Vec<String>,
    timeout: Duration,
}

impl Paginator {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            pages,
            timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }

    /// Groups `lines` into pages of at most `per_page` lines.
    pub fn from_lines<I, S>(lines: I, per_page: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        let pages = lines
            .chunks(per_page.max(1))
            .map(|chunk| chunk.join("\n"))
            .collect();
        Self::new(pages)
    }

    /// Time without navigation after which the reactions are removed.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Text of page `index` with a `(n/N)` footer when there are several
    /// pages.
    pub fn render(&self, index: usize) -> String {
        let page = self.pages.get(index).map(String::as_str).unwrap_or_default();
        if self.pages.len() > 1 {
            format!("{page}\n({}/{})", index + 1, self.pages.len())
        } else {
            page.to_string()
        }
    }

    /// Sends the first page to `channel_id` and lets `user_id` page through
    /// until the timeout. Resolves with the final state of the message.
    pub async fn send(
        &self,
        client: &BoxedClient,
        channel_id: &str,
        user_id: &str,
    ) -> PlatformResult<Message> {
        if self.pages.is_empty() {
            return Err(PlatformError::Request("paginator has no pages".to_string()));
        }

        let mut events = client.subscribe();
        let mut message = client.send_message(channel_id, &self.render(0)).await?;
        if self.pages.len() == 1 {
            return Ok(message);
        }

        client.react(channel_id, &message.id, PREVIOUS_PAGE).await?;
        client.react(channel_id, &message.id, NEXT_PAGE).await?;

        let count = self.pages.len();
        let mut index = 0;
        let mut deadline = Instant::now() + self.timeout;

        loop {
            let reaction = match timeout_at(deadline, events.recv()).await {
                Err(_) => break,
                Ok(Ok(PlatformEvent::ReactionAdd(reaction))) => reaction,
                Ok(Ok(_)) => continue,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(message = %message.id, skipped, "Paginator missed events");
                    continue;
                }
                Ok(Err(RecvError::Closed)) => break,
            };
            if reaction.message_id != message.id || reaction.user_id != user_id {
                continue;
            }

            index = match reaction.emoji.as_str() {
                PREVIOUS_PAGE => (index + count - 1) % count,
                NEXT_PAGE => (index + 1) % count,
                _ => continue,
            };
            let content = self.render(index);
            client
                .edit_message(channel_id, &message.id, &content)
                .await?;
            message.content = content;

            if let Err(err) = client
                .remove_reaction(channel_id, &message.id, &reaction.emoji, user_id)
                .await
            {
                debug!(message = %message.id, error = %err, "Could not remove page reaction");
            }
            deadline = Instant::now() + self.timeout;
        }

        if let Err(err) = client.clear_reactions(channel_id, &message.id).await {
            warn!(message = %message.id, error = %err, "Could not clear page reactions");
        }
        Ok(message)
    }

    /// Runs [`send`](Self::send) on its own task so the calling hook does
    /// not wait for the timeout.
    pub fn spawn(
        self,
        client: BoxedClient,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> JoinHandle<PlatformResult<Message>> {
        let channel_id = channel_id.into();
        let user_id = user_id.into();
        tokio::spawn(async move { self.send(&client, &channel_id, &user_id).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ward_core::{ChatClient, MemoryClient, Reaction, User};

    async fn client() -> Arc<MemoryClient> {
        let client = Arc::new(MemoryClient::new(User::new("bot", "ward")));
        client.login("token").await.unwrap();
        client
    }

    async fn wait_for_reactions(client: &MemoryClient, count: usize) -> Message {
        loop {
            if let Some(message) = client.sent_messages().first().cloned()
                && client.reactions_on(&message.id).len() >= count
            {
                return message;
            }
            tokio::task::yield_now().await;
        }
    }

    fn reaction(message: &Message, user: &str, emoji: &str) -> PlatformEvent {
        PlatformEvent::ReactionAdd(Reaction {
            channel_id: message.channel_id.clone(),
            message_id: message.id.clone(),
            user_id: user.to_string(),
            emoji: emoji.to_string(),
        })
    }

    #[test]
    fn test_render_footer() {
        let paginator = Paginator::from_lines(["a", "b", "c"], 2);
        assert_eq!(paginator.page_count(), 2);
        assert_eq!(paginator.render(0), "a\nb\n(1/2)");
        assert_eq!(paginator.render(1), "c\n(2/2)");
        assert_eq!(Paginator::new(vec!["only".into()]).render(0), "only");
    }

    #[tokio::test]
    async fn test_single_page_has_no_navigation() {
        let client = client().await;
        let boxed: BoxedClient = client.clone();
        let sent = Paginator::new(vec!["only".into()])
            .send(&boxed, "c1", "u1")
            .await
            .unwrap();
        assert_eq!(sent.content, "only");
        assert!(client.reactions_on(&sent.id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_wraps_and_times_out() {
        let client = client().await;
        let boxed: BoxedClient = client.clone();
        let paginator = Paginator::new(vec!["one".into(), "two".into(), "three".into()])
            .timeout(Duration::from_secs(30));
        let task = paginator.spawn(boxed, "c1", "u1");

        let message = wait_for_reactions(&client, 2).await;
        assert_eq!(message.content, "one\n(1/3)");

        client.emit(reaction(&message, "someone-else", NEXT_PAGE));
        client.emit(reaction(&message, "u1", PREVIOUS_PAGE));

        let finished = task.await.unwrap().unwrap();
        assert_eq!(finished.content, "three\n(3/3)");
        assert_eq!(client.message(&message.id).unwrap().content, "three\n(3/3)");
        assert!(client.reactions_on(&message.id).is_empty());
    }

    #[tokio::test]
    async fn test_empty_paginator_fails() {
        let client = client().await;
        let boxed: BoxedClient = client;
        assert!(Paginator::new(Vec::new()).send(&boxed, "c1", "u1").await.is_err());
    }
}
