//! A per-guild notepad persisted in the plugin's data file.

use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};
use ward::framework::BoxError;
use ward::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub author: String,
    pub text: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoData {
    #[serde(default)]
    pub notes: Vec<Note>,
}

pub struct Memo {
    core: ImportableCore<MemoData>,
    commands: CommandTable<Memo>,
}

impl Memo {
    pub fn new() -> Self {
        let commands = CommandTable::new()
            .with(
                CommandSpec::new("remember", remember)
                    .alias("note")
                    .description("Save a note"),
            )
            .with(CommandSpec::new("memos", list).description("List saved notes"))
            .with(
                CommandSpec::new("forget", forget)
                    .description("Delete note N, or `all`")
                    .when(in_guild),
            )
            .with(
                CommandSpec::new("memo-page", page_size)
                    .description("Set notes shown per page")
                    .when(in_guild),
            );
        Self {
            core: ImportableCore::new(),
            commands,
        }
    }

    fn max_notes(&self) -> usize {
        self.config().get_or("max_notes", 50usize)
    }

    async fn reply(&self, message: &Message, content: &str) -> HookResult {
        let guild = self
            .guild()
            .ok_or_else(|| -> BoxError { format!("{} is not attached", self.id()).into() })?;
        guild.reply(message, content).await?;
        Ok(())
    }
}

impl Default for Memo {
    fn default() -> Self {
        Self::new()
    }
}

impl Importable for Memo {
    type Data = MemoData;

    fn default_id(&self) -> String {
        "memo".into()
    }

    fn core(&self) -> &ImportableCore<MemoData> {
        &self.core
    }

    fn default_config(&self) -> Value {
        json!({ "max_notes": 50, "page_size": 5 })
    }

    fn autosave_interval(&self) -> Duration {
        Duration::from_secs(60)
    }
}

#[async_trait]
impl Plugin for Memo {
    fn update_interval(&self) -> Option<Duration> {
        Some(Duration::from_secs(60 * 60))
    }

    /// Drops the oldest notes once `max_notes` has been lowered.
    async fn on_update(&self) -> HookResult {
        let max = self.max_notes();
        let dropped = self.data()?.write(|data| {
            let excess = data.notes.len().saturating_sub(max);
            data.notes.drain(..excess);
            excess
        })?;
        if dropped > 0 {
            info!(id = %self.id(), dropped, "Trimmed memo list");
        } else {
            debug!(id = %self.id(), "Memo list within limit");
        }
        Ok(())
    }

    async fn on_command(&self, message: &Message, command: &CommandInvocation) -> HookResult {
        match self.commands.dispatch(self, message, command).await {
            Some(result) => result,
            None => Ok(()),
        }
    }
}

fn in_guild(message: &Message) -> bool {
    message.guild_id.is_some()
}

fn author_name(message: &Message) -> String {
    message
        .member
        .as_ref()
        .map(|member| member.display_name().to_string())
        .unwrap_or_else(|| message.author.name.clone())
}

// =============================================================================
// Handlers
// =============================================================================

fn remember<'a>(
    plugin: &'a Memo,
    message: &'a Message,
    command: &'a CommandInvocation,
) -> BoxFuture<'a, HookResult> {
    Box::pin(async move {
        let text = command.rest.trim();
        if text.is_empty() {
            return plugin.reply(message, "Nothing to remember").await;
        }

        let max = plugin.max_notes();
        let note = Note {
            author: author_name(message),
            text: text.to_string(),
        };
        let saved = plugin.data()?.write(|data| {
            if data.notes.len() >= max {
                None
            } else {
                data.notes.push(note);
                Some(data.notes.len())
            }
        })?;

        match saved {
            Some(number) => plugin.reply(message, &format!("Noted (#{number})")).await,
            None => plugin.reply(message, "The memo list is full").await,
        }
    })
}

fn list<'a>(
    plugin: &'a Memo,
    message: &'a Message,
    _command: &'a CommandInvocation,
) -> BoxFuture<'a, HookResult> {
    Box::pin(async move {
        let lines = plugin.data()?.read(|data| {
            data.notes
                .iter()
                .enumerate()
                .map(|(index, note)| format!("#{} {} ({})", index + 1, note.text, note.author))
                .collect::<Vec<_>>()
        })?;
        if lines.is_empty() {
            return plugin.reply(message, "No memos yet").await;
        }

        let Some(guild) = plugin.guild() else {
            return Ok(());
        };
        let per_page = plugin.config().get_or("page_size", 5usize).max(1);
        let _ = Paginator::from_lines(lines, per_page).spawn(
            guild.client().clone(),
            message.channel_id.clone(),
            message.author.id.clone(),
        );
        Ok(())
    })
}

fn forget<'a>(
    plugin: &'a Memo,
    message: &'a Message,
    command: &'a CommandInvocation,
) -> BoxFuture<'a, HookResult> {
    Box::pin(async move {
        let data = plugin.data()?;
        let reply = match command.arg(0) {
            Some("all") => {
                let count = data.write(|data| std::mem::take(&mut data.notes).len())?;
                format!("Forgot {count} notes")
            }
            Some(arg) => match arg.parse::<usize>() {
                Ok(number) if number > 0 => {
                    let removed = data.write(|data| {
                        (number <= data.notes.len()).then(|| data.notes.remove(number - 1))
                    })?;
                    match removed {
                        Some(note) => format!("Forgot \"{}\"", note.text),
                        None => format!("There is no note #{number}"),
                    }
                }
                _ => format!("Not a note number: {arg}"),
            },
            None => "Usage: forget <number|all>".to_string(),
        };
        plugin.reply(message, &reply).await
    })
}

fn page_size<'a>(
    plugin: &'a Memo,
    message: &'a Message,
    command: &'a CommandInvocation,
) -> BoxFuture<'a, HookResult> {
    Box::pin(async move {
        let Some(size) = command.arg(0).and_then(|arg| arg.parse::<usize>().ok()) else {
            return plugin.reply(message, "Usage: memo-page <size>").await;
        };
        plugin
            .data()?
            .set_config_override("page_size", json!(size.max(1)))?;
        plugin
            .reply(message, &format!("Showing {} notes per page", size.max(1)))
            .await
    })
}
