//! `ping`, `echo`, `uptime` and `help`.

use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::debug;
use ward::framework::BoxError;
use ward::prelude::*;

use crate::uptime::{Uptime, format_duration};

pub struct Ping {
    core: ImportableCore<NoData>,
    uptime: Inject<Uptime>,
    commands: CommandTable<Ping>,
}

impl Ping {
    pub fn new() -> Self {
        let commands = CommandTable::new()
            .with(CommandSpec::new("ping", ping).description("Check that the bot is alive"))
            .with(
                CommandSpec::new("echo", echo)
                    .alias("say")
                    .description("Repeat the rest of the message"),
            )
            .with(CommandSpec::new("uptime", uptime).description("Time since startup"))
            .with(
                CommandSpec::new("help", help)
                    .alias("h")
                    .description("List commands"),
            );
        Self {
            core: ImportableCore::new(),
            uptime: Inject::new(),
            commands,
        }
    }

    fn attached(&self) -> Result<&GuildContext, BoxError> {
        self.guild()
            .ok_or_else(|| format!("{} is not attached to a guild", self.id()).into())
    }
}

impl Default for Ping {
    fn default() -> Self {
        Self::new()
    }
}

impl Importable for Ping {
    type Data = NoData;

    fn default_id(&self) -> String {
        "ping".into()
    }

    fn core(&self) -> &ImportableCore<NoData> {
        &self.core
    }

    fn default_config(&self) -> Value {
        json!({ "reply": "pong", "help_page_size": 5 })
    }
}

#[async_trait]
impl Plugin for Ping {
    fn injections(&self) -> Vec<Injection<'_>> {
        vec![Injection::api("uptime", &self.uptime)]
    }

    async fn on_command(&self, message: &Message, command: &CommandInvocation) -> HookResult {
        match self.commands.dispatch(self, message, command).await {
            Some(result) => result,
            None => Ok(()),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn ping<'a>(
    plugin: &'a Ping,
    message: &'a Message,
    _command: &'a CommandInvocation,
) -> BoxFuture<'a, HookResult> {
    Box::pin(async move {
        let reply: String = plugin.config().get_or("reply", "pong".to_string());
        plugin.attached()?.reply(message, &reply).await?;
        Ok(())
    })
}

fn echo<'a>(
    plugin: &'a Ping,
    message: &'a Message,
    command: &'a CommandInvocation,
) -> BoxFuture<'a, HookResult> {
    Box::pin(async move {
        if command.rest.is_empty() {
            debug!(user = %message.author.id, "Empty echo ignored");
            return Ok(());
        }
        plugin.attached()?.reply(message, &command.rest).await?;
        Ok(())
    })
}

fn uptime<'a>(
    plugin: &'a Ping,
    message: &'a Message,
    _command: &'a CommandInvocation,
) -> BoxFuture<'a, HookResult> {
    Box::pin(async move {
        let text = match plugin.uptime.require()?.uptime() {
            Some(elapsed) => format!("Up for {}", format_duration(elapsed)),
            None => "Not started yet".to_string(),
        };
        plugin.attached()?.reply(message, &text).await?;
        Ok(())
    })
}

fn help<'a>(
    plugin: &'a Ping,
    message: &'a Message,
    _command: &'a CommandInvocation,
) -> BoxFuture<'a, HookResult> {
    Box::pin(async move {
        let guild = plugin.attached()?;
        let lines = plugin.commands.help_lines(guild.command_prefix(), message);
        let per_page = plugin.config().get_or("help_page_size", 5usize).max(1);
        let _ = Paginator::from_lines(lines, per_page).spawn(
            guild.client().clone(),
            message.channel_id.clone(),
            message.author.id.clone(),
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    #[tokio::test]
    async fn test_ping_uses_configured_reply() {
        let harness = Harness::new();
        let config = harness
            .config()
            .with_plugin("ping", json!({ "reply": "pong!" }));
        let ward = harness.ward(config);
        ward.add_api(Uptime::default());
        ward.add_plugin(Ping::new());
        ward.start().await.unwrap();

        ward.handle_event(harness.message("!ping")).await;
        ward.handle_event(harness.message("!echo hello   there")).await;
        ward.handle_event(harness.message("!echo")).await;

        assert_eq!(harness.sent(), vec!["pong!", "hello   there"]);
        ward.stop().await;
    }

    #[tokio::test]
    async fn test_uptime_is_injected() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_api(Uptime::default());
        ward.add_plugin(Ping::new());
        ward.start().await.unwrap();

        ward.handle_event(harness.message("!uptime")).await;

        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Up for "), "{sent:?}");
        ward.stop().await;
    }

    #[tokio::test]
    async fn test_uptime_without_api_fails_quietly() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_plugin(Ping::new());
        ward.start().await.unwrap();

        ward.handle_event(harness.message("!uptime")).await;
        ward.handle_event(harness.message("!ping")).await;

        assert_eq!(harness.sent(), vec!["pong"]);
        ward.stop().await;
    }

    #[tokio::test]
    async fn test_help_lists_commands() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_plugin(Ping::new());
        ward.start().await.unwrap();

        ward.handle_event(harness.message("!h")).await;

        let help = harness.wait_for_sent(1).await;
        assert!(help[0].contains("!ping: Check that the bot is alive"), "{help:?}");
        assert!(help[0].contains("!echo (say)"), "{help:?}");
        ward.stop().await;
    }
}
