//! Command parsing and explicit command tables.
//!
//! A command is a guild message of the form `{prefix}{name} {args…}`.
//! [`parse_command`] turns it into a [`CommandInvocation`]; plugins that
//! handle several commands route their `on_command` through a
//! [`CommandTable`]:
//!
//! ```rust,ignore
//! fn roll<'a>(
//!     plugin: &'a Dice,
//!     message: &'a Message,
//!     command: &'a CommandInvocation,
//! ) -> BoxFuture<'a, HookResult> {
//!     Box::pin(async move { /* … */ Ok(()) })
//! }
//!
//! let table = CommandTable::new()
//!     .with(CommandSpec::new("roll", roll).alias("r").description("Roll dice"));
//!
//! // in `on_command`:
//! table.dispatch(self, message, command).await;
//! ```

use std::fmt;

use futures::future::BoxFuture;
use ward_core::Message;

use crate::error::HookResult;

/// A parsed command message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Command name as typed, without the prefix.
    pub name: String,
    /// Arguments split on whitespace; quotes group words.
    pub args: Vec<String>,
    /// Everything after the name, trimmed.
    pub rest: String,
}

impl CommandInvocation {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Parses `text` as a command if it starts with `prefix`.
///
/// Returns `None` for text without the prefix and for a bare prefix.
///
/// `args` is split by [`split_args`], so quoted words stay together:
/// `!say "a b"` gives the single argument `a b`. `rest` keeps the raw
/// text after the name, quotes included.
pub fn parse_command(prefix: &str, text: &str) -> Option<CommandInvocation> {
    let body = text.strip_prefix(prefix)?;
    let body = body.trim_start();
    let (name, rest) = match body.find(char::is_whitespace) {
        Some(split) => (&body[..split], body[split..].trim()),
        None => (body, ""),
    };
    if name.is_empty() {
        return None;
    }
    Some(CommandInvocation {
        name: name.to_string(),
        args: split_args(rest),
        rest: rest.to_string(),
    })
}

/// Splits arguments on whitespace. Single or double quotes group words;
/// inside double quotes a backslash escapes the next character.
pub fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut quoted = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => escape_next = true,
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                quoted = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                quoted = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if !current.is_empty() || quoted {
                    args.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() || quoted {
        args.push(current);
    }

    args
}

// =============================================================================
// CommandTable
// =============================================================================

/// Handler signature for table commands.
pub type CommandHandler<P> =
    for<'a> fn(&'a P, &'a Message, &'a CommandInvocation) -> BoxFuture<'a, HookResult>;

/// Guard deciding whether a command is available for a message.
pub type CommandPredicate = fn(&Message) -> bool;

/// One command entry.
pub struct CommandSpec<P> {
    name: &'static str,
    aliases: Vec<&'static str>,
    description: Option<&'static str>,
    predicate: Option<CommandPredicate>,
    handler: CommandHandler<P>,
}

impl<P> CommandSpec<P> {
    pub fn new(name: &'static str, handler: CommandHandler<P>) -> Self {
        Self {
            name,
            aliases: Vec::new(),
            description: None,
            predicate: None,
            handler,
        }
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    /// Only run the command for messages accepted by `predicate`.
    pub fn when(mut self, predicate: CommandPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn aliases(&self) -> &[&'static str] {
        &self.aliases
    }

    fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name))
    }
}

impl<P> fmt::Debug for CommandSpec<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("guarded", &self.predicate.is_some())
            .finish()
    }
}

/// Ordered list of commands a plugin answers to.
pub struct CommandTable<P> {
    commands: Vec<CommandSpec<P>>,
}

impl<P> CommandTable<P> {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    pub fn with(mut self, command: CommandSpec<P>) -> Self {
        self.commands.push(command);
        self
    }

    pub fn add(&mut self, command: CommandSpec<P>) {
        self.commands.push(command);
    }

    /// The first command whose name or alias matches, ignoring case.
    pub fn find(&self, name: &str) -> Option<&CommandSpec<P>> {
        self.commands.iter().find(|spec| spec.matches(name))
    }

    /// Runs the matching command. Returns `None` when no command matches or
    /// its predicate rejects the message.
    pub async fn dispatch(
        &self,
        plugin: &P,
        message: &Message,
        command: &CommandInvocation,
    ) -> Option<HookResult> {
        let spec = self.find(&command.name)?;
        if let Some(predicate) = spec.predicate
            && !predicate(message)
        {
            return None;
        }
        Some((spec.handler)(plugin, message, command).await)
    }

    /// One `name (aliases): description` line per command available for
    /// `message`.
    pub fn help_lines(&self, prefix: &str, message: &Message) -> Vec<String> {
        self.commands
            .iter()
            .filter(|spec| spec.predicate.is_none_or(|predicate| predicate(message)))
            .map(|spec| {
                let mut line = format!("{prefix}{}", spec.name);
                if !spec.aliases.is_empty() {
                    line.push_str(&format!(" ({})", spec.aliases.join(", ")));
                }
                if let Some(description) = spec.description {
                    line.push_str(": ");
                    line.push_str(description);
                }
                line
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<P> Default for CommandTable<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ward_core::User;

    #[test]
    fn test_parse_command() {
        let command = parse_command("!", "!roll 2d6  now").unwrap();
        assert_eq!(command.name, "roll");
        assert_eq!(command.args, vec!["2d6", "now"]);
        assert_eq!(command.rest, "2d6  now");

        let bare = parse_command("!", "!help").unwrap();
        assert!(bare.args.is_empty());
        assert_eq!(bare.rest, "");
    }

    #[test]
    fn test_parse_rejects_non_commands() {
        assert_eq!(parse_command("!", "hello"), None);
        assert_eq!(parse_command("!", "!"), None);
        assert_eq!(parse_command("!", "!   "), None);
    }

    #[test]
    fn test_parse_command_groups_quoted_args() {
        let command = parse_command("!", r#"!say "a b" c"#).unwrap();
        assert_eq!(command.args, vec!["a b", "c"]);
        assert_eq!(command.rest, r#""a b" c"#);
    }

    #[test]
    fn test_multichar_prefix() {
        let command = parse_command("w?", "w? remind me later").unwrap();
        assert_eq!(command.name, "remind");
        assert_eq!(command.args, vec!["me", "later"]);
    }

    #[test]
    fn test_split_args_quotes() {
        assert_eq!(
            split_args(r#"add "two words" 'single q' "esc\"aped" """#),
            vec!["add", "two words", "single q", "esc\"aped", ""]
        );
        assert!(split_args("   ").is_empty());
    }

    struct Counter {
        hits: AtomicUsize,
    }

    fn hit<'a>(
        counter: &'a Counter,
        _message: &'a Message,
        _command: &'a CommandInvocation,
    ) -> BoxFuture<'a, HookResult> {
        Box::pin(async move {
            counter.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn never(_message: &Message) -> bool {
        false
    }

    fn table() -> CommandTable<Counter> {
        CommandTable::new()
            .with(CommandSpec::new("count", hit).alias("c").description("Count"))
            .with(CommandSpec::new("secret", hit).when(never))
    }

    #[tokio::test]
    async fn test_table_dispatch() {
        let counter = Counter {
            hits: AtomicUsize::new(0),
        };
        let message = Message::new("m1", "c1", User::new("u1", "alice"), "!C");
        let table = table();

        let upper = parse_command("!", "!C").unwrap();
        assert!(table.dispatch(&counter, &message, &upper).await.is_some());

        let guarded = parse_command("!", "!secret").unwrap();
        assert!(table.dispatch(&counter, &message, &guarded).await.is_none());

        let unknown = parse_command("!", "!nope").unwrap();
        assert!(table.dispatch(&counter, &message, &unknown).await.is_none());

        assert_eq!(counter.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_help_lines_skip_guarded() {
        let message = Message::new("m1", "c1", User::new("u1", "alice"), "!help");
        assert_eq!(table().help_lines("!", &message), vec!["!count (c): Count"]);
    }
}
