//! Parsing of console input lines.

/// What one line typed into the console means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    /// A chat message from the console user.
    Say(String),
    /// `/react <message id> <emoji>`
    React { message_id: String, emoji: String },
    /// `/unreact <message id> <emoji>`
    Unreact { message_id: String, emoji: String },
    Empty,
}

pub fn parse_line(line: &str) -> ConsoleLine {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return ConsoleLine::Empty;
    }

    let mut parts = line.split_whitespace();
    let verb = parts.next();
    if let Some(verb @ ("/react" | "/unreact")) = verb
        && let (Some(message_id), Some(emoji), None) = (parts.next(), parts.next(), parts.next())
    {
        let message_id = message_id.trim_start_matches('#').to_string();
        let emoji = emoji.to_string();
        return if verb == "/react" {
            ConsoleLine::React { message_id, emoji }
        } else {
            ConsoleLine::Unreact { message_id, emoji }
        };
    }

    ConsoleLine::Say(line.to_string())
}
