//! Ping Bot Example
//!
//! A console-driven bot hosting three importables:
//!
//! | Id       | Kind   | Commands                                   |
//! |----------|--------|--------------------------------------------|
//! | `uptime` | api    |                                            |
//! | `ping`   | plugin | `ping`, `echo`, `uptime`, `help`           |
//! | `memo`   | plugin | `remember`, `memos`, `forget`, `memo-page` |
//!
//! Lines typed on stdin arrive as guild messages; replies are printed.
//! `/react #con-3 ▶️` reacts to a printed message, which is how the
//! paginated `help` and `memos` listings are paged.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package ping-bot -- --config demos/ping_bot/config.json
//! ```

mod memo;
mod ping;
mod uptime;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use ward::prelude::*;
use ward::runtime::ConfigError;

use crate::memo::Memo;
use crate::ping::Ping;
use crate::uptime::Uptime;

#[derive(Debug, Parser)]
#[command(name = "ping-bot", about = "A console demo of the Ward bot host")]
struct Args {
    /// Configuration file. Searched for in the usual places when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Guild section to run. Defaults to the first one.
    #[arg(short, long)]
    guild: Option<String>,

    /// Name shown as the author of console lines.
    #[arg(short, long, default_value = "operator")]
    user: String,
}

fn select_guild(config: &WardConfig, wanted: Option<&str>) -> Result<GuildConfig, ConfigError> {
    match wanted {
        Some(id) => config
            .guild(id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownGuild(id.to_string())),
        None => Ok(config
            .guilds
            .first()
            .cloned()
            .unwrap_or_else(|| GuildConfig::new("console", "local"))),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config_from_file(path)?,
        None => load_config()?,
    };
    validate_config(&config)?;
    init_from_config(&config.logging);

    let guild = select_guild(&config, args.guild.as_deref())?;
    info!(guild = %guild.guild_id, prefix = %guild.command_prefix, "Starting ping bot");

    let client = ConsoleClient::new(guild.guild_id.clone())
        .with_user(User::new("operator", args.user));
    let ward = Arc::new(Ward::new(Arc::new(client), guild));

    ward.add_api(Uptime::default());
    ward.add_plugin(Ping::new());
    ward.add_plugin(Memo::new());

    ward.run().await?;
    info!("Ping bot stopped");
    Ok(())
}
