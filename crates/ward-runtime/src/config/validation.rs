//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{GuildConfig, LogOutput, LoggingConfig, WardConfig};
use std::collections::HashSet;

/// Guild ids that would collide with entries in the data directory.
const RESERVED_GUILD_IDS: &[&str] = &["backups"];

/// Validates the entire configuration.
pub fn validate_config(config: &WardConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_guilds_config(&config.guilds)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

/// Validates all guild sections.
fn validate_guilds_config(guilds: &[GuildConfig]) -> ConfigResult<()> {
    let mut seen_ids = HashSet::new();

    for guild in guilds {
        if !seen_ids.insert(&guild.guild_id) {
            return Err(ConfigError::DuplicateGuildId(guild.guild_id.clone()));
        }

        validate_guild_config(guild)?;
    }

    Ok(())
}

/// Validates a single guild section.
pub fn validate_guild_config(guild: &GuildConfig) -> ConfigResult<()> {
    if guild.guild_id.is_empty() {
        return Err(ConfigError::missing_field("guild_id"));
    }

    if RESERVED_GUILD_IDS.contains(&guild.guild_id.as_str())
        || guild.guild_id.contains(['/', '\\'])
        || guild.guild_id == "."
        || guild.guild_id == ".."
    {
        return Err(ConfigError::validation(format!(
            "Guild id cannot be used as a data directory name: {}",
            guild.guild_id
        )));
    }

    if guild.token.is_empty() {
        return Err(ConfigError::missing_field(format!(
            "{}.token",
            guild.guild_id
        )));
    }

    if guild.command_prefix.is_empty() {
        return Err(ConfigError::validation(format!(
            "Command prefix of guild {} cannot be empty",
            guild.guild_id
        )));
    }

    if guild.tick_ms == 0 {
        return Err(ConfigError::validation("tick_ms must be greater than 0"));
    }

    Ok(())
}
