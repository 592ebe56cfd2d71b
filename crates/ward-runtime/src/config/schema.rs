//! Configuration schema definitions.
//!
//! The file is either a bare array of guild sections or an object with an
//! optional `logging` section:
//!
//! ```json
//! {
//!   "logging": { "level": "debug" },
//!   "guilds": [
//!     {
//!       "guild_id": "1234",
//!       "token": "…",
//!       "command_prefix": "!",
//!       "plugins": { "ping": { "reply": "pong" }, "quotes": false },
//!       "apis": { "feed": { "url": "https://example.org/feed" } }
//!     }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WardConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// One section per hosted guild.
    #[serde(default)]
    pub guilds: Vec<GuildConfig>,
}

impl WardConfig {
    pub fn guild(&self, guild_id: &str) -> Option<&GuildConfig> {
        self.guilds.iter().find(|guild| guild.guild_id == guild_id)
    }
}

// =============================================================================
// Guilds
// =============================================================================

/// Configuration of one hosted guild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: String,

    /// Platform login token.
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Plugin sections by id. `false` disables a plugin.
    #[serde(default)]
    pub plugins: Map<String, Value>,

    /// Api sections by id. `false` disables an api.
    #[serde(default)]
    pub apis: Map<String, Value>,

    /// Root of the data directories.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Period of the host's update loop in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Daily backups to keep. `0` keeps all.
    #[serde(default)]
    pub keep_backups: usize,
}

impl GuildConfig {
    pub fn new(guild_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            token: token.into(),
            command_prefix: default_command_prefix(),
            plugins: Map::new(),
            apis: Map::new(),
            data_dir: default_data_dir(),
            tick_ms: default_tick_ms(),
            keep_backups: 0,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_plugin(mut self, id: impl Into<String>, section: Value) -> Self {
        self.plugins.insert(id.into(), section);
        self
    }

    pub fn with_api(mut self, id: impl Into<String>, section: Value) -> Self {
        self.apis.insert(id.into(), section);
        self
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// The object section for plugin `id`, if there is one.
    pub fn plugin_section(&self, id: &str) -> Option<&Value> {
        self.plugins.get(id).filter(|section| section.is_object())
    }

    pub fn api_section(&self, id: &str) -> Option<&Value> {
        self.apis.get(id).filter(|section| section.is_object())
    }

    pub fn is_plugin_disabled(&self, id: &str) -> bool {
        matches!(self.plugins.get(id), Some(Value::Bool(false)))
    }

    pub fn is_api_disabled(&self, id: &str) -> bool {
        matches!(self.apis.get(id), Some(Value::Bool(false)))
    }
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_tick_ms() -> u64 {
    100
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// When log files are rotated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file for [`LogOutput::File`].
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files to keep. `0` keeps all.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Per-target levels, e.g. `{"ward_runtime": "debug"}`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> usize {
    5
}
