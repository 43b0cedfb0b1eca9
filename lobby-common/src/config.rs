//! Configuration management for the lobby herald.
//!
//! The service reads a single configuration file at `~/.lobby-herald/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Discord
//! - `DISCORD_TOKEN` → discord.bot_token
//! - `USER_ID` → discord.owner_id
//! - `CHANNEL_ID` → discord.channel_id
//! - `GUILD_ID` → discord.guild_id
//!
//! ## Lobby
//! - `LOBBY_TRACKED_GAME` → lobby.tracked_game
//! - `LOBBY_DATA_FILE` → lobby.data_file
//! - `LOBBY_DEBOUNCE_MS` → lobby.debounce_ms
//!
//! ## Observability
//! - `LOBBY_LOG_LEVEL` → observability.log_level
//! - `LOBBY_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".lobby-herald"),
        |dirs| dirs.home_dir().join(".lobby-herald"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Discord Configuration
// ============================================================================

/// Discord connection and addressing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token used for both REST and the gateway.
    #[serde(default)]
    pub bot_token: String,

    /// The party owner. Only this user may set or clear the code, and only
    /// this user's presence is tracked.
    #[serde(default)]
    pub owner_id: u64,

    /// Channel that carries the status and ping announcements.
    #[serde(default)]
    pub channel_id: u64,

    /// Guild to register slash commands in. Commands are registered globally
    /// when absent.
    #[serde(default)]
    pub guild_id: Option<u64>,

    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Gateway intents (GUILDS | GUILD_MEMBERS | GUILD_PRESENCES)
    #[serde(default = "default_gateway_intents")]
    pub gateway_intents: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            owner_id: 0,
            channel_id: 0,
            guild_id: None,
            api_base: default_api_base(),
            gateway_intents: default_gateway_intents(),
        }
    }
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".into()
}

fn default_gateway_intents() -> u64 {
    1 | (1 << 1) | (1 << 8)
}

// ============================================================================
// Lobby Configuration
// ============================================================================

/// What to track and where to keep it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyConfig {
    /// Activity name whose party size is tracked.
    #[serde(default = "default_tracked_game")]
    pub tracked_game: String,

    /// Durable session snapshot location.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Quiet period before a coalesced snapshot write, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            tracked_game: default_tracked_game(),
            data_file: default_data_file(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl LobbyConfig {
    /// Quiet period as a `Duration`.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_tracked_game() -> String {
    "Baldur's Gate 3".into()
}

fn default_data_file() -> PathBuf {
    PathBuf::from("code_data.json")
}

fn default_debounce_ms() -> u64 {
    2_000
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Aliases: "level" for backward compatibility with existing config files
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    /// Aliases: "format" for backward compatibility with existing config files
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to quiet down to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub lobby: LobbyConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Values that fail to parse are ignored and the file value is kept.
    pub fn apply_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("DISCORD_TOKEN") {
            self.discord.bot_token = token;
        }
        if let Some(id) = lookup("USER_ID").and_then(|v| v.trim().parse().ok()) {
            self.discord.owner_id = id;
        }
        if let Some(id) = lookup("CHANNEL_ID").and_then(|v| v.trim().parse().ok()) {
            self.discord.channel_id = id;
        }
        if let Some(id) = lookup("GUILD_ID").and_then(|v| v.trim().parse().ok()) {
            self.discord.guild_id = Some(id);
        }

        if let Some(game) = lookup("LOBBY_TRACKED_GAME") {
            self.lobby.tracked_game = game;
        }
        if let Some(path) = lookup("LOBBY_DATA_FILE") {
            self.lobby.data_file = PathBuf::from(path);
        }
        if let Some(ms) = lookup("LOBBY_DEBOUNCE_MS").and_then(|v| v.trim().parse().ok()) {
            self.lobby.debounce_ms = ms;
        }

        if let Some(level) = lookup("LOBBY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("LOBBY_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.discord.api_base, "https://discord.com/api/v10");
        assert_eq!(config.discord.gateway_intents, 259);
        assert_eq!(config.lobby.tracked_game, "Baldur's Gate 3");
        assert_eq!(config.lobby.data_file, PathBuf::from("code_data.json"));
        assert_eq!(config.lobby.debounce(), Duration::from_secs(2));
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let json = r#"{ "discord": { "bot_token": "abc", "owner_id": 42, "channel_id": 7 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.discord.bot_token, "abc");
        assert_eq!(config.discord.owner_id, 42);
        assert!(config.discord.guild_id.is_none());
        assert_eq!(config.lobby.debounce_ms, 2_000);
    }

    #[test]
    fn test_observability_aliases() {
        let json = r#"{ "observability": { "level": "debug", "format": "json" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("DISCORD_TOKEN", "token-from-env"),
            ("USER_ID", "123456789"),
            ("CHANNEL_ID", " 987654321 "),
            ("LOBBY_DEBOUNCE_MS", "250"),
            ("LOBBY_LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_with(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.discord.bot_token, "token-from-env");
        assert_eq!(config.discord.owner_id, 123_456_789);
        assert_eq!(config.discord.channel_id, 987_654_321);
        assert_eq!(config.lobby.debounce_ms, 250);
        assert_eq!(config.observability.log_level, "warn");
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let mut config = Config::default();
        config.discord.owner_id = 5;
        config.apply_overrides_with(|key| (key == "USER_ID").then(|| "not-a-number".to_string()));
        assert_eq!(config.discord.owner_id, 5);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "lobby": { "tracked_game": "Divinity" } }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.lobby.tracked_game, "Divinity");
    }

    #[test]
    fn test_load_from_invalid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
