//! Configuration validation.
//!
//! Every section is checked and all problems are reported together, so a
//! misconfigured deployment fails once with the full list.

use thiserror::Error;

use crate::config::{Config, DiscordConfig, LobbyConfig, ObservabilityConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn collect(errors: Vec<ValidationError>) -> ValidationResult<()> {
    let mut errors = errors;
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

fn missing(field: &str) -> ValidationError {
    ValidationError::MissingField {
        field: field.to_string(),
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        for result in [
            self.discord.validate(),
            self.lobby.validate(),
            self.observability.validate(),
        ] {
            match result {
                Ok(()) => {}
                Err(ValidationError::Multiple(inner)) => errors.extend(inner),
                Err(e) => errors.push(e),
            }
        }

        collect(errors)
    }

    /// Load with env overrides, then validate.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for DiscordConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.bot_token.trim().is_empty() {
            errors.push(missing("discord.bot_token"));
        }
        if self.owner_id == 0 {
            errors.push(missing("discord.owner_id"));
        }
        if self.channel_id == 0 {
            errors.push(missing("discord.channel_id"));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            errors.push(ValidationError::InvalidValue {
                field: "discord.api_base".into(),
                reason: format!("'{}' is not an http(s) URL", self.api_base),
            });
        }

        collect(errors)
    }
}

impl Validate for LobbyConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.tracked_game.trim().is_empty() {
            errors.push(missing("lobby.tracked_game"));
        }
        if self.debounce_ms == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "lobby.debounce_ms".into(),
                reason: "quiet period must be greater than zero".into(),
            });
        }
        if self.data_file.as_os_str().is_empty() {
            errors.push(missing("lobby.data_file"));
        }

        collect(errors)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of {valid_formats:?}"),
            });
        }
        Ok(())
    }
}
