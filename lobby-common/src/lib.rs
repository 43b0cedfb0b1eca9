//! Lobby Common - Shared configuration, errors and logging for the lobby herald.
//!
//! This crate provides:
//! - Configuration types, loading and environment overrides
//! - Configuration validation
//! - The shared error type
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{Config, DiscordConfig, LobbyConfig, ObservabilityConfig};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

