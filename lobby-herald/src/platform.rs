//! Outbound seams to the chat platform.
//!
//! The session core only talks to the platform through these traits. The
//! Discord adapter implements them for production; tests use recording fakes.

use crate::render::StatusView;
use crate::session::{MessageId, UserId};
use async_trait::async_trait;

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Platform error taxonomy, already mapped from platform-specific codes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl PlatformError {
    /// Outcomes that count as "the message is gone or cannot be touched".
    pub fn is_stale_handle(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Forbidden(_))
    }
}

/// Announcement channel and direct messages.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Post a new status announcement.
    async fn send_status(&self, view: &StatusView) -> PlatformResult<MessageId>;

    /// Replace the content of an existing status announcement.
    async fn edit_status(&self, id: MessageId, view: &StatusView) -> PlatformResult<()>;

    /// Post a plain text announcement.
    async fn send_text(&self, text: &str) -> PlatformResult<MessageId>;

    /// Delete an announcement.
    async fn delete_message(&self, id: MessageId) -> PlatformResult<()>;

    /// Send a direct message to one user.
    async fn send_direct(&self, user: UserId, text: &str) -> PlatformResult<()>;
}

/// Identifies an interaction that is waiting for a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRef {
    pub id: String,
    pub token: String,
}

/// Slash-command surface: registration and ephemeral replies.
#[async_trait]
pub trait CommandSurface: Send + Sync {
    /// Register the command set for this application.
    async fn register_commands(&self, application_id: u64) -> PlatformResult<()>;

    /// Reply to an interaction, visible only to the caller.
    async fn reply_ephemeral(&self, interaction: &InteractionRef, text: &str) -> PlatformResult<()>;
}
