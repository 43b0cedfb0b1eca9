//! Status and ping message lifecycle.
//!
//! The status message is create-or-edit: an existing handle is edited in
//! place, and a handle that points at a deleted or untouchable message is
//! dropped and replaced by a freshly created message.

use crate::platform::{ChatPlatform, PlatformError};
use crate::render::Renderer;
use crate::session::{MessageId, PartyOccupancy};
use crate::store::{SessionStore, StoreClosed};
use std::sync::Arc;

/// What a refresh ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Edited(MessageId),
    Created(MessageId),
    /// Nothing could be posted this cycle. The next trigger retries.
    Abandoned,
}

/// Owns the announcement messages the bot posts.
#[derive(Clone)]
pub struct MessageLifecycle {
    platform: Arc<dyn ChatPlatform>,
    store: SessionStore,
    renderer: Renderer,
}

impl MessageLifecycle {
    pub fn new(platform: Arc<dyn ChatPlatform>, store: SessionStore, renderer: Renderer) -> Self {
        Self {
            platform,
            store,
            renderer,
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Bring the status message in line with the current session.
    pub async fn refresh_status(&self) -> Result<RefreshOutcome, StoreClosed> {
        let mut session = self.store.read().await?;

        if let Some(id) = session.status_message {
            let view = self.renderer.status(&session);
            match self.platform.edit_status(id, &view).await {
                Ok(()) => {
                    tracing::debug!(message_id = %id, "Status message edited");
                    return Ok(RefreshOutcome::Edited(id));
                }
                Err(e) if e.is_stale_handle() => {
                    tracing::warn!(message_id = %id, error = %e, "Status message is gone, recreating");
                    let committed = self
                        .store
                        .mutate(move |s| {
                            if s.status_message == Some(id) {
                                s.status_message = None;
                            }
                        })
                        .await?;
                    session = committed.snapshot;

                    // Handle was replaced while the edit was in flight
                    if let Some(current) = session.status_message {
                        let view = self.renderer.status(&session);
                        return match self.platform.edit_status(current, &view).await {
                            Ok(()) => Ok(RefreshOutcome::Edited(current)),
                            Err(e) => {
                                tracing::error!(message_id = %current, error = %e, "Failed to edit status message");
                                Ok(RefreshOutcome::Abandoned)
                            }
                        };
                    }
                }
                Err(e) => {
                    tracing::error!(message_id = %id, error = %e, "Failed to edit status message");
                    return Ok(RefreshOutcome::Abandoned);
                }
            }
        }

        let view = self.renderer.status(&session);
        match self.platform.send_status(&view).await {
            Ok(id) => {
                self.store.mutate(move |s| s.status_message = Some(id)).await?;
                tracing::info!(message_id = %id, "Status message created");
                Ok(RefreshOutcome::Created(id))
            }
            Err(PlatformError::Forbidden(reason)) => {
                tracing::error!(reason = %reason, "Missing permission to post the status message");
                Ok(RefreshOutcome::Abandoned)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to post the status message");
                Ok(RefreshOutcome::Abandoned)
            }
        }
    }

    /// Post a ping asking the owner for a code.
    pub async fn create_ping(&self, party: PartyOccupancy) -> Option<MessageId> {
        match self.platform.send_text(&self.renderer.ping(party)).await {
            Ok(id) => {
                tracing::info!(message_id = %id, current = party.current, max = party.max, "Ping posted");
                Some(id)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to post ping");
                None
            }
        }
    }

    /// Best-effort delete. A message that is already gone or cannot be
    /// touched counts as deleted.
    pub async fn delete_ping(&self, id: MessageId) {
        match self.platform.delete_message(id).await {
            Ok(()) => tracing::debug!(message_id = %id, "Ping deleted"),
            Err(e) if e.is_stale_handle() => {
                tracing::debug!(message_id = %id, error = %e, "Ping already gone")
            }
            Err(e) => tracing::warn!(message_id = %id, error = %e, "Failed to delete ping"),
        }
    }
}
