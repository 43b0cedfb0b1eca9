//! Event loop.
//!
//! Gateway events arrive over a channel and are processed one at a time by a
//! single task, in arrival order.

use crate::commands::{CommandHandlers, Invocation};
use crate::lifecycle::MessageLifecycle;
use crate::platform::{CommandSurface, InteractionRef};
use crate::presence::{party_from_activities, Activity, OwnerPresence};
use crate::reconciler::PresenceReconciler;
use crate::session::UserId;
use lobby_common::event_span;
use lobby_common::logging::generate_trace_id;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Normalized gateway event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    /// The gateway session is ready.
    Ready { application_id: u64 },
    /// A member's activities changed.
    Presence {
        user_id: UserId,
        activities: Vec<Activity>,
    },
    /// A slash command was invoked.
    Command {
        interaction: InteractionRef,
        invocation: Invocation,
    },
}

impl BotEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Presence { .. } => "presence",
            Self::Command { .. } => "command",
        }
    }
}

pub struct LobbyBot {
    owner: UserId,
    tracked_game: String,
    presence: Arc<OwnerPresence>,
    reconciler: PresenceReconciler,
    lifecycle: MessageLifecycle,
    handlers: CommandHandlers,
    surface: Arc<dyn CommandSurface>,
}

impl LobbyBot {
    pub fn new(
        owner: UserId,
        tracked_game: impl Into<String>,
        presence: Arc<OwnerPresence>,
        reconciler: PresenceReconciler,
        lifecycle: MessageLifecycle,
        handlers: CommandHandlers,
        surface: Arc<dyn CommandSurface>,
    ) -> Self {
        Self {
            owner,
            tracked_game: tracked_game.into(),
            presence,
            reconciler,
            lifecycle,
            handlers,
            surface,
        }
    }

    /// Process events until the sending side goes away.
    pub async fn run(self, mut events: mpsc::Receiver<BotEvent>) {
        tracing::info!(owner = %self.owner, game = %self.tracked_game, "Event loop started");

        while let Some(event) = events.recv().await {
            let span = event_span!(event.kind(), generate_trace_id());
            self.handle(event).instrument(span).await;
        }

        tracing::info!("Event loop stopped");
    }

    /// Process one event to completion.
    pub async fn handle(&self, event: BotEvent) {
        match event {
            BotEvent::Ready { application_id } => {
                if let Err(e) = self.surface.register_commands(application_id).await {
                    tracing::error!(error = %e, "Failed to register commands");
                }
                if let Err(e) = self.lifecycle.refresh_status().await {
                    tracing::error!(error = %e, "Startup refresh failed");
                }
            }
            BotEvent::Presence {
                user_id,
                activities,
            } => {
                if user_id != self.owner {
                    return;
                }
                self.presence.update(&activities).await;
                let reading = party_from_activities(&activities, &self.tracked_game);
                match self.reconciler.reconcile(reading).await {
                    Ok(transition) => tracing::debug!(?transition, "Presence reconciled"),
                    Err(e) => tracing::error!(error = %e, "Presence reconciliation failed"),
                }
            }
            BotEvent::Command {
                interaction,
                invocation,
            } => {
                let reply = self.handlers.handle(invocation).await;
                if let Err(e) = self.surface.reply_ephemeral(&interaction, &reply.text).await {
                    tracing::error!(error = %e, "Failed to reply to interaction");
                }
            }
        }
    }
}
