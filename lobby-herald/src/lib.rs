//! Lobby Herald - Discord announcements for a game lobby.
//!
//! The herald follows the owner's presence, keeps one status message in the
//! announcement channel up to date with the party occupancy and the direct
//! connection code, and sends the code to subscribers when it changes.
//!
//! ## Architecture
//!
//! ```text
//! Discord gateway → BotEvent → LobbyBot ─┬→ PresenceReconciler ─┐
//!                                        └→ CommandHandlers ────┤
//!                                                               ↓
//!             DebouncedPersister ← SessionStore ← MessageLifecycle / Fanout → Discord REST
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod bot;
pub mod commands;
pub mod discord;
pub mod fanout;
pub mod lifecycle;
pub mod persist;
pub mod platform;
pub mod presence;
pub mod reconciler;
pub mod registry;
pub mod render;
pub mod session;
pub mod snapshot;
pub mod store;

// Re-export commonly used types
pub use bot::{BotEvent, LobbyBot};
pub use commands::{Command, CommandError, CommandHandlers, Invocation, Reply};
pub use discord::gateway::Gateway;
pub use discord::DiscordRest;
pub use fanout::{FanoutReport, NotificationFanout};
pub use lifecycle::{MessageLifecycle, RefreshOutcome};
pub use persist::{DebouncedPersister, JsonFileSink, SnapshotSink};
pub use platform::{ChatPlatform, CommandSurface, InteractionRef, PlatformError, PlatformResult};
pub use presence::{Activity, OwnerPresence};
pub use reconciler::{PresenceReconciler, Transition};
pub use render::{Renderer, StatusColor, StatusView};
pub use session::{JoinCode, MessageId, PartyOccupancy, Session, UserId};
pub use store::{SessionStore, StoreClosed};

use lobby_common::config::Config;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Background tasks of the session core.
pub struct Herald {
    pub store: SessionStore,
    pub persister: DebouncedPersister,
    tasks: Vec<JoinHandle<()>>,
}

impl Herald {
    /// Wire the session core against the given platform and durable sink.
    pub fn assemble(
        config: &Config,
        initial: Session,
        platform: Arc<dyn ChatPlatform>,
        surface: Arc<dyn CommandSurface>,
        sink: Arc<dyn SnapshotSink>,
    ) -> (Self, LobbyBot) {
        let owner = UserId(config.discord.owner_id);
        let game = config.lobby.tracked_game.clone();

        let (persister, persist_task) = DebouncedPersister::spawn(sink, config.lobby.debounce());
        let (store, store_task) = SessionStore::spawn(initial, persister.clone());

        let renderer = Renderer::new(game.clone(), owner);
        let lifecycle = MessageLifecycle::new(platform.clone(), store.clone(), renderer.clone());
        let fanout = NotificationFanout::new(platform, renderer);
        let presence = Arc::new(OwnerPresence::new());
        let reconciler = PresenceReconciler::new(store.clone(), lifecycle.clone());
        let handlers = CommandHandlers::new(
            owner,
            store.clone(),
            lifecycle.clone(),
            fanout,
            presence.clone(),
        );
        let bot = LobbyBot::new(owner, game, presence, reconciler, lifecycle, handlers, surface);

        let herald = Self {
            store,
            persister,
            tasks: vec![persist_task, store_task],
        };
        (herald, bot)
    }

    /// Stop the background tasks, writing any pending snapshot first.
    pub async fn shutdown(self) -> lobby_common::Result<()> {
        let result = self.persister.flush().await;
        for task in self.tasks {
            task.abort();
        }
        result
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
    }
    Ok(())
}

/// Run the herald against Discord until a shutdown signal arrives.
pub async fn start_bot(config: &Config) -> anyhow::Result<()> {
    let initial = snapshot::load_session(&config.lobby.data_file);
    let sink = Arc::new(JsonFileSink::new(&config.lobby.data_file));
    let rest = Arc::new(DiscordRest::new(&config.discord));

    let (herald, bot) = Herald::assemble(config, initial, rest.clone(), rest.clone(), sink);

    let (events_tx, events_rx) = mpsc::channel(256);
    let gateway = Gateway::new(rest, config.discord.gateway_intents, events_tx);
    let gateway_task = tokio::spawn(gateway.run());
    let mut bot_task = tokio::spawn(bot.run(events_rx));

    tracing::info!(
        channel_id = config.discord.channel_id,
        data_file = %config.lobby.data_file.display(),
        "Lobby herald running"
    );

    tokio::select! {
        result = shutdown_signal() => result?,
        _ = &mut bot_task => tracing::warn!("Event loop exited"),
    }

    gateway_task.abort();
    bot_task.abort();

    herald.shutdown().await?;
    tracing::info!("Lobby herald stopped");
    Ok(())
}
