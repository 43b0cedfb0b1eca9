//! Command handlers.
//!
//! `set` and `clear` are reserved for the owner. Everything else is public.
//! Every reply is ephemeral.

use crate::fanout::NotificationFanout;
use crate::lifecycle::MessageLifecycle;
use crate::presence::OwnerPresence;
use crate::registry::{SubscribeOutcome, UnsubscribeOutcome};
use crate::session::{CodeError, JoinCode, UserId};
use crate::store::{SessionStore, StoreClosed};
use std::sync::Arc;
use tracing::Instrument;

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { code: String, notify: bool },
    Clear,
    Info,
    Subscribe,
    Unsubscribe,
    Status,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Clear => "clear",
            Self::Info => "info",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Status => "status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub caller: UserId,
    pub command: Command,
}

/// Text shown only to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
}

impl Reply {
    fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Why a command was rejected. The session is unchanged in every case.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Only the session owner can use this command.")]
    NotOwner,

    #[error("Invalid code: {0}.")]
    InvalidCode(#[from] CodeError),

    #[error("There is no active party, so a code cannot be set.")]
    NoActiveParty,

    #[error("The bot is shutting down, try again later.")]
    Unavailable(#[from] StoreClosed),
}

pub struct CommandHandlers {
    owner: UserId,
    store: SessionStore,
    lifecycle: MessageLifecycle,
    fanout: NotificationFanout,
    presence: Arc<OwnerPresence>,
}

impl CommandHandlers {
    pub fn new(
        owner: UserId,
        store: SessionStore,
        lifecycle: MessageLifecycle,
        fanout: NotificationFanout,
        presence: Arc<OwnerPresence>,
    ) -> Self {
        Self {
            owner,
            store,
            lifecycle,
            fanout,
            presence,
        }
    }

    /// Run a command and produce the caller's reply.
    pub async fn handle(&self, invocation: Invocation) -> Reply {
        let name = invocation.command.name();
        let caller = invocation.caller;
        match self.execute(invocation).await {
            Ok(reply) => {
                tracing::info!(command = name, caller = %caller, "Command handled");
                reply
            }
            Err(e) => {
                tracing::warn!(command = name, caller = %caller, error = %e, "Command rejected");
                Reply::new(e.to_string())
            }
        }
    }

    async fn execute(&self, invocation: Invocation) -> Result<Reply, CommandError> {
        let caller = invocation.caller;
        match invocation.command {
            Command::Set { code, notify } => {
                self.require_owner(caller)?;
                self.set_code(&code, notify).await
            }
            Command::Clear => {
                self.require_owner(caller)?;
                self.clear_code().await
            }
            Command::Info => {
                let session = self.store.read().await?;
                Ok(Reply::new(self.lifecycle.renderer().info(&session, caller)))
            }
            Command::Subscribe => {
                let committed = self.store.mutate(move |s| s.subscribers.subscribe(caller)).await?;
                Ok(Reply::new(match committed.output {
                    SubscribeOutcome::Subscribed => {
                        "Subscribed. You will get a direct message when the code changes."
                    }
                    SubscribeOutcome::AlreadySubscribed => "You are already subscribed.",
                }))
            }
            Command::Unsubscribe => {
                let committed = self
                    .store
                    .mutate(move |s| s.subscribers.unsubscribe(caller))
                    .await?;
                Ok(Reply::new(match committed.output {
                    UnsubscribeOutcome::Unsubscribed => "Unsubscribed from code updates.",
                    UnsubscribeOutcome::NotSubscribed => "You were not subscribed.",
                }))
            }
            Command::Status => {
                let session = self.store.read().await?;
                let activity = self.presence.label().await;
                Ok(Reply::new(
                    self.lifecycle.renderer().status_dump(&session, &activity),
                ))
            }
        }
    }

    fn require_owner(&self, caller: UserId) -> Result<(), CommandError> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(CommandError::NotOwner)
        }
    }

    async fn set_code(&self, raw: &str, notify: bool) -> Result<Reply, CommandError> {
        let code = JoinCode::parse(raw)?;

        let new_code = code.clone();
        let committed = self
            .store
            .try_mutate(move |s| {
                if !s.has_party() {
                    return Err(CommandError::NoActiveParty);
                }
                let ping = s.ping_message.take();
                let previous = s.code.replace(new_code);
                Ok((previous, ping))
            })
            .await?;
        let (previous, ping) = committed.output;

        if let Some(id) = ping {
            self.lifecycle.delete_ping(id).await;
        }
        self.lifecycle.refresh_status().await?;

        let changed = previous.as_ref() != Some(&code);
        if !changed {
            return Ok(Reply::new(format!("Code is already `{code}`.")));
        }
        if !notify {
            return Ok(Reply::new(format!("Code set to `{code}`. Subscribers were not notified.")));
        }

        let recipients = committed.snapshot.subscribers.as_slice().to_vec();
        let text = format!(
            "Code set to `{code}`. Notifying {} subscriber(s).",
            recipients.len()
        );
        let fanout = self.fanout.clone();
        // Delivery runs off the event loop
        tokio::spawn(
            async move {
                fanout.notify_code_change(&code, &recipients).await;
            }
            .in_current_span(),
        );

        Ok(Reply::new(text))
    }

    async fn clear_code(&self) -> Result<Reply, CommandError> {
        let committed = self
            .store
            .mutate(|s| {
                let ping = s.ping_message.take();
                let previous = s.code.take();
                (previous, ping)
            })
            .await?;
        let (previous, ping) = committed.output;

        if let Some(id) = ping {
            self.lifecycle.delete_ping(id).await;
        }
        self.lifecycle.refresh_status().await?;

        Ok(Reply::new(match previous {
            Some(_) => "Code cleared.",
            None => "No code was set.",
        }))
    }
}
