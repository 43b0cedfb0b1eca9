//! Presence reconciliation.
//!
//! Each occupancy reading is diffed against the stored party. Equal readings
//! (including two absent ones) are dropped without side effects. Otherwise
//! the change is classified as an appearance, a resize or a departure.

use crate::lifecycle::MessageLifecycle;
use crate::session::{MessageId, PartyOccupancy};
use crate::store::{SessionStore, StoreClosed};

/// Classification of one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// No party before, one now.
    Appeared,
    /// Party active before and after with a different size.
    Resized,
    /// Party ended.
    Departed,
}

impl Transition {
    pub fn classify(old: Option<PartyOccupancy>, new: Option<PartyOccupancy>) -> Self {
        match (old, new) {
            (old, new) if old == new => Self::Unchanged,
            (None, Some(_)) => Self::Appeared,
            (Some(_), Some(_)) => Self::Resized,
            (_, None) => Self::Departed,
        }
    }
}

struct Applied {
    transition: Transition,
    /// Ping taken out of the session, to be deleted.
    stale_ping: Option<MessageId>,
    /// Whether a ping should be posted for the new party.
    wants_ping: bool,
}

/// Drives the session from presence readings.
#[derive(Clone)]
pub struct PresenceReconciler {
    store: SessionStore,
    lifecycle: MessageLifecycle,
}

impl PresenceReconciler {
    pub fn new(store: SessionStore, lifecycle: MessageLifecycle) -> Self {
        Self { store, lifecycle }
    }

    pub async fn reconcile(&self, reading: Option<PartyOccupancy>) -> Result<Transition, StoreClosed> {
        let committed = self
            .store
            .mutate(move |s| {
                let transition = Transition::classify(s.party, reading);
                let mut applied = Applied {
                    transition,
                    stale_ping: None,
                    wants_ping: false,
                };
                if transition == Transition::Unchanged {
                    return applied;
                }

                s.party = reading;
                match transition {
                    Transition::Departed => {
                        s.code = None;
                        applied.stale_ping = s.ping_message.take();
                    }
                    Transition::Appeared => {
                        // A ping left over from an earlier party is no longer accurate
                        applied.stale_ping = s.ping_message.take();
                        applied.wants_ping = s.code.is_none();
                    }
                    Transition::Resized | Transition::Unchanged => {}
                }
                applied
            })
            .await?;

        let applied = committed.output;
        if applied.transition == Transition::Unchanged {
            return Ok(Transition::Unchanged);
        }

        tracing::info!(
            transition = ?applied.transition,
            current = reading.map(|p| p.current),
            max = reading.map(|p| p.max),
            "Party changed"
        );

        if let Some(id) = applied.stale_ping {
            self.lifecycle.delete_ping(id).await;
        }

        if let (true, Some(party)) = (applied.wants_ping, reading) {
            if let Some(id) = self.lifecycle.create_ping(party).await {
                self.store_ping(id).await?;
            }
        }

        self.lifecycle.refresh_status().await?;
        Ok(applied.transition)
    }

    /// Keep a freshly posted ping only if it still applies.
    async fn store_ping(&self, id: MessageId) -> Result<(), StoreClosed> {
        let kept = self
            .store
            .mutate(move |s| {
                let applies = s.party.is_some() && s.code.is_none() && s.ping_message.is_none();
                if applies {
                    s.ping_message = Some(id);
                }
                applies
            })
            .await?
            .output;

        if !kept {
            tracing::debug!(message_id = %id, "Ping no longer applies, removing it");
            self.lifecycle.delete_ping(id).await;
        }
        Ok(())
    }
}
