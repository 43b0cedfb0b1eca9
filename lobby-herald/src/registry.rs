//! Subscriber registry.
//!
//! Subscribers are kept in insertion order without duplicates.

use crate::session::UserId;
use serde_json::Value;

/// Result of a subscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
}

/// Result of an unsubscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotSubscribed,
}

/// Ordered set of subscriber identities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscribers(Vec<UserId>);

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.0.contains(&id)
    }

    pub fn subscribe(&mut self, id: UserId) -> SubscribeOutcome {
        if self.contains(id) {
            return SubscribeOutcome::AlreadySubscribed;
        }
        self.0.push(id);
        SubscribeOutcome::Subscribed
    }

    pub fn unsubscribe(&mut self, id: UserId) -> UnsubscribeOutcome {
        match self.0.iter().position(|s| *s == id) {
            Some(idx) => {
                self.0.remove(idx);
                UnsubscribeOutcome::Unsubscribed
            }
            None => UnsubscribeOutcome::NotSubscribed,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = UserId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[UserId] {
        &self.0
    }

    /// Build from raw durable entries.
    ///
    /// Integers and numeric strings are accepted; anything else is dropped.
    /// Duplicates keep their first position.
    pub fn from_raw_entries(entries: &[Value]) -> Self {
        let mut subscribers = Self::new();
        for entry in entries {
            match normalize_entry(entry) {
                Some(id) => {
                    subscribers.subscribe(id);
                }
                None => tracing::debug!(entry = %entry, "Dropping unreadable subscriber entry"),
            }
        }
        subscribers
    }
}

impl FromIterator<UserId> for Subscribers {
    fn from_iter<I: IntoIterator<Item = UserId>>(iter: I) -> Self {
        let mut subscribers = Self::new();
        for id in iter {
            subscribers.subscribe(id);
        }
        subscribers
    }
}

fn normalize_entry(entry: &Value) -> Option<UserId> {
    match entry {
        Value::Number(n) => n.as_u64().map(UserId),
        Value::String(s) => s.trim().parse().ok().map(UserId),
        _ => None,
    }
}
