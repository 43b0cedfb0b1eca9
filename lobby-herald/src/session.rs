//! Session data model.
//!
//! One `Session` exists per deployment. It is owned by the store task and
//! handed out to everyone else as a cloned snapshot.

use crate::registry::Subscribers;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exact length of a join code.
pub const CODE_LEN: usize = 14;

/// A Discord user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a message the bot posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a join code was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    #[error("code is empty")]
    Empty,

    #[error("code must be exactly 14 characters, got {0}")]
    WrongLength(usize),

    #[error("code may only contain letters and digits")]
    NotAlphanumeric,
}

/// A validated 14-character alphanumeric join code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinCode(String);

impl JoinCode {
    /// Validate a raw code. No trimming or case folding is applied.
    pub fn parse(raw: &str) -> Result<Self, CodeError> {
        if raw.is_empty() {
            return Err(CodeError::Empty);
        }
        let len = raw.chars().count();
        if len != CODE_LEN {
            return Err(CodeError::WrongLength(len));
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CodeError::NotAlphanumeric);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for JoinCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Occupancy of an active party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartyOccupancy {
    pub current: u32,
    pub max: u32,
}

impl PartyOccupancy {
    /// `None` unless `max >= 1`.
    pub fn new(current: u32, max: u32) -> Option<Self> {
        (max >= 1).then_some(Self { current, max })
    }

    pub fn is_full(&self) -> bool {
        self.current >= self.max
    }

    /// Parse the legacy `"current/max"` text encoding.
    pub fn parse_legacy(text: &str) -> Option<Self> {
        let (current, max) = text.split_once('/')?;
        Self::new(current.trim().parse().ok()?, max.trim().parse().ok()?)
    }

    /// `"current/max"`
    pub fn to_legacy(&self) -> String {
        format!("{}/{}", self.current, self.max)
    }
}

impl fmt::Display for PartyOccupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current, self.max)
    }
}

/// The single shared session record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub code: Option<JoinCode>,
    pub party: Option<PartyOccupancy>,
    pub last_changed_at: Option<DateTime<Utc>>,
    pub status_message: Option<MessageId>,
    pub ping_message: Option<MessageId>,
    pub subscribers: Subscribers,
}

impl Session {
    pub fn has_party(&self) -> bool {
        self.party.is_some()
    }

    /// Whether `other` differs in a field that counts as a session change
    /// (and therefore moves `last_changed_at`).
    pub fn tracked_fields_differ(&self, other: &Session) -> bool {
        self.code != other.code || self.party != other.party
    }
}
