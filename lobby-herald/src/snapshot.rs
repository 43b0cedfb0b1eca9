//! Durable snapshot layout and tolerant loading.
//!
//! The on-disk document is a flat JSON record:
//!
//! ```json
//! {
//!   "code": "72ARXMVCQG35Z6",
//!   "timestamp": 1718000000,
//!   "partyInfo": "2/4",
//!   "messageId": 1234,
//!   "pingMessageId": null,
//!   "subscribers": [111, 222]
//! }
//! ```
//!
//! Loading never fails. Each field that is missing or has the wrong shape
//! falls back to its default, and an unreadable document yields the default
//! session. Snake-case keys from older files are accepted as well.

use crate::registry::Subscribers;
use crate::session::{JoinCode, MessageId, PartyOccupancy, Session};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// The durable record, field for field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableSnapshot {
    pub code: Option<String>,
    pub timestamp: Option<i64>,
    pub party_info: Option<String>,
    pub message_id: Option<u64>,
    pub ping_message_id: Option<u64>,
    #[serde(default)]
    pub subscribers: Vec<u64>,
}

fn field<'a>(map: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    map.get(camel)
        .or_else(|| map.get(snake))
        .filter(|v| !v.is_null())
}

fn as_handle(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl DurableSnapshot {
    /// Capture the durable fields of a session.
    pub fn from_session(session: &Session) -> Self {
        Self {
            code: session.code.as_ref().map(|c| c.as_str().to_string()),
            timestamp: session.last_changed_at.map(|t| t.timestamp()),
            party_info: session.party.map(|p| p.to_legacy()),
            message_id: session.status_message.map(|m| m.0),
            ping_message_id: session.ping_message.map(|m| m.0),
            subscribers: session.subscribers.iter().map(|u| u.0).collect(),
        }
    }

    /// Rebuild a session, field by field.
    ///
    /// A code is only kept when a party is also present.
    pub fn into_session(self, raw_subscribers: Option<&[Value]>) -> Session {
        let party = self.party_info.as_deref().and_then(|text| {
            let parsed = PartyOccupancy::parse_legacy(text);
            if parsed.is_none() {
                tracing::warn!(party_info = %text, "Ignoring malformed stored party info");
            }
            parsed
        });

        let code = self.code.as_deref().and_then(|raw| match JoinCode::parse(raw) {
            Ok(code) => Some(code),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed stored code");
                None
            }
        });
        let code = match (code, party) {
            (Some(code), None) => {
                tracing::warn!(code = %code, "Dropping stored code without an active party");
                None
            }
            (code, _) => code,
        };

        let subscribers = match raw_subscribers {
            Some(raw) => Subscribers::from_raw_entries(raw),
            None => self
                .subscribers
                .iter()
                .map(|id| crate::session::UserId(*id))
                .collect(),
        };

        Session {
            code,
            party,
            last_changed_at: self
                .timestamp
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            status_message: self.message_id.map(MessageId),
            ping_message: self.ping_message_id.map(MessageId),
            subscribers,
        }
    }

    /// Read a session out of an arbitrary JSON document.
    pub fn session_from_value(value: &Value) -> Session {
        let Some(map) = value.as_object() else {
            tracing::error!("Stored session is not a JSON object, using defaults");
            return Session::default();
        };

        let text = |camel, snake| {
            field(map, camel, snake)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let snapshot = Self {
            code: text("code", "code"),
            timestamp: field(map, "timestamp", "timestamp").and_then(Value::as_i64),
            party_info: text("partyInfo", "party_info"),
            message_id: field(map, "messageId", "message_id").and_then(as_handle),
            ping_message_id: field(map, "pingMessageId", "ping_message_id").and_then(as_handle),
            subscribers: Vec::new(),
        };

        let raw_subscribers = field(map, "subscribers", "subscribers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        snapshot.into_session(Some(raw_subscribers))
    }
}

/// Load the last durable write, or the default session.
pub fn load_session(path: &Path) -> Session {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Data file not found, starting with an empty session");
            return Session::default();
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read data file, starting with an empty session");
            return Session::default();
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(value) => {
            let session = DurableSnapshot::session_from_value(&value);
            tracing::info!(
                path = %path.display(),
                has_code = session.code.is_some(),
                has_party = session.party.is_some(),
                subscribers = session.subscribers.len(),
                "Session loaded"
            );
            session
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to decode data file, resetting session");
            Session::default()
        }
    }
}
