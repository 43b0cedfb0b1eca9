//! Rendering of the status message and the bot's text replies.
//!
//! Everything here is a pure function of a session snapshot. Refreshes always
//! render from the current snapshot, never from a captured earlier value.

use crate::session::{JoinCode, PartyOccupancy, Session, UserId};

/// Placeholder for absent values.
pub const NONE_TEXT: &str = "none";

/// Status coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    /// No active party.
    Neutral,
    /// Party active with room left.
    Available,
    /// Party active and full.
    Full,
}

impl StatusColor {
    pub fn for_party(party: Option<PartyOccupancy>) -> Self {
        match party {
            None => Self::Neutral,
            Some(p) if p.is_full() => Self::Full,
            Some(_) => Self::Available,
        }
    }

    /// RGB value used by the Discord embed.
    pub fn rgb(&self) -> u32 {
        match self {
            Self::Neutral => 0x5865F2,
            Self::Available => 0x2ECC71,
            Self::Full => 0xE74C3C,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusField {
    pub name: String,
    pub value: String,
}

/// Rendered form of the status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub title: String,
    pub color: StatusColor,
    pub fields: Vec<StatusField>,
}

impl StatusView {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

pub const FIELD_CODE: &str = "Current Code";
pub const FIELD_PARTY: &str = "Party Status";
pub const FIELD_UPDATED: &str = "Last Updated";

/// `"c/m (available)"`, `"c/m (full)"` or `"none"`.
pub fn party_text(party: Option<PartyOccupancy>) -> String {
    match party {
        Some(p) if p.is_full() => format!("{p} (full)"),
        Some(p) => format!("{p} (available)"),
        None => NONE_TEXT.to_string(),
    }
}

fn code_text(code: Option<&JoinCode>) -> String {
    code.map_or_else(|| NONE_TEXT.to_string(), |c| c.as_str().to_string())
}

/// Builds everything the bot shows to people.
#[derive(Debug, Clone)]
pub struct Renderer {
    game: String,
    owner: UserId,
}

impl Renderer {
    pub fn new(game: impl Into<String>, owner: UserId) -> Self {
        Self {
            game: game.into(),
            owner,
        }
    }

    /// Status message for a snapshot.
    pub fn status(&self, session: &Session) -> StatusView {
        let mut fields = vec![
            StatusField {
                name: FIELD_CODE.to_string(),
                value: code_text(session.code.as_ref()),
            },
            StatusField {
                name: FIELD_PARTY.to_string(),
                value: party_text(session.party),
            },
        ];
        if let Some(changed) = session.last_changed_at {
            fields.push(StatusField {
                name: FIELD_UPDATED.to_string(),
                value: format!("<t:{}:f>", changed.timestamp()),
            });
        }

        StatusView {
            title: format!("{} Direct Connection", self.game),
            color: StatusColor::for_party(session.party),
            fields,
        }
    }

    /// Ping asking the owner to publish a code.
    pub fn ping(&self, party: PartyOccupancy) -> String {
        format!(
            "<@{}> a {} party is up ({party}). Please set the direct connection code with `/party set`.",
            self.owner, self.game
        )
    }

    /// Direct notification sent to subscribers.
    pub fn notification(&self, code: &JoinCode) -> String {
        format!(
            "New {} direct connection code: `{}`",
            self.game,
            code.as_str()
        )
    }

    /// Reply to `info`.
    pub fn info(&self, session: &Session, caller: UserId) -> String {
        let hint = if session.subscribers.contains(caller) {
            "You are subscribed to code updates. Use `/party unsubscribe` to stop."
        } else {
            "Use `/party subscribe` to get a direct message when the code changes."
        };
        format!(
            "**Code:** {}\n**Party:** {}\n{hint}",
            code_text(session.code.as_ref()),
            party_text(session.party),
        )
    }

    /// Reply to `status`.
    pub fn status_dump(&self, session: &Session, activity: &str) -> String {
        let subscribers = if session.subscribers.is_empty() {
            NONE_TEXT.to_string()
        } else {
            session
                .subscribers
                .iter()
                .map(|u| format!("<@{u}>"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let updated = session
            .last_changed_at
            .map_or_else(|| NONE_TEXT.to_string(), |t| format!("<t:{}:f>", t.timestamp()));

        format!(
            "**Owner:** <@{owner}>\n\
             **Subscribers ({count}):** {subscribers}\n\
             **Owner activity:** {activity}\n\
             **Code:** {code}\n\
             **Party:** {party}\n\
             **Last updated:** {updated}\n\
             **Version:** {version}",
            owner = self.owner,
            count = session.subscribers.len(),
            code = code_text(session.code.as_ref()),
            party = party_text(session.party),
            version = env!("CARGO_PKG_VERSION"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn renderer() -> Renderer {
        Renderer::new("Baldur's Gate 3", UserId(42))
    }

    #[test]
    fn empty_session_renders_neutral() {
        let view = renderer().status(&Session::default());
        assert_eq!(view.color, StatusColor::Neutral);
        assert_eq!(view.field(FIELD_CODE), Some("none"));
        assert_eq!(view.field(FIELD_PARTY), Some("none"));
        assert_eq!(view.field(FIELD_UPDATED), None);
    }

    #[test]
    fn coloring_follows_fullness() {
        let open = Session {
            party: PartyOccupancy::new(1, 4),
            ..Session::default()
        };
        let full = Session {
            party: PartyOccupancy::new(4, 4),
            ..Session::default()
        };
        let r = renderer();
        assert_eq!(r.status(&open).color, StatusColor::Available);
        assert_eq!(r.status(&open).field(FIELD_PARTY), Some("1/4 (available)"));
        assert_eq!(r.status(&full).color, StatusColor::Full);
        assert_eq!(r.status(&full).field(FIELD_PARTY), Some("4/4 (full)"));
    }

    #[test]
    fn code_and_timestamp_fields() {
        let session = Session {
            code: JoinCode::parse("AAAA11BBBB22CC").ok(),
            party: PartyOccupancy::new(2, 4),
            last_changed_at: Utc.timestamp_opt(1_718_000_000, 0).single(),
            ..Session::default()
        };
        let view = renderer().status(&session);
        assert_eq!(view.field(FIELD_CODE), Some("AAAA11BBBB22CC"));
        assert_eq!(view.field(FIELD_UPDATED), Some("<t:1718000000:f>"));
    }

    #[test]
    fn ping_mentions_owner_and_party() {
        let text = renderer().ping(PartyOccupancy::new(1, 4).unwrap());
        assert!(text.contains("<@42>"));
        assert!(text.contains("1/4"));
        assert!(text.contains("/party set"));
    }

    #[test]
    fn notification_states_code() {
        let code = JoinCode::parse("AAAA11BBBB22CC").unwrap();
        assert!(renderer().notification(&code).contains("AAAA11BBBB22CC"));
    }

    #[test]
    fn info_hint_depends_on_subscription() {
        let mut session = Session::default();
        let r = renderer();
        assert!(r.info(&session, UserId(7)).contains("/party subscribe"));
        session.subscribers.subscribe(UserId(7));
        assert!(r.info(&session, UserId(7)).contains("/party unsubscribe"));
    }

    #[test]
    fn status_dump_lists_everything() {
        let mut session = Session::default();
        session.subscribers.subscribe(UserId(5));
        let text = renderer().status_dump(&session, "Baldur's Gate 3");
        assert!(text.contains("<@42>"));
        assert!(text.contains("<@5>"));
        assert!(text.contains("**Owner activity:** Baldur's Gate 3"));
        assert!(text.contains(env!("CARGO_PKG_VERSION")));
    }
}
