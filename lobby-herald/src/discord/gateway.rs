//! Discord gateway connection.
//!
//! Opens the WebSocket, identifies, keeps the heartbeat going and forwards
//! normalized dispatches to the event loop. Dropped connections are retried
//! with capped exponential backoff.

use super::format::COMMAND_GROUP;
use super::DiscordRest;
use crate::bot::BotEvent;
use crate::commands::{Command, Invocation};
use crate::platform::{InteractionRef, PlatformError, PlatformResult};
use crate::presence::Activity;
use crate::session::UserId;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;

/// Interaction type for slash commands.
const APPLICATION_COMMAND: u64 = 2;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn snowflake(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Party size as `(current, max)`.
///
/// Accepts `[current, max]` or `{"current": .., "max": ..}`, with integer or
/// numeric-string members. Anything else is no party size.
pub fn parse_party_size(size: &Value) -> Option<(u32, u32)> {
    match size {
        Value::Array(items) if items.len() == 2 => Some((as_u32(&items[0])?, as_u32(&items[1])?)),
        Value::Object(map) => Some((as_u32(map.get("current")?)?, as_u32(map.get("max")?)?)),
        _ => None,
    }
}

/// Activities of a presence payload, in payload order.
pub fn parse_activities(presence: &Value) -> Vec<Activity> {
    presence
        .get("activities")
        .and_then(Value::as_array)
        .map(|activities| {
            activities
                .iter()
                .filter_map(|a| {
                    let name = a.get("name").and_then(Value::as_str)?;
                    Some(Activity {
                        name: name.to_string(),
                        party_size: a
                            .get("party")
                            .and_then(|p| p.get("size"))
                            .and_then(parse_party_size),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn presence_event(presence: &Value) -> Option<BotEvent> {
    let user_id = snowflake(presence.get("user").and_then(|u| u.get("id")))?;
    Some(BotEvent::Presence {
        user_id: UserId(user_id),
        activities: parse_activities(presence),
    })
}

fn option<'a>(options: &'a [Value], name: &str) -> Option<&'a Value> {
    options
        .iter()
        .find(|o| o.get("name").and_then(Value::as_str) == Some(name))
        .and_then(|o| o.get("value"))
}

/// Slash command invocation out of an interaction payload.
pub fn parse_interaction(d: &Value) -> Option<BotEvent> {
    if d.get("type").and_then(Value::as_u64) != Some(APPLICATION_COMMAND) {
        return None;
    }
    let data = d.get("data")?;
    if data.get("name").and_then(Value::as_str) != Some(COMMAND_GROUP) {
        return None;
    }

    let caller = snowflake(
        d.get("member")
            .and_then(|m| m.get("user"))
            .or_else(|| d.get("user"))
            .and_then(|u| u.get("id")),
    )?;

    let sub = data.get("options").and_then(Value::as_array)?.first()?;
    let sub_options = sub
        .get("options")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let command = match sub.get("name").and_then(Value::as_str)? {
        "set" => Command::Set {
            code: option(sub_options, "code")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            notify: option(sub_options, "notify")
                .and_then(Value::as_bool)
                .unwrap_or(true),
        },
        "clear" => Command::Clear,
        "info" => Command::Info,
        "subscribe" => Command::Subscribe,
        "unsubscribe" => Command::Unsubscribe,
        "status" => Command::Status,
        other => {
            tracing::warn!(subcommand = other, "Unknown subcommand");
            return None;
        }
    };

    Some(BotEvent::Command {
        interaction: InteractionRef {
            id: d.get("id").and_then(Value::as_str)?.to_string(),
            token: d.get("token").and_then(Value::as_str)?.to_string(),
        },
        invocation: Invocation {
            caller: UserId(caller),
            command,
        },
    })
}

/// Normalize one dispatch into zero or more events.
pub fn parse_dispatch(event_type: &str, d: &Value) -> Vec<BotEvent> {
    match event_type {
        "READY" => snowflake(d.get("application").and_then(|a| a.get("id")))
            .map(|application_id| BotEvent::Ready { application_id })
            .into_iter()
            .collect(),
        "GUILD_CREATE" => d
            .get("presences")
            .and_then(Value::as_array)
            .map(|presences| presences.iter().filter_map(presence_event).collect())
            .unwrap_or_default(),
        "PRESENCE_UPDATE" => presence_event(d).into_iter().collect(),
        "INTERACTION_CREATE" => parse_interaction(d).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Next reconnect delay.
pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

pub struct Gateway {
    rest: Arc<DiscordRest>,
    intents: u64,
    events: mpsc::Sender<BotEvent>,
}

impl Gateway {
    pub fn new(rest: Arc<DiscordRest>, intents: u64, events: mpsc::Sender<BotEvent>) -> Self {
        Self {
            rest,
            intents,
            events,
        }
    }

    /// Stay connected until the event loop goes away.
    pub async fn run(self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.connect_once().await {
                Ok(true) => backoff = INITIAL_BACKOFF,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "Discord gateway connection failed"),
            }
            if self.events.is_closed() {
                tracing::info!("Event loop closed, stopping gateway");
                return;
            }
            tracing::warn!(delay_secs = backoff.as_secs(), "Discord gateway reconnecting");
            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff);
        }
    }

    /// One connection lifetime. Returns whether the session reached READY.
    async fn connect_once(&self) -> PlatformResult<bool> {
        let gw_url = self.rest.gateway_url().await?;
        let ws_url = format!("{gw_url}/?v=10&encoding=json");
        tracing::info!("Discord: connecting to gateway...");

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .map_err(|e| PlatformError::Transport(format!("WebSocket connection failed: {e}")))?;
        let (mut write, mut read) = ws_stream.split();

        // Hello (opcode 10)
        let hello = read
            .next()
            .await
            .ok_or_else(|| PlatformError::Transport("No hello from gateway".into()))?
            .map_err(|e| PlatformError::Transport(format!("WebSocket error: {e}")))?;
        let hello: Value = serde_json::from_str(&hello.to_string())
            .map_err(|e| PlatformError::InvalidResponse(format!("Invalid hello: {e}")))?;
        if hello.get("op").and_then(Value::as_u64) != Some(OP_HELLO) {
            return Err(PlatformError::InvalidResponse("Expected hello from gateway".into()));
        }
        let heartbeat_interval = hello
            .get("d")
            .and_then(|d| d.get("heartbeat_interval"))
            .and_then(Value::as_u64)
            .unwrap_or(41250);

        let identify = json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.rest.bot_token(),
                "intents": self.intents,
                "properties": {
                    "os": "linux",
                    "browser": "lobby-herald",
                    "device": "lobby-herald"
                }
            }
        });
        write
            .send(Message::Text(identify.to_string()))
            .await
            .map_err(|e| PlatformError::Transport(format!("Failed to identify: {e}")))?;
        tracing::info!("Discord: connected and identified");

        let mut heartbeat = tokio::time::interval(Duration::from_millis(heartbeat_interval));
        let mut sequence: Option<u64> = None;
        let mut ready = false;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let hb = json!({ "op": OP_HEARTBEAT, "d": sequence });
                    if write.send(Message::Text(hb.to_string())).await.is_err() {
                        break;
                    }
                }
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(t))) => t,
                        Some(Ok(Message::Close(frame))) => {
                            tracing::warn!(?frame, "Discord gateway closed the connection");
                            break;
                        }
                        None => break,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Discord gateway read error");
                            break;
                        }
                        _ => continue,
                    };

                    let payload: Value = match serde_json::from_str(&text) {
                        Ok(p) => p,
                        Err(_) => continue,
                    };
                    if let Some(s) = payload.get("s").and_then(Value::as_u64) {
                        sequence = Some(s);
                    }

                    match payload.get("op").and_then(Value::as_u64) {
                        Some(OP_DISPATCH) => {
                            let event_type = payload.get("t").and_then(Value::as_str).unwrap_or("");
                            let Some(d) = payload.get("d") else {
                                continue;
                            };
                            if event_type == "READY" {
                                ready = true;
                            }
                            for event in parse_dispatch(event_type, d) {
                                if self.events.send(event).await.is_err() {
                                    return Ok(ready);
                                }
                            }
                        }
                        Some(OP_HEARTBEAT) => {
                            let hb = json!({ "op": OP_HEARTBEAT, "d": sequence });
                            if write.send(Message::Text(hb.to_string())).await.is_err() {
                                break;
                            }
                        }
                        Some(OP_RECONNECT) | Some(OP_INVALID_SESSION) => {
                            tracing::warn!("Discord gateway asked for a new session");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_size_shapes() {
        assert_eq!(parse_party_size(&json!([1, 4])), Some((1, 4)));
        assert_eq!(parse_party_size(&json!(["2", "4"])), Some((2, 4)));
        assert_eq!(parse_party_size(&json!({ "current": 3, "max": "4" })), Some((3, 4)));
        assert_eq!(parse_party_size(&json!([1])), None);
        assert_eq!(parse_party_size(&json!([1, 2, 3])), None);
        assert_eq!(parse_party_size(&json!({ "current": 1 })), None);
        assert_eq!(parse_party_size(&json!("1/4")), None);
        assert_eq!(parse_party_size(&json!([-1, 4])), None);
    }

    #[test]
    fn presence_update_is_normalized() {
        let d = json!({
            "user": { "id": "42" },
            "activities": [
                { "name": "Spotify", "type": 2 },
                { "name": "Baldur's Gate 3", "party": { "id": "p", "size": [2, 4] } },
                { "type": 0 }
            ]
        });
        let events = parse_dispatch("PRESENCE_UPDATE", &d);
        assert_eq!(
            events,
            vec![BotEvent::Presence {
                user_id: UserId(42),
                activities: vec![
                    Activity::new("Spotify"),
                    Activity::new("Baldur's Gate 3").with_party(2, 4),
                ],
            }]
        );
    }

    #[test]
    fn guild_create_yields_member_presences() {
        let d = json!({
            "id": "900",
            "presences": [
                { "user": { "id": "1" }, "activities": [] },
                { "user": { "id": "2" }, "activities": [{ "name": "Chess" }] },
                { "activities": [] }
            ]
        });
        assert_eq!(parse_dispatch("GUILD_CREATE", &d).len(), 2);
    }

    #[test]
    fn ready_carries_application_id() {
        let d = json!({ "application": { "id": "777" }, "user": { "id": "5" } });
        assert_eq!(
            parse_dispatch("READY", &d),
            vec![BotEvent::Ready { application_id: 777 }]
        );
    }

    fn interaction(sub: Value) -> Value {
        json!({
            "id": "11",
            "token": "tok",
            "type": 2,
            "member": { "user": { "id": "42" } },
            "data": { "name": "party", "options": [sub] }
        })
    }

    #[test]
    fn set_interaction_defaults_notify_on() {
        let d = interaction(json!({
            "type": 1,
            "name": "set",
            "options": [{ "name": "code", "type": 3, "value": "AAAA11BBBB22CC" }]
        }));
        let Some(BotEvent::Command { interaction, invocation }) = parse_interaction(&d) else {
            panic!("expected a command");
        };
        assert_eq!(interaction.id, "11");
        assert_eq!(interaction.token, "tok");
        assert_eq!(invocation.caller, UserId(42));
        assert_eq!(
            invocation.command,
            Command::Set {
                code: "AAAA11BBBB22CC".into(),
                notify: true
            }
        );
    }

    #[test]
    fn set_interaction_with_notify_off() {
        let d = interaction(json!({
            "type": 1,
            "name": "set",
            "options": [
                { "name": "code", "value": "AAAA11BBBB22CC" },
                { "name": "notify", "value": false }
            ]
        }));
        let Some(BotEvent::Command { invocation, .. }) = parse_interaction(&d) else {
            panic!("expected a command");
        };
        assert!(matches!(invocation.command, Command::Set { notify: false, .. }));
    }

    #[test]
    fn dm_interaction_uses_top_level_user() {
        let mut d = interaction(json!({ "type": 1, "name": "subscribe" }));
        d.as_object_mut().unwrap().remove("member");
        d["user"] = json!({ "id": "99" });
        let Some(BotEvent::Command { invocation, .. }) = parse_interaction(&d) else {
            panic!("expected a command");
        };
        assert_eq!(invocation.caller, UserId(99));
        assert_eq!(invocation.command, Command::Subscribe);
    }

    #[test]
    fn foreign_interactions_are_ignored() {
        let mut other_group = interaction(json!({ "type": 1, "name": "info" }));
        other_group["data"]["name"] = json!("poll");
        assert!(parse_interaction(&other_group).is_none());

        let mut component = interaction(json!({ "type": 1, "name": "info" }));
        component["type"] = json!(3);
        assert!(parse_interaction(&component).is_none());

        assert!(parse_interaction(&interaction(json!({ "type": 1, "name": "dance" }))).is_none());
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        assert_eq!(next_backoff(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(40)), MAX_BACKOFF);
        assert_eq!(next_backoff(MAX_BACKOFF), MAX_BACKOFF);
    }
}
