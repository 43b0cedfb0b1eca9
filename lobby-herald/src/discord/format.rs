//! Discord payload builders.
//!
//! Converts rendered views into Discord JSON bodies:
//!
//! - Status views become a single embed
//! - Text is clipped to the 2000 character message limit
//! - The `party` command group is described for bulk registration

use crate::render::{StatusView, FIELD_CODE, FIELD_PARTY};
use serde_json::{json, Value};

/// Maximum message length for Discord.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Interaction callback type for an immediate message reply.
pub const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;

/// Message flag that hides a reply from everyone but the caller.
pub const EPHEMERAL_FLAG: u64 = 1 << 6;

/// Name of the slash-command group.
pub const COMMAND_GROUP: &str = "party";

/// Clip text to the message limit on a character boundary.
pub fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_LENGTH {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX_MESSAGE_LENGTH - 1).collect();
    clipped.push('…');
    clipped
}

/// Message body carrying the status embed.
pub fn status_embed(view: &StatusView) -> Value {
    let fields: Vec<Value> = view
        .fields
        .iter()
        .map(|field| {
            let value = if field.name == FIELD_CODE {
                format!("```{}```", field.value)
            } else {
                field.value.clone()
            };
            json!({
                "name": field.name,
                "value": value,
                "inline": field.name == FIELD_PARTY,
            })
        })
        .collect();

    json!({
        "embeds": [{
            "title": view.title,
            "color": view.color.rgb(),
            "fields": fields,
        }]
    })
}

/// Message body carrying plain text.
pub fn text_message(text: &str) -> Value {
    json!({ "content": clip(text) })
}

/// Interaction callback body for an ephemeral reply.
pub fn ephemeral_reply(text: &str) -> Value {
    json!({
        "type": CHANNEL_MESSAGE_WITH_SOURCE,
        "data": {
            "content": clip(text),
            "flags": EPHEMERAL_FLAG,
        }
    })
}

/// Application command definitions for bulk overwrite.
pub fn command_definitions() -> Value {
    const SUB_COMMAND: u8 = 1;
    const STRING: u8 = 3;
    const BOOLEAN: u8 = 5;

    let simple = |name: &str, description: &str| {
        json!({ "type": SUB_COMMAND, "name": name, "description": description })
    };

    json!([{
        "name": COMMAND_GROUP,
        "description": "Direct connection code for the current party",
        "options": [
            {
                "type": SUB_COMMAND,
                "name": "set",
                "description": "Set the direct connection code (owner only)",
                "options": [
                    {
                        "type": STRING,
                        "name": "code",
                        "description": "14 character direct connection code",
                        "required": true,
                        "min_length": 14,
                        "max_length": 14,
                    },
                    {
                        "type": BOOLEAN,
                        "name": "notify",
                        "description": "Send the new code to subscribers (default: yes)",
                        "required": false,
                    }
                ]
            },
            simple("clear", "Clear the direct connection code (owner only)"),
            simple("info", "Show the current code and party"),
            simple("subscribe", "Get a direct message when the code changes"),
            simple("unsubscribe", "Stop code change direct messages"),
            simple("status", "Show bot status"),
        ]
    }])
}
