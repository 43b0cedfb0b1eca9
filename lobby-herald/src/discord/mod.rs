//! Discord adapter.
//!
//! REST calls go through [`DiscordRest`]; the gateway connection lives in
//! [`gateway`] and turns dispatches into [`crate::bot::BotEvent`] values.

pub mod format;
pub mod gateway;

use crate::platform::{ChatPlatform, CommandSurface, InteractionRef, PlatformError, PlatformResult};
use crate::render::StatusView;
use crate::session::{MessageId, UserId};
use async_trait::async_trait;
use lobby_common::config::DiscordConfig;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{json, Value};

/// Discord JSON error codes that mean the target is gone.
const UNKNOWN_CODES: &[u64] = &[10003, 10008, 10013];
/// Discord JSON error codes that mean we lack access.
const ACCESS_CODES: &[u64] = &[50001, 50007, 50013];

/// Map a failed response to the platform error taxonomy.
pub fn classify_error(status: StatusCode, body: &str, retry_after_header: Option<&str>) -> PlatformError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_u64);
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map_or_else(|| body.to_string(), str::to_string);

    if status == StatusCode::TOO_MANY_REQUESTS {
        let from_body = parsed
            .as_ref()
            .and_then(|v| v.get("retry_after"))
            .and_then(Value::as_f64);
        let from_header = retry_after_header.and_then(|h| h.trim().parse::<f64>().ok());
        let secs = from_body.or(from_header).unwrap_or(1.0).max(0.0).ceil() as u64;
        return PlatformError::RateLimited {
            retry_after_secs: secs,
        };
    }

    match (status.as_u16(), code) {
        (404, _) => PlatformError::NotFound(message),
        (403, _) => PlatformError::Forbidden(message),
        (_, Some(c)) if UNKNOWN_CODES.contains(&c) => PlatformError::NotFound(message),
        (_, Some(c)) if ACCESS_CODES.contains(&c) => PlatformError::Forbidden(message),
        _ => PlatformError::InvalidResponse(format!("Discord API error ({status}): {message}")),
    }
}

fn snowflake(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Discord REST client bound to the announcement channel.
pub struct DiscordRest {
    client: Client,
    api_base: String,
    bot_token: String,
    channel_id: u64,
    guild_id: Option<u64>,
}

impl DiscordRest {
    pub fn new(config: &DiscordConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            channel_id: config.channel_id,
            guild_id: config.guild_id,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> PlatformResult<Response> {
        let mut req = self
            .client
            .request(method, self.url(path))
            .header("Authorization", format!("Bot {}", self.bot_token));
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PlatformError::Transport(format!("Discord request failed: {e}")))?;

        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.unwrap_or_default();
        Err(classify_error(status, &body, retry_after.as_deref()))
    }

    async fn request_json(&self, method: Method, path: &str, body: Option<&Value>) -> PlatformResult<Value> {
        self.request(method, path, body)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(format!("Failed to parse response: {e}")))
    }

    async fn post_message(&self, channel_id: u64, body: &Value) -> PlatformResult<MessageId> {
        let data = self
            .request_json(Method::POST, &format!("/channels/{channel_id}/messages"), Some(body))
            .await?;
        data.get("id")
            .and_then(snowflake)
            .map(MessageId)
            .ok_or_else(|| PlatformError::InvalidResponse("message id missing from response".into()))
    }

    /// Gateway URL for the bot.
    pub async fn gateway_url(&self) -> PlatformResult<String> {
        let data = self.request_json(Method::GET, "/gateway/bot", None).await?;
        Ok(data
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or("wss://gateway.discord.gg")
            .to_string())
    }

    pub fn bot_token(&self) -> &str {
        &self.bot_token
    }
}

#[async_trait]
impl ChatPlatform for DiscordRest {
    async fn send_status(&self, view: &StatusView) -> PlatformResult<MessageId> {
        self.post_message(self.channel_id, &format::status_embed(view))
            .await
    }

    async fn edit_status(&self, id: MessageId, view: &StatusView) -> PlatformResult<()> {
        self.request(
            Method::PATCH,
            &format!("/channels/{}/messages/{id}", self.channel_id),
            Some(&format::status_embed(view)),
        )
        .await?;
        Ok(())
    }

    async fn send_text(&self, text: &str) -> PlatformResult<MessageId> {
        self.post_message(self.channel_id, &format::text_message(text))
            .await
    }

    async fn delete_message(&self, id: MessageId) -> PlatformResult<()> {
        self.request(
            Method::DELETE,
            &format!("/channels/{}/messages/{id}", self.channel_id),
            None,
        )
        .await?;
        Ok(())
    }

    async fn send_direct(&self, user: UserId, text: &str) -> PlatformResult<()> {
        let dm = self
            .request_json(
                Method::POST,
                "/users/@me/channels",
                Some(&json!({ "recipient_id": user.to_string() })),
            )
            .await?;
        let dm_channel = dm
            .get("id")
            .and_then(snowflake)
            .ok_or_else(|| PlatformError::InvalidResponse("DM channel id missing from response".into()))?;
        self.post_message(dm_channel, &format::text_message(text))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CommandSurface for DiscordRest {
    async fn register_commands(&self, application_id: u64) -> PlatformResult<()> {
        let path = match self.guild_id {
            Some(guild) => format!("/applications/{application_id}/guilds/{guild}/commands"),
            None => format!("/applications/{application_id}/commands"),
        };
        self.request(Method::PUT, &path, Some(&format::command_definitions()))
            .await?;
        tracing::info!(application_id, guild_id = ?self.guild_id, "Slash commands registered");
        Ok(())
    }

    async fn reply_ephemeral(&self, interaction: &InteractionRef, text: &str) -> PlatformResult<()> {
        self.request(
            Method::POST,
            &format!("/interactions/{}/{}/callback", interaction.id, interaction.token),
            Some(&format::ephemeral_reply(text)),
        )
        .await?;
        Ok(())
    }
}
