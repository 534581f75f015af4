use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::DISCORD_API_BASE;

/// Error codes at or above this value mean the referenced resource no longer
/// exists (deleted message, cancelled event, …). The caller drops its stored
/// id and recreates on the next round instead of failing forever.
pub const STALE_RESOURCE_CODE: u64 = 10_000;

/// Embed accent colors.
pub const COLOR_ONLINE: u32 = 10_181_046;
pub const COLOR_OFFLINE: u32 = 9_807_270;

/// Scheduled-event constants: GUILD_ONLY privacy, EXTERNAL entity.
pub(crate) const EVENT_PRIVACY_GUILD_ONLY: u8 = 2;
pub(crate) const EVENT_TYPE_EXTERNAL: u8 = 3;

/// Per-request timeout for all sink calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ActionRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon_url: String,
}

/// `type: 1` container row holding link buttons.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRow {
    #[serde(rename = "type")]
    pub kind: u8,
    pub components: Vec<LinkButton>,
}

impl ActionRow {
    pub fn link(url: String, label: String) -> Self {
        Self {
            kind: 1,
            // style 5 = link button
            components: vec![LinkButton {
                kind: 2,
                style: 5,
                url,
                label,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkButton {
    #[serde(rename = "type")]
    pub kind: u8,
    pub style: u8,
    pub url: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventBody {
    /// Always null for EXTERNAL events; the location carries the URL.
    pub channel_id: Option<String>,
    pub name: String,
    pub description: String,
    pub entity_metadata: EventMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub scheduled_end_time: DateTime<Utc>,
    pub privacy_level: u8,
    pub entity_type: u8,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventMetadata {
    pub location: String,
}

/// Decoded sink response: a resource `id` on success, a numeric `code` on
/// API errors. Discord reports errors in the JSON body rather than relying
/// on the HTTP status alone, so both fields default to empty/zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SinkResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub code: u64,
}

impl SinkResponse {
    pub fn is_stale_resource(&self) -> bool {
        self.code >= STALE_RESOURCE_CODE
    }
}

/// The notification sink the target state machine talks to. Kept as a trait
/// so the state machine can be exercised against a recording fake.
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn create_message(&self, channel_id: &str, body: &MessageBody) -> Result<SinkResponse>;
    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        body: &MessageBody,
    ) -> Result<SinkResponse>;
    async fn create_event(&self, guild_id: &str, body: &EventBody) -> Result<SinkResponse>;
    async fn edit_event(
        &self,
        guild_id: &str,
        event_id: &str,
        body: &EventBody,
    ) -> Result<SinkResponse>;
    async fn delete_event(&self, guild_id: &str, event_id: &str) -> Result<()>;
}

/// Thin wrappers over the Discord REST routes this service needs.
pub struct DiscordApi {
    http: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl DiscordApi {
    pub fn new(bot_token: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building Discord HTTP client")?;
        Ok(Self {
            http,
            bot_token,
            api_base: DISCORD_API_BASE.to_string(),
        })
    }

    async fn send_json<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<SinkResponse> {
        let url = format!("{}/{path}", self.api_base);
        debug!(%method, %url, "discord request");
        let resp = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {path} failed"))?;
        let decoded: SinkResponse = resp
            .json()
            .await
            .with_context(|| format!("decoding response from {path}"))?;
        Ok(decoded)
    }
}

#[async_trait]
impl NotifySink for DiscordApi {
    async fn create_message(&self, channel_id: &str, body: &MessageBody) -> Result<SinkResponse> {
        self.send_json(Method::POST, &format!("channels/{channel_id}/messages"), body)
            .await
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        body: &MessageBody,
    ) -> Result<SinkResponse> {
        self.send_json(
            Method::PATCH,
            &format!("channels/{channel_id}/messages/{message_id}"),
            body,
        )
        .await
    }

    async fn create_event(&self, guild_id: &str, body: &EventBody) -> Result<SinkResponse> {
        self.send_json(
            Method::POST,
            &format!("guilds/{guild_id}/scheduled-events"),
            body,
        )
        .await
    }

    async fn edit_event(
        &self,
        guild_id: &str,
        event_id: &str,
        body: &EventBody,
    ) -> Result<SinkResponse> {
        self.send_json(
            Method::PATCH,
            &format!("guilds/{guild_id}/scheduled-events/{event_id}"),
            body,
        )
        .await
    }

    async fn delete_event(&self, guild_id: &str, event_id: &str) -> Result<()> {
        let url = format!("{}/guilds/{guild_id}/scheduled-events/{event_id}", self.api_base);
        self.http
            .delete(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .send()
            .await
            .context("event delete request failed")?
            .error_for_status()
            .context("event delete rejected")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_resource_threshold() {
        let ok = SinkResponse {
            id: "1".to_string(),
            code: 0,
        };
        assert!(!ok.is_stale_resource());

        let unknown_message = SinkResponse {
            id: String::new(),
            code: 10_014,
        };
        assert!(unknown_message.is_stale_resource());

        let permission_error = SinkResponse {
            id: String::new(),
            code: 50_013,
        };
        assert!(permission_error.is_stale_resource());
    }

    #[test]
    fn empty_embed_parts_are_omitted_from_json() {
        let embed = Embed {
            title: "t".to_string(),
            description: String::new(),
            url: "https://twitch.tv/alice".to_string(),
            kind: "rich".to_string(),
            color: COLOR_ONLINE,
            image: None,
            thumbnail: None,
            fields: Vec::new(),
            footer: None,
        };
        let body = MessageBody {
            content: None,
            embeds: vec![embed],
            components: Vec::new(),
        };
        let json = serde_json::to_value(&body).expect("serializes");
        let embed = &json["embeds"][0];
        assert!(embed.get("description").is_none());
        assert!(embed.get("image").is_none());
        assert!(embed.get("thumbnail").is_none());
        assert!(embed.get("fields").is_none());
        assert!(json.get("content").is_none());
        assert!(json.get("components").is_none());
    }

    #[test]
    fn event_body_serializes_null_channel_and_optional_start() {
        let body = EventBody {
            channel_id: None,
            name: "live".to_string(),
            description: String::new(),
            entity_metadata: EventMetadata {
                location: "https://twitch.tv/alice".to_string(),
            },
            scheduled_start_time: None,
            scheduled_end_time: DateTime::from_timestamp(1_700_000_600, 0).expect("valid ts"),
            privacy_level: EVENT_PRIVACY_GUILD_ONLY,
            entity_type: EVENT_TYPE_EXTERNAL,
            image: String::new(),
        };
        let json = serde_json::to_value(&body).expect("serializes");
        assert!(json["channel_id"].is_null());
        assert!(json.get("scheduled_start_time").is_none());
        assert!(json.get("image").is_none());
        assert_eq!(json["privacy_level"], 2);
        assert_eq!(json["entity_type"], 3);
    }

    #[tokio::test]
    async fn create_message_posts_body_and_decodes_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/channels/chan1/messages")
            .match_header("authorization", "Bot token123")
            .with_body(r#"{"id": "111222333"}"#)
            .create_async()
            .await;

        let mut api = DiscordApi::new("token123".to_string()).expect("client");
        api.api_base = server.url();

        let body = MessageBody::default();
        let resp = api.create_message("chan1", &body).await.expect("response");
        assert_eq!(resp.id, "111222333");
        assert!(!resp.is_stale_resource());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn edit_message_surfaces_error_code() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PATCH", "/channels/chan1/messages/m1")
            .with_status(404)
            .with_body(r#"{"message": "Unknown Message", "code": 10008}"#)
            .create_async()
            .await;

        let mut api = DiscordApi::new("token123".to_string()).expect("client");
        api.api_base = server.url();

        let resp = api
            .edit_message("chan1", "m1", &MessageBody::default())
            .await
            .expect("decoded error body");
        assert_eq!(resp.code, 10_008);
        assert!(resp.is_stale_resource());
    }
}
