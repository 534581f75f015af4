use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::{GAME_BOXART_BASE, HELIX_API_BASE, TWITCH_ID_BASE};

/// Game box-art dimensions requested from the CDN.
pub const GAME_ART_WIDTH: u32 = 288;
pub const GAME_ART_HEIGHT: u32 = 384;

/// Per-request timeout for all upstream calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Refresh the app token this long before its reported expiry.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
pub struct StreamsResponse {
    pub data: Vec<StreamEntry>,
}

/// One entry of the Helix `GET /streams` response.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEntry {
    #[serde(rename = "type")]
    pub stream_type: String,
    pub game_id: String,
    pub game_name: String,
    pub title: String,
    pub viewer_count: u64,
    pub started_at: DateTime<Utc>,
    /// Template URL with literal `{width}`/`{height}` markers.
    pub thumbnail_url: String,
}

impl StreamEntry {
    pub fn is_live(&self) -> bool {
        self.stream_type == "live"
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Default)]
struct AppToken {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AppToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }
}

/// Twitch Helix client with a self-refreshing client-credentials app token.
///
/// A refresh failure surfaces as a failed call for that tick; the previous
/// cached status stays in place until the next successful round.
pub struct TwitchApi {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    helix_base: String,
    id_base: String,
    boxart_base: String,
    token: tokio::sync::Mutex<AppToken>,
}

impl TwitchApi {
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building Twitch HTTP client")?;
        Ok(Self {
            http,
            client_id,
            client_secret,
            helix_base: HELIX_API_BASE.to_string(),
            id_base: TWITCH_ID_BASE.to_string(),
            boxart_base: GAME_BOXART_BASE.to_string(),
            token: tokio::sync::Mutex::new(AppToken::default()),
        })
    }

    /// Current app token, minting a fresh one when the cached one is expired.
    async fn bearer_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if token.is_expired(Utc::now()) {
            debug!("refreshing app access token");
            let resp = self
                .http
                .post(format!("{}/oauth2/token", self.id_base))
                .query(&[
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("grant_type", "client_credentials"),
                ])
                .send()
                .await
                .context("token request failed")?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("token endpoint returned {status}: {body}");
            }
            let fresh: TokenResponse = resp.json().await.context("decoding token response")?;
            let lifetime = (fresh.expires_in - TOKEN_EXPIRY_MARGIN_SECS).max(0);
            token.access_token = fresh.access_token;
            token.expires_at = Some(Utc::now() + chrono::Duration::seconds(lifetime));
        }
        Ok(token.access_token.clone())
    }

    /// Most recent stream entry for a login, `None` when the channel reports
    /// no stream at all.
    pub async fn stream_info(&self, login: &str) -> Result<Option<StreamEntry>> {
        let token = self.bearer_token().await?;
        let resp = self
            .http
            .get(format!("{}/streams", self.helix_base))
            .bearer_auth(&token)
            .header("Client-Id", &self.client_id)
            .query(&[("user_login", login)])
            .send()
            .await
            .with_context(|| format!("streams request for {login} failed"))?
            .error_for_status()
            .with_context(|| format!("streams request for {login} rejected"))?;
        let body: StreamsResponse = resp
            .json()
            .await
            .with_context(|| format!("decoding streams response for {login}"))?;
        Ok(body.data.into_iter().next())
    }

    /// Resolve a game's box-art URL: probe the IGDB variant and fall back to
    /// the plain Twitch variant when the CDN redirects or errors. Best-effort;
    /// a probe failure still yields a usable URL.
    pub async fn resolve_game_art(&self, game_id: &str) -> String {
        let primary = self.boxart_url(game_id, true);
        let fallback = self.boxart_url(game_id, false);
        match self.http.get(&primary).send().await {
            Ok(resp) if resp.status().is_success() && resp.url().as_str() == primary => primary,
            Ok(_) => fallback,
            Err(e) => {
                warn!(game_id, error = %e, "game art probe failed");
                fallback
            }
        }
    }

    fn boxart_url(&self, game_id: &str, igdb: bool) -> String {
        let marker = if igdb { "_IGDB" } else { "" };
        let raw = format!(
            "{}/{game_id}{marker}-{GAME_ART_WIDTH}x{GAME_ART_HEIGHT}.jpg",
            self.boxart_base
        );
        Url::parse(&raw).map(String::from).unwrap_or(raw)
    }

    /// Download an image and return it as a base64 data URI.
    pub async fn fetch_image_data_uri(&self, image_url: &str) -> Result<String> {
        let resp = self
            .http
            .get(image_url)
            .send()
            .await
            .context("image request failed")?
            .error_for_status()
            .context("image request rejected")?;
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = resp.bytes().await.context("reading image body")?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(format!("data:{mime};base64,{encoded}"))
    }
}
