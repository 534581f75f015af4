use std::sync::{Arc, RwLock};

use anyhow::Result;
use tracing::{debug, warn};

use crate::state::{LiveCache, LiveStatus};
use crate::twitch::TwitchApi;

/// Polls one Twitch login and keeps its shared status record current.
///
/// Exactly one poller exists per distinct login, however many targets watch
/// it. A failed tick is logged and swallowed so the rest of the round runs;
/// the cache then simply retains the previous snapshot.
pub struct Poller {
    login: String,
    api: Arc<TwitchApi>,
    status: Arc<RwLock<LiveStatus>>,
}

impl Poller {
    pub fn new(login: &str, api: Arc<TwitchApi>, cache: &LiveCache) -> Self {
        Self {
            login: login.to_string(),
            api,
            status: cache.get(login),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub async fn tick(&self) {
        debug!(login = %self.login, "poller tick");
        if let Err(e) = self.poll().await {
            warn!(login = %self.login, error = %e, "status poll failed");
        }
    }

    async fn poll(&self) -> Result<()> {
        let entry = self.api.stream_info(&self.login).await?;
        match entry {
            Some(entry) if entry.is_live() => {
                // Build the next snapshot locally; the lock is only held for
                // the final swap, never across a network await.
                let mut next = self
                    .status
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .clone();
                next.apply_online(&entry);
                next.game_image_url = self.api.resolve_game_art(&entry.game_id).await;
                match self.api.fetch_image_data_uri(&next.stream_image_url).await {
                    Ok(data_uri) => next.stream_image_data_uri = data_uri,
                    Err(e) => {
                        warn!(login = %self.login, error = %e, "stream preview fetch failed, keeping previous encoding");
                    }
                }
                *self.status.write().unwrap_or_else(|e| e.into_inner()) = next;
            }
            _ => {
                self.status
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .set_offline();
            }
        }
        Ok(())
    }
}
