use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use crate::config::{SettingsConfig, TargetConfig};
use crate::discord::{
    ActionRow, COLOR_OFFLINE, COLOR_ONLINE, EVENT_PRIVACY_GUILD_ONLY, EVENT_TYPE_EXTERNAL, Embed,
    EmbedFooter, EmbedImage, EventBody, EventMetadata, MessageBody, NotifySink,
};
use crate::i18n::Messages;
use crate::state::{LiveStatus, STREAM_IMAGE_HEIGHT, STREAM_IMAGE_WIDTH};
use crate::store::{IdStore, StoredIds};
use crate::twitch::{GAME_ART_HEIGHT, GAME_ART_WIDTH};

/// Scheduled events are rejected when their start time is already in the
/// past; push the first start slightly ahead to absorb clock skew.
const EVENT_START_BUFFER_SECS: i64 = 10;

/// Floor for the synthesized event end time.
const MIN_EVENT_RUNWAY_MS: u64 = 60_000;

/// Mutable per-target session state. The ids mirror the Identifier Store:
/// empty string = no live resource.
#[derive(Debug, Clone)]
struct NotificationState {
    message_id: String,
    event_id: String,
    last_online_at: DateTime<Utc>,
}

/// Keeps one Discord channel in sync with one Twitch channel's live status.
///
/// Online: upsert a presence message and (optionally) a scheduled event,
/// editing in place on subsequent ticks. Offline: wait out the grace window,
/// then flip the message to its offline variant, delete the event and forget
/// both ids. Every sink failure is contained to this target and this tick.
pub struct Notifier {
    target: TargetConfig,
    status: Arc<RwLock<LiveStatus>>,
    sink: Arc<dyn NotifySink>,
    store: Arc<IdStore>,
    messages: Arc<Messages>,
    check_interval_ms: u64,
    offline_grace: Duration,
    state: NotificationState,
}

impl Notifier {
    pub fn new(
        target: TargetConfig,
        status: Arc<RwLock<LiveStatus>>,
        sink: Arc<dyn NotifySink>,
        store: Arc<IdStore>,
        messages: Arc<Messages>,
        settings: &SettingsConfig,
    ) -> Self {
        let ids = store.get(&target.channel_id, &target.twitch_login);
        if !ids.is_empty() {
            info!(
                login = %target.twitch_login,
                channel = %target.channel_id,
                "resuming live session from stored ids"
            );
        }
        Self {
            status,
            sink,
            store,
            messages,
            check_interval_ms: settings.check_interval_ms,
            offline_grace: Duration::seconds(settings.offline_grace_secs as i64),
            state: NotificationState {
                message_id: ids.message_id,
                event_id: ids.event_id,
                last_online_at: DateTime::<Utc>::UNIX_EPOCH,
            },
            target,
        }
    }

    pub async fn tick(&mut self) {
        self.tick_at(Utc::now()).await;
    }

    async fn tick_at(&mut self, now: DateTime<Utc>) {
        let status = self
            .status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        debug!(login = %status.login, online = status.online, "notifier tick");
        if status.online {
            self.online_tick(&status, now).await;
        } else {
            self.offline_tick(&status, now).await;
        }
    }

    async fn online_tick(&mut self, status: &LiveStatus, now: DateTime<Utc>) {
        self.state.last_online_at = now;

        let current_message = self.state.message_id.clone();
        let current_event = self.state.event_id.clone();
        let toggles = self.target.notify.clone();
        let (message_id, event_id) = tokio::join!(
            async {
                if toggles.message {
                    self.upsert_message(status, now, &current_message).await
                } else {
                    current_message.clone()
                }
            },
            async {
                if toggles.event {
                    self.upsert_event(status, now, &current_event).await
                } else {
                    current_event.clone()
                }
            },
        );
        self.commit_ids(message_id, event_id);
    }

    async fn offline_tick(&mut self, status: &LiveStatus, now: DateTime<Utc>) {
        let deadline = self.state.last_online_at + self.offline_grace;
        if now < deadline {
            debug!(login = %status.login, "offline inside grace window, holding notification");
            return;
        }

        let current_message = self.state.message_id.clone();
        let current_event = self.state.event_id.clone();
        let toggles = self.target.notify.clone();
        tokio::join!(
            async {
                if toggles.message {
                    self.finalize_message(status, now, &current_message).await;
                }
            },
            async {
                if toggles.event {
                    self.remove_event(&current_event).await;
                }
            },
        );
        self.commit_ids(String::new(), String::new());
    }

    /// Create or edit the presence message, returning the id to keep. Failed
    /// calls leave the committed id untouched; a stale-resource response
    /// clears it so the next round recreates the message.
    async fn upsert_message(
        &self,
        status: &LiveStatus,
        now: DateTime<Utc>,
        current_id: &str,
    ) -> String {
        let mut body = self.message_body(status, now);
        if current_id.is_empty() {
            // Mention only on the first message of a session, never on edits.
            body.content = self.mention_content();
            match self.sink.create_message(&self.target.channel_id, &body).await {
                Ok(resp) if !resp.id.is_empty() => {
                    info!(login = %status.login, message_id = %resp.id, "created live message");
                    resp.id
                }
                Ok(resp) => {
                    error!(login = %status.login, code = resp.code, "message create rejected");
                    String::new()
                }
                Err(e) => {
                    error!(login = %status.login, error = %e, "message create failed");
                    String::new()
                }
            }
        } else {
            match self
                .sink
                .edit_message(&self.target.channel_id, current_id, &body)
                .await
            {
                Ok(resp) if resp.is_stale_resource() => {
                    info!(login = %status.login, code = resp.code, "stored message id is stale, will recreate");
                    String::new()
                }
                Ok(_) => current_id.to_string(),
                Err(e) => {
                    error!(login = %status.login, error = %e, "message edit failed");
                    current_id.to_string()
                }
            }
        }
    }

    /// Same contract as `upsert_message`, for the scheduled event.
    async fn upsert_event(
        &self,
        status: &LiveStatus,
        now: DateTime<Utc>,
        current_id: &str,
    ) -> String {
        let mut body = self.event_body(status, now);
        if current_id.is_empty() {
            body.scheduled_start_time = Some(now + Duration::seconds(EVENT_START_BUFFER_SECS));
            match self.sink.create_event(&self.target.guild_id, &body).await {
                Ok(resp) if !resp.id.is_empty() => {
                    info!(login = %status.login, event_id = %resp.id, "created scheduled event");
                    resp.id
                }
                Ok(resp) => {
                    error!(login = %status.login, code = resp.code, "event create rejected");
                    String::new()
                }
                Err(e) => {
                    error!(login = %status.login, error = %e, "event create failed");
                    String::new()
                }
            }
        } else {
            match self
                .sink
                .edit_event(&self.target.guild_id, current_id, &body)
                .await
            {
                Ok(resp) if resp.is_stale_resource() => {
                    info!(login = %status.login, code = resp.code, "stored event id is stale, will recreate");
                    String::new()
                }
                Ok(_) => current_id.to_string(),
                Err(e) => {
                    error!(login = %status.login, error = %e, "event edit failed");
                    current_id.to_string()
                }
            }
        }
    }

    /// Flip an existing message to the offline variant. Never creates one:
    /// a channel that was never announced stays silent.
    async fn finalize_message(&self, status: &LiveStatus, now: DateTime<Utc>, current_id: &str) {
        if current_id.is_empty() {
            return;
        }
        let body = self.message_body(status, now);
        if let Err(e) = self
            .sink
            .edit_message(&self.target.channel_id, current_id, &body)
            .await
        {
            error!(login = %status.login, error = %e, "offline message edit failed");
        }
    }

    /// Scheduled events cannot be closed, only removed.
    async fn remove_event(&self, current_id: &str) {
        if current_id.is_empty() {
            return;
        }
        if let Err(e) = self.sink.delete_event(&self.target.guild_id, current_id).await {
            error!(login = %self.target.twitch_login, error = %e, "event delete failed");
        }
    }

    fn commit_ids(&mut self, message_id: String, event_id: String) {
        if message_id == self.state.message_id && event_id == self.state.event_id {
            return;
        }
        self.state.message_id = message_id;
        self.state.event_id = event_id;
        self.store.set(
            &self.target.channel_id,
            &self.target.twitch_login,
            &StoredIds {
                message_id: self.state.message_id.clone(),
                event_id: self.state.event_id.clone(),
            },
        );
    }

    fn mention_content(&self) -> Option<String> {
        let id = self.target.mention_id.trim();
        if id.is_empty() {
            return None;
        }
        Some(match id {
            "everyone" | "here" => format!("@{id}"),
            _ => format!("<@&{id}>"),
        })
    }

    fn message_body(&self, status: &LiveStatus, now: DateTime<Utc>) -> MessageBody {
        let vars = message_vars(status);
        let embed = if status.online {
            self.online_embed(status, now, &vars)
        } else {
            self.offline_embed(status, &vars)
        };
        let show_link = if status.online {
            self.target.notify.link_button_online
        } else {
            self.target.notify.link_button_offline
        };
        let mut body = MessageBody {
            content: None,
            embeds: vec![embed],
            components: Vec::new(),
        };
        if show_link {
            let key = if status.online {
                "discord.embed.online.linkBtn"
            } else {
                "discord.embed.offline.linkBtn"
            };
            body.components = vec![ActionRow::link(
                status.channel_url(),
                self.messages.get(key, &vars),
            )];
        }
        body
    }

    fn online_embed(
        &self,
        status: &LiveStatus,
        now: DateTime<Utc>,
        vars: &[(&str, String)],
    ) -> Embed {
        Embed {
            title: self.messages.get("discord.embed.online.title", vars),
            description: self.messages.get("discord.embed.online.description", vars),
            url: status.channel_url(),
            kind: "rich".to_string(),
            color: COLOR_ONLINE,
            image: (!status.stream_image_url.is_empty()).then(|| EmbedImage {
                // Cache-buster: the CDN keeps the preview URL stable while
                // the picture behind it changes.
                url: format!(
                    "{}?noCache={}",
                    status.stream_image_url,
                    now.timestamp_millis()
                ),
                width: STREAM_IMAGE_WIDTH,
                height: STREAM_IMAGE_HEIGHT,
            }),
            thumbnail: (!status.game_image_url.is_empty()).then(|| EmbedImage {
                url: status.game_image_url.clone(),
                width: GAME_ART_WIDTH,
                height: GAME_ART_HEIGHT,
            }),
            fields: self.messages.fields("discord.embed.online.fields", vars),
            footer: self.footer(),
        }
    }

    fn offline_embed(&self, status: &LiveStatus, vars: &[(&str, String)]) -> Embed {
        Embed {
            title: self.messages.get("discord.embed.offline.title", vars),
            description: self.messages.get("discord.embed.offline.description", vars),
            url: status.channel_url(),
            kind: "rich".to_string(),
            color: COLOR_OFFLINE,
            image: None,
            thumbnail: (!status.game_image_url.is_empty()).then(|| EmbedImage {
                url: status.game_image_url.clone(),
                width: GAME_ART_WIDTH,
                height: GAME_ART_HEIGHT,
            }),
            fields: self.messages.fields("discord.embed.offline.fields", vars),
            footer: self.footer(),
        }
    }

    fn footer(&self) -> Option<EmbedFooter> {
        let text = self.messages.maybe("discord.embed.footer.text", &[])?;
        if text.is_empty() {
            return None;
        }
        Some(EmbedFooter {
            text,
            icon_url: self
                .messages
                .maybe("discord.embed.footer.iconUrl", &[])
                .unwrap_or_default(),
        })
    }

    fn event_body(&self, status: &LiveStatus, now: DateTime<Utc>) -> EventBody {
        let vars = message_vars(status);
        EventBody {
            channel_id: None,
            name: self.messages.get("discord.event.title", &vars),
            description: self.messages.get("discord.event.description", &vars),
            entity_metadata: EventMetadata {
                location: status.channel_url(),
            },
            scheduled_start_time: None,
            scheduled_end_time: now + self.event_runway(),
            privacy_level: EVENT_PRIVACY_GUILD_ONLY,
            entity_type: EVENT_TYPE_EXTERNAL,
            image: status.stream_image_data_uri.clone(),
        }
    }

    /// The sink requires an end time after the start time; nothing real is
    /// known, so synthesize one comfortably past the next few polls.
    fn event_runway(&self) -> Duration {
        let ms = (self.check_interval_ms.saturating_mul(10)).max(MIN_EVENT_RUNWAY_MS);
        Duration::milliseconds(ms as i64)
    }
}

fn message_vars(status: &LiveStatus) -> Vec<(&'static str, String)> {
    vec![
        ("%streamer%", status.login.clone()),
        ("%game%", status.game_name.clone()),
        ("%title%", status.title.clone()),
        ("%viewer%", status.viewer_count.to_string()),
        // Discord renders <t:..:R> as a live relative timestamp.
        ("%startDate%", format!("<t:{}:R>", status.started_at.timestamp())),
    ]
}
