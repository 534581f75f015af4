use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use crate::twitch::StreamEntry;

/// Dimensions substituted into the Helix `{width}x{height}` thumbnail template.
pub const STREAM_IMAGE_WIDTH: u32 = 1920;
pub const STREAM_IMAGE_HEIGHT: u32 = 1080;

/// Latest observed status of one Twitch channel.
///
/// One record per tracked login, shared by every notification target watching
/// that login. Only the owning poller mutates it; targets take a clone of the
/// snapshot under a short read lock. When the channel is offline only the
/// `online` flag is authoritative; the metadata fields keep their last live
/// values.
#[derive(Debug, Clone)]
pub struct LiveStatus {
    pub login: String,
    pub online: bool,
    pub game_name: String,
    pub title: String,
    pub viewer_count: u64,
    pub started_at: DateTime<Utc>,
    pub stream_image_url: String,
    pub game_image_url: String,
    /// Base64 data URI of the stream preview, empty until first fetched.
    pub stream_image_data_uri: String,
}

impl LiveStatus {
    pub fn new(login: &str) -> Self {
        Self {
            login: login.to_string(),
            online: false,
            game_name: String::new(),
            title: String::new(),
            viewer_count: 0,
            started_at: DateTime::<Utc>::UNIX_EPOCH,
            stream_image_url: String::new(),
            game_image_url: String::new(),
            stream_image_data_uri: String::new(),
        }
    }

    pub fn channel_url(&self) -> String {
        format!("https://twitch.tv/{}", self.login)
    }

    /// Copy the live metadata out of a Helix stream entry, expanding the
    /// thumbnail template to fixed dimensions. Artwork resolution and preview
    /// encoding are separate network steps owned by the poller.
    pub fn apply_online(&mut self, entry: &StreamEntry) {
        self.online = true;
        self.game_name = entry.game_name.clone();
        self.title = entry.title.clone();
        self.viewer_count = entry.viewer_count;
        self.started_at = entry.started_at;
        self.stream_image_url = entry
            .thumbnail_url
            .replace("{width}", &STREAM_IMAGE_WIDTH.to_string())
            .replace("{height}", &STREAM_IMAGE_HEIGHT.to_string());
    }

    pub fn set_offline(&mut self) {
        self.online = false;
    }
}

/// Lazily-populated registry of per-login status records.
///
/// `get` never removes entries; the record for a login is allocated on first
/// access and lives for the rest of the process.
#[derive(Default)]
pub struct LiveCache {
    inner: Mutex<HashMap<String, Arc<RwLock<LiveStatus>>>>,
}

impl LiveCache {
    pub fn get(&self, login: &str) -> Arc<RwLock<LiveStatus>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(login.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(LiveStatus::new(login))))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(thumbnail: &str) -> StreamEntry {
        StreamEntry {
            stream_type: "live".to_string(),
            game_id: "509658".to_string(),
            game_name: "Just Chatting".to_string(),
            title: "hello".to_string(),
            viewer_count: 42,
            started_at: DateTime::from_timestamp(1_700_000_000, 0).expect("valid ts"),
            thumbnail_url: thumbnail.to_string(),
        }
    }

    #[test]
    fn cache_returns_same_record_for_same_login() {
        let cache = LiveCache::default();
        let a = cache.get("alice");
        let b = cache.get("alice");
        assert!(Arc::ptr_eq(&a, &b));
        let c = cache.get("bob");
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn new_record_starts_offline() {
        let cache = LiveCache::default();
        let status = cache.get("alice");
        let status = status.read().expect("lock");
        assert!(!status.online);
        assert_eq!(status.started_at, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(status.channel_url(), "https://twitch.tv/alice");
    }

    #[test]
    fn apply_online_expands_thumbnail_template() {
        let mut status = LiveStatus::new("alice");
        status.apply_online(&entry(
            "https://static-cdn.jtvnw.net/previews-ttv/live_user_alice-{width}x{height}.jpg",
        ));
        assert!(status.online);
        assert_eq!(
            status.stream_image_url,
            "https://static-cdn.jtvnw.net/previews-ttv/live_user_alice-1920x1080.jpg"
        );
        assert_eq!(status.viewer_count, 42);
    }

    #[test]
    fn set_offline_keeps_stale_metadata() {
        let mut status = LiveStatus::new("alice");
        status.apply_online(&entry("https://cdn/{width}x{height}.jpg"));
        status.set_offline();
        assert!(!status.online);
        assert_eq!(status.game_name, "Just Chatting");
        assert_eq!(status.title, "hello");
    }
}
