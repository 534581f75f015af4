use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Bumping this invalidates every identifier persisted under the previous
/// layout: old entries simply stop resolving and targets start fresh.
const STORE_VERSION: &str = "v2";

/// External resource ids held for one (channel, login) pair. Empty = none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIds {
    #[serde(rename = "messageId", default)]
    pub message_id: String,
    #[serde(rename = "eventId", default)]
    pub event_id: String,
}

impl StoredIds {
    pub fn is_empty(&self) -> bool {
        self.message_id.is_empty() && self.event_id.is_empty()
    }
}

/// Flat key→JSON-string store mapping notification targets to the Discord
/// message/event ids they last created, so a restart resumes editing instead
/// of reposting.
///
/// Writes are last-write-wins and fire-and-forget: a failed flush is logged
/// and the in-memory map stays authoritative for the rest of the run.
pub struct IdStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl IdStore {
    /// Open the store file, starting empty when it is missing or unreadable.
    pub fn open(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "id store file is corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        }
    }

    fn key(channel_id: &str, login: &str) -> String {
        format!("{channel_id}-{login}-{STORE_VERSION}")
    }

    /// Ids for a target, or empty ids when the key is absent (including keys
    /// persisted under an older store version).
    pub fn get(&self, channel_id: &str, login: &str) -> StoredIds {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&Self::key(channel_id, login))
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    /// Overwrite the ids for a target and persist the whole map.
    pub fn set(&self, channel_id: &str, login: &str, ids: &StoredIds) {
        let raw = match serde_json::to_string(ids) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to encode ids, skipping persist");
                return;
            }
        };
        let snapshot = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.insert(Self::key(channel_id, login), raw);
            entries.clone()
        };
        if let Err(e) = self.flush(&snapshot) {
            warn!(path = %self.path.display(), error = %e, "failed to persist id store");
        }
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<()> {
        let contents = serde_json::to_string_pretty(entries).context("serializing id store")?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(message_id: &str, event_id: &str) -> StoredIds {
        StoredIds {
            message_id: message_id.to_string(),
            event_id: event_id.to_string(),
        }
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = IdStore::open(&dir.path().join("ids.json"));
        store.set("chan1", "alice", &ids("m1", "e1"));
        assert_eq!(store.get("chan1", "alice"), ids("m1", "e1"));
    }

    #[test]
    fn unknown_key_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = IdStore::open(&dir.path().join("ids.json"));
        let got = store.get("chan1", "nobody");
        assert!(got.is_empty());
        assert_eq!(got, StoredIds::default());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ids.json");
        IdStore::open(&path).set("chan1", "alice", &ids("m1", "e1"));

        let reopened = IdStore::open(&path);
        assert_eq!(reopened.get("chan1", "alice"), ids("m1", "e1"));
    }

    #[test]
    fn old_version_entries_do_not_resolve() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ids.json");
        let legacy = r#"{"chan1-alice-v1": "{\"messageId\":\"m1\",\"eventId\":\"e1\"}"}"#;
        std::fs::write(&path, legacy).expect("write");

        let store = IdStore::open(&path);
        assert!(store.get("chan1", "alice").is_empty());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ids.json");
        std::fs::write(&path, "not json at all").expect("write");

        let store = IdStore::open(&path);
        assert!(store.get("chan1", "alice").is_empty());
        // And it stays writable afterwards.
        store.set("chan1", "alice", &ids("m2", ""));
        assert_eq!(store.get("chan1", "alice"), ids("m2", ""));
    }

    #[test]
    fn last_write_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = IdStore::open(&dir.path().join("ids.json"));
        store.set("chan1", "alice", &ids("m1", "e1"));
        store.set("chan1", "alice", &ids("", ""));
        assert!(store.get("chan1", "alice").is_empty());
    }
}
