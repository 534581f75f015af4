use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub twitch: TwitchConfig,
    pub discord: DiscordConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Twitch application credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchConfig {
    pub client_id: String,
    /// May be left empty in the file and supplied via `TWITCH_CLIENT_SECRET`.
    #[serde(default)]
    pub client_secret: String,
}

/// Discord credentials and the list of notification targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// May be left empty in the file and supplied via `DISCORD_BOT_TOKEN`.
    #[serde(default)]
    pub bot_token: String,
    pub targets: Vec<TargetConfig>,
}

/// One (Discord channel, Twitch channel) notification pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub guild_id: String,
    pub channel_id: String,
    /// Role id pinged on the first message of a live session. The sentinels
    /// `"everyone"` and `"here"` produce the matching broadcast mention.
    #[serde(default)]
    pub mention_id: String,
    pub twitch_login: String,
    #[serde(default)]
    pub notify: NotifyToggles,
}

/// Per-target feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyToggles {
    #[serde(default = "default_true")]
    pub message: bool,
    #[serde(default = "default_true")]
    pub event: bool,
    #[serde(default = "default_true")]
    pub link_button_online: bool,
    #[serde(default)]
    pub link_button_offline: bool,
}

impl Default for NotifyToggles {
    fn default() -> Self {
        Self {
            message: true,
            event: true,
            link_button_online: true,
            link_button_offline: false,
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Polling interval in milliseconds. Clamped to a 1000 ms floor at startup.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// How long a channel must stay reported offline before the notification
    /// is finalized. Absorbs short stream drops without flapping.
    #[serde(default = "default_offline_grace_secs")]
    pub offline_grace_secs: u64,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Path of the JSON file holding message/event ids across restarts.
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

fn default_true() -> bool {
    true
}

fn default_check_interval_ms() -> u64 {
    15_000
}

fn default_offline_grace_secs() -> u64 {
    150
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_store_path() -> String {
    "notify_ids.json".to_string()
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            offline_grace_secs: default_offline_grace_secs(),
            locale: default_locale(),
            store_path: default_store_path(),
        }
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Overlay secrets from the environment (after a `.env` pass).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("TWITCH_CLIENT_SECRET") {
            if !secret.is_empty() {
                self.twitch.client_secret = secret;
            }
        }
        if let Ok(token) = std::env::var("DISCORD_BOT_TOKEN") {
            if !token.is_empty() {
                self.discord.bot_token = token;
            }
        }
    }

    /// Reject configs the service cannot run with. Called once at startup;
    /// a failure here aborts before the first tick.
    pub fn validate(&self) -> Result<()> {
        if self.twitch.client_id.is_empty() {
            anyhow::bail!("twitch.client_id must be set");
        }
        if self.twitch.client_secret.is_empty() {
            anyhow::bail!("twitch.client_secret must be set (config or TWITCH_CLIENT_SECRET)");
        }
        if self.discord.bot_token.is_empty() {
            anyhow::bail!("discord.bot_token must be set (config or DISCORD_BOT_TOKEN)");
        }
        if self.discord.targets.is_empty() {
            anyhow::bail!("at least one [[discord.targets]] entry is required");
        }
        for target in &self.discord.targets {
            if target.guild_id.is_empty()
                || target.channel_id.is_empty()
                || target.twitch_login.is_empty()
            {
                anyhow::bail!(
                    "every target needs guild_id, channel_id and twitch_login (got guild={:?} channel={:?} login={:?})",
                    target.guild_id,
                    target.channel_id,
                    target.twitch_login,
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [twitch]
        client_id = "cid"
        client_secret = "secret"

        [discord]
        bot_token = "token"

        [[discord.targets]]
        guild_id = "g1"
        channel_id = "c1"
        twitch_login = "alice"
    "#;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: AppConfig = toml::from_str(MINIMAL).expect("valid config");
        config.validate().expect("valid");
        assert_eq!(config.settings.check_interval_ms, 15_000);
        assert_eq!(config.settings.offline_grace_secs, 150);
        assert_eq!(config.settings.locale, "en");
        let target = &config.discord.targets[0];
        assert!(target.mention_id.is_empty());
        assert!(target.notify.message);
        assert!(target.notify.event);
        assert!(target.notify.link_button_online);
        assert!(!target.notify.link_button_offline);
    }

    #[test]
    fn toggles_can_be_disabled_per_target() {
        let raw = format!(
            "{MINIMAL}
            [discord.targets.notify]
            message = false
            link_button_online = false
            "
        );
        let config: AppConfig = toml::from_str(&raw).expect("valid config");
        let toggles = &config.discord.targets[0].notify;
        assert!(!toggles.message);
        assert!(toggles.event);
        assert!(!toggles.link_button_online);
    }

    #[test]
    fn missing_targets_is_fatal() {
        let raw = r#"
            [twitch]
            client_id = "cid"
            client_secret = "secret"

            [discord]
            bot_token = "token"
            targets = []
        "#;
        let config: AppConfig = toml::from_str(raw).expect("parses");
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_credentials_are_fatal() {
        let raw = r#"
            [twitch]
            client_id = ""
            client_secret = "secret"

            [discord]
            bot_token = "token"

            [[discord.targets]]
            guild_id = "g1"
            channel_id = "c1"
            twitch_login = "alice"
        "#;
        let config: AppConfig = toml::from_str(raw).expect("parses");
        assert!(config.validate().is_err());
    }
}
