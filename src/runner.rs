use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::discord::NotifySink;
use crate::i18n::Messages;
use crate::notifier::Notifier;
use crate::poller::Poller;
use crate::state::LiveCache;
use crate::store::IdStore;
use crate::twitch::TwitchApi;

/// Floor on the polling interval, whatever the config says.
pub const MIN_CHECK_INTERVAL_MS: u64 = 1_000;

/// Owns the poll/notify fleet and drives it in fixed-interval rounds.
///
/// A round runs every poller to completion first, then every notifier, so a
/// notifier always reads a status refreshed in its own round. The next round
/// is armed only after the current one finishes: slow rounds drift, they
/// never overlap.
pub struct Runner {
    pollers: Vec<Poller>,
    notifiers: Vec<Notifier>,
    interval: Duration,
}

impl Runner {
    pub fn new(
        config: &AppConfig,
        twitch: Arc<TwitchApi>,
        sink: Arc<dyn NotifySink>,
        store: Arc<IdStore>,
        messages: Arc<Messages>,
    ) -> Self {
        let mut settings = config.settings.clone();
        settings.check_interval_ms = settings.check_interval_ms.max(MIN_CHECK_INTERVAL_MS);

        let cache = LiveCache::default();

        // One poller per distinct login, however many targets share it.
        let logins: BTreeSet<&str> = config
            .discord
            .targets
            .iter()
            .map(|t| t.twitch_login.as_str())
            .collect();
        let pollers: Vec<Poller> = logins
            .iter()
            .map(|login| Poller::new(login, twitch.clone(), &cache))
            .collect();

        let notifiers: Vec<Notifier> = config
            .discord
            .targets
            .iter()
            .map(|target| {
                Notifier::new(
                    target.clone(),
                    cache.get(&target.twitch_login),
                    sink.clone(),
                    store.clone(),
                    messages.clone(),
                    &settings,
                )
            })
            .collect();

        info!(
            pollers = pollers.len(),
            targets = notifiers.len(),
            interval_ms = settings.check_interval_ms,
            "runner ready"
        );
        Self {
            pollers,
            notifiers,
            interval: Duration::from_millis(settings.check_interval_ms),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One round: poll everything, then notify everything.
    pub async fn tick(&mut self) {
        debug!(
            pollers = self.pollers.len(),
            targets = self.notifiers.len(),
            "round start"
        );
        join_all(self.pollers.iter().map(Poller::tick)).await;
        join_all(self.notifiers.iter_mut().map(Notifier::tick)).await;
    }

    /// Run rounds until Ctrl+C. The first round starts immediately.
    pub async fn run(&mut self) {
        loop {
            self.tick().await;
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AppConfig, DiscordConfig, SettingsConfig, TargetConfig, TwitchConfig,
    };
    use crate::discord::DiscordApi;

    fn config_with(interval_ms: u64, logins: &[&str]) -> AppConfig {
        AppConfig {
            twitch: TwitchConfig {
                client_id: "cid".to_string(),
                client_secret: "secret".to_string(),
            },
            discord: DiscordConfig {
                bot_token: "token".to_string(),
                targets: logins
                    .iter()
                    .enumerate()
                    .map(|(i, login)| TargetConfig {
                        guild_id: "g1".to_string(),
                        channel_id: format!("chan{i}"),
                        mention_id: String::new(),
                        twitch_login: login.to_string(),
                        notify: Default::default(),
                    })
                    .collect(),
            },
            settings: SettingsConfig {
                check_interval_ms: interval_ms,
                ..SettingsConfig::default()
            },
        }
    }

    fn build(config: &AppConfig) -> (Runner, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let twitch =
            Arc::new(TwitchApi::new("cid".to_string(), "secret".to_string()).expect("twitch"));
        let sink: Arc<dyn NotifySink> =
            Arc::new(DiscordApi::new("token".to_string()).expect("discord"));
        let store = Arc::new(IdStore::open(&dir.path().join("ids.json")));
        let runner = Runner::new(config, twitch, sink, store, Arc::new(Messages::embedded()));
        (runner, dir)
    }

    #[test]
    fn pollers_are_deduplicated_by_login() {
        let config = config_with(15_000, &["alice", "alice", "bob"]);
        let (runner, _dir) = build(&config);
        assert_eq!(runner.pollers.len(), 2);
        assert_eq!(runner.notifiers.len(), 3);
        let logins: Vec<&str> = runner.pollers.iter().map(Poller::login).collect();
        assert_eq!(logins, vec!["alice", "bob"]);
    }

    #[test]
    fn configured_interval_is_kept_above_the_floor() {
        let config = config_with(15_000, &["alice"]);
        let (runner, _dir) = build(&config);
        assert_eq!(runner.interval(), Duration::from_millis(15_000));

        let config = config_with(200, &["alice"]);
        let (runner, _dir) = build(&config);
        assert_eq!(runner.interval(), Duration::from_millis(1_000));
    }
}
