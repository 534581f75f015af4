pub mod config;
pub mod discord;
pub mod i18n;
pub mod notifier;
pub mod poller;
pub mod runner;
pub mod state;
pub mod store;
pub mod twitch;

/// Twitch Helix REST base URL (requires app access token + Client-Id)
pub const HELIX_API_BASE: &str = "https://api.twitch.tv/helix";

/// Twitch identity service base URL (client-credentials app tokens)
pub const TWITCH_ID_BASE: &str = "https://id.twitch.tv";

/// Discord REST base URL (bot-token auth)
pub const DISCORD_API_BASE: &str = "https://discord.com/api";

/// Twitch CDN serving game box-art images
pub const GAME_BOXART_BASE: &str = "https://static-cdn.jtvnw.net/ttv-boxart";
