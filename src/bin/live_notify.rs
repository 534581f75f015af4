use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use twitch_live_notify::config::{AppConfig, CONFIG_PATH};
use twitch_live_notify::discord::{DiscordApi, NotifySink};
use twitch_live_notify::i18n::Messages;
use twitch_live_notify::runner::Runner;
use twitch_live_notify::store::IdStore;
use twitch_live_notify::twitch::TwitchApi;

#[derive(Parser)]
#[command(name = "live-notify", about = "Mirrors Twitch live status into Discord")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Run a single poll/notify round and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config = AppConfig::load(&args.config)?;
    config.apply_env_overrides();
    config.validate()?;
    info!(
        "Loaded config from {} ({} targets)",
        args.config.display(),
        config.discord.targets.len()
    );

    let messages = Arc::new(Messages::load(&config.settings.locale));
    let store = Arc::new(IdStore::open(Path::new(&config.settings.store_path)));
    let twitch = Arc::new(TwitchApi::new(
        config.twitch.client_id.clone(),
        config.twitch.client_secret.clone(),
    )?);
    let sink: Arc<dyn NotifySink> = Arc::new(DiscordApi::new(config.discord.bot_token.clone())?);

    let mut runner = Runner::new(&config, twitch, sink, store, messages);

    if args.once {
        runner.tick().await;
        return Ok(());
    }

    info!(
        "Entering polling loop (interval: {:?}). Press Ctrl+C to stop.",
        runner.interval()
    );
    runner.run().await;
    Ok(())
}
