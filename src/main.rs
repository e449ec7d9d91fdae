use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use matchcast::config::Config;
use matchcast::lol::LolTracker;
use matchcast::maplestory::MapleStoryTracker;
use matchcast::poller::Poller;
use matchcast::registry::Registry;
use matchcast::sink::DiscordSink;
use matchcast::storage::{Repository, SqliteRepository};

#[tokio::main]
async fn main() {
    // Load .env before the logger so RUST_LOG from .env takes effect.
    let _ = dotenvy::dotenv();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let repo: Arc<dyn Repository> = match SqliteRepository::open(&config.database_path) {
        Ok(repo) => Arc::new(repo),
        Err(e) => {
            log::error!(
                "failed to open database {}: {e}",
                config.database_path.display()
            );
            std::process::exit(1);
        }
    };

    let registry = Arc::new(Registry::new());
    if let Some(key) = &config.riot_api_key {
        registry.register(Arc::new(LolTracker::new(
            key,
            config.request_spacing,
            config.throttle_backoff,
        )));
    }
    if let Some(key) = &config.nexon_api_key {
        registry.register(Arc::new(MapleStoryTracker::new(
            key,
            config.request_spacing,
            config.throttle_backoff,
        )));
    }
    log::info!("registered {} game tracker(s)", registry.list().len());

    let sink = Arc::new(DiscordSink::new(
        &config.discord_token,
        config.request_spacing,
        config.throttle_backoff,
    ));

    let poller = Arc::new(Poller::new(repo, registry, sink, config.poll_interval));
    let cancellation = CancellationToken::new();
    let handle = poller.spawn(cancellation.clone());

    log::info!("matchcast running, press Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {e}");
    }

    log::info!("shutting down");
    cancellation.cancel();
    handle.stop().await;
    log::info!("stopped");
}
