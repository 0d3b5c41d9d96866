use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tgsender::config::Config;
use tgsender::handler;
use tgsender::routing::ChannelMapping;
use tgsender::watcher::DirectoryWatcher;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Initialize logging
    let default_filter = if config.sender.debug {
        "info,tgsender=debug"
    } else {
        "info,tgsender=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Configuration loaded from: {}", config_path.display());
    info!("  Watch directory: {}", config.watch.directory.display());
    info!(
        "  Channel mappings: {}",
        ChannelMapping::parse(&config.routing.channel_mapping).len()
    );
    info!("  Full resolution: {}", config.sender.full_resolution);

    let watcher = DirectoryWatcher::new(
        &config.watch.directory,
        Duration::from_millis(config.watch.poll_interval_ms),
    )
    .await?;

    let (tx, mut rx) = mpsc::channel(64);
    tokio::spawn(watcher.run(tx));

    let http = reqwest::Client::new();

    info!("Waiting for saved images...");
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                config = reload(&config_path, config);
                // Uploads run detached
                let _ = handler::on_image_saved(&event, &config.sender_settings(), &http).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Re-read the config so edits apply to the next image; keep the last good
/// one when the file is broken.
fn reload(path: &Path, current: Config) -> Config {
    match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Keeping previous configuration: {:#}", e);
            current
        }
    }
}
