use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::imaging::{ResizeOptions, DEFAULT_MAX_SIZE};
use crate::telegram::{DEFAULT_API_BASE_URL, PHOTO_SIZE_CAP, PLACEHOLDER_TOKEN};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_telegram_config")]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default = "default_sender_config")]
    pub sender: SenderConfig,
    #[serde(default = "default_watch_config")]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default = "default_bot_token")]
    pub bot_token: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RoutingConfig {
    /// `key:chat_id` pairs separated by semicolons, e.g. `lora somelora:111`
    #[serde(default)]
    pub channel_mapping: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SenderConfig {
    /// Also send the untouched original as a document.
    #[serde(default)]
    pub full_resolution: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    #[serde(default)]
    pub landscape_max_width: Option<u32>,
    #[serde(default = "default_photo_size_cap")]
    pub photo_size_cap: u64,
    /// Step JPEG quality down when a resized photo is still over the cap.
    #[serde(default)]
    pub compress_oversized: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_watch_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Settings snapshot handed to the save-event handler.
#[derive(Debug, Clone)]
pub struct SenderSettings {
    pub token: String,
    pub api_base_url: String,
    pub mapping: String,
    pub full_resolution: bool,
    pub debug: bool,
    pub resize: ResizeOptions,
    pub photo_size_cap: u64,
    pub compress_oversized: bool,
}

impl Default for SenderSettings {
    fn default() -> Self {
        let sender = default_sender_config();
        Self {
            token: default_bot_token(),
            api_base_url: default_api_base_url(),
            mapping: String::new(),
            full_resolution: sender.full_resolution,
            debug: sender.debug,
            resize: ResizeOptions::default(),
            photo_size_cap: sender.photo_size_cap,
            compress_oversized: sender.compress_oversized,
        }
    }
}

fn default_bot_token() -> String {
    PLACEHOLDER_TOKEN.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_max_size() -> u32 {
    DEFAULT_MAX_SIZE
}

fn default_photo_size_cap() -> u64 {
    PHOTO_SIZE_CAP
}

fn default_watch_directory() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_telegram_config() -> TelegramConfig {
    TelegramConfig {
        bot_token: default_bot_token(),
        api_base_url: default_api_base_url(),
    }
}

fn default_sender_config() -> SenderConfig {
    SenderConfig {
        full_resolution: false,
        debug: false,
        max_size: default_max_size(),
        landscape_max_width: None,
        photo_size_cap: default_photo_size_cap(),
        compress_oversized: false,
    }
}

fn default_watch_config() -> WatchConfig {
    WatchConfig {
        directory: default_watch_directory(),
        poll_interval_ms: default_poll_interval_ms(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;

        if config.sender.max_size == 0 {
            anyhow::bail!("sender.max_size must be greater than zero");
        }
        if config.sender.landscape_max_width == Some(0) {
            anyhow::bail!("sender.landscape_max_width must be greater than zero");
        }
        if config.watch.poll_interval_ms == 0 {
            anyhow::bail!("watch.poll_interval_ms must be greater than zero");
        }

        Ok(config)
    }

    /// Snapshot the settings one save event needs.
    pub fn sender_settings(&self) -> SenderSettings {
        SenderSettings {
            token: self.telegram.bot_token.clone(),
            api_base_url: self.telegram.api_base_url.clone(),
            mapping: self.routing.channel_mapping.clone(),
            full_resolution: self.sender.full_resolution,
            debug: self.sender.debug,
            resize: ResizeOptions {
                max_size: self.sender.max_size,
                landscape_max_width: self.sender.landscape_max_width,
            },
            photo_size_cap: self.sender.photo_size_cap,
            compress_oversized: self.sender.compress_oversized,
        }
    }
}
