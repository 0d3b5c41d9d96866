//! Save-event handling: route a freshly written image to its chat and
//! spawn the uploads.
//!
//! The handler never fails. Unrouted files, unreadable images and upload
//! errors are logged and dropped so the pipeline that saved the image is
//! never held up.

use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SenderSettings;
use crate::imaging::{self, ImagePayload};
use crate::routing::{self, ChannelMapping};
use crate::telegram::{SendError, TelegramClient, UploadMode};

/// Grid images produced alongside a batch are never sent.
const GRID_DIR_MARKER: &str = "outputs/grids/";

/// Routing and payload details: `info!` when the sender's debug toggle is
/// on, `debug!` otherwise.
macro_rules! detail {
    ($settings:expr, $($arg:tt)+) => {
        if $settings.debug {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// A file written by the image-generation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub path: PathBuf,
}

impl SavedImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub payload: ImagePayload,
    pub mode: UploadMode,
}

/// Everything to send for one saved image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPlan {
    pub chat_id: String,
    pub uploads: Vec<Upload>,
}

pub fn is_grid_image(path: &Path) -> bool {
    path.to_string_lossy()
        .replace('\\', "/")
        .contains(GRID_DIR_MARKER)
}

/// Resolve a file name to `(routing key, chat id)`.
pub fn route(file_name: &str, mapping: &ChannelMapping) -> Option<(String, String)> {
    let key = routing::extract_key(file_name)?;
    let chat_id = mapping.resolve(&key)?.to_string();
    Some((key, chat_id))
}

/// Decide what to upload for one image.
///
/// The resized copy goes out as a photo, or as a document when it is still
/// over the photo cap. With full resolution on, the original bytes follow
/// as a document.
pub fn plan_delivery(
    chat_id: &str,
    original: Vec<u8>,
    file_name: &str,
    settings: &SenderSettings,
) -> DeliveryPlan {
    let mut photo = match imaging::resize_for_photo(&original, file_name, &settings.resize) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(
                "Error resizing image {}: {:#}; sending original",
                file_name,
                anyhow::Error::new(e)
            );
            ImagePayload::new(original.clone(), file_name)
        }
    };

    if settings.compress_oversized && photo.len() as u64 > settings.photo_size_cap {
        match imaging::compress_to_fit(&photo, settings.photo_size_cap) {
            Ok(compressed) => photo = compressed,
            Err(e) => warn!(
                "Error compressing image {}: {:#}",
                file_name,
                anyhow::Error::new(e)
            ),
        }
    }

    let mode = UploadMode::for_size(photo.len() as u64, settings.photo_size_cap);
    detail!(
        settings,
        "Prepared {} ({} bytes, {:?}) as {}",
        photo.file_name,
        photo.len(),
        photo.dimensions,
        mode
    );
    if mode == UploadMode::Document {
        info!(
            "{} is {} bytes, over the {} byte photo cap; sending as document",
            photo.file_name,
            photo.len(),
            settings.photo_size_cap
        );
    }

    let mut uploads = vec![Upload {
        payload: photo,
        mode,
    }];
    if settings.full_resolution {
        uploads.push(Upload {
            payload: ImagePayload::new(original, file_name),
            mode: UploadMode::Document,
        });
    }

    DeliveryPlan {
        chat_id: chat_id.to_string(),
        uploads,
    }
}

/// Spawn one task per upload. The handles may be dropped.
pub fn dispatch(plan: DeliveryPlan, client: &TelegramClient) -> Vec<JoinHandle<()>> {
    let DeliveryPlan { chat_id, uploads } = plan;
    uploads
        .into_iter()
        .map(|upload| {
            let client = client.clone();
            let chat_id = chat_id.clone();
            tokio::spawn(async move {
                let file_name = upload.payload.file_name.clone();
                match client.send(&chat_id, upload.payload, upload.mode).await {
                    Ok(()) => {}
                    Err(SendError::MissingToken) => {
                        warn!("Telegram bot token is not configured; send of {} canceled", file_name)
                    }
                    Err(e) => error!("Error sending {} to chat {}: {}", file_name, chat_id, e),
                }
            })
        })
        .collect()
}

/// Handle one saved image end to end.
///
/// Returns the spawned upload tasks; an empty list means nothing was sent.
pub async fn on_image_saved(
    event: &SavedImage,
    settings: &SenderSettings,
    http: &reqwest::Client,
) -> Vec<JoinHandle<()>> {
    if is_grid_image(&event.path) {
        debug!("Ignoring grid image {}", event.path.display());
        return Vec::new();
    }

    let Some(file_name) = event.file_name().map(str::to_string) else {
        debug!("Ignoring path without a file name: {}", event.path.display());
        return Vec::new();
    };

    let mapping = ChannelMapping::parse(&settings.mapping);
    let Some((key, chat_id)) = route(&file_name, &mapping) else {
        info!(
            "No mapping found for key '{}'. Not sending image.",
            routing::extract_key(&file_name).unwrap_or_default()
        );
        return Vec::new();
    };
    detail!(settings, "Routed {} via key '{}' to chat {}", file_name, key, chat_id);

    let client = match TelegramClient::new(http.clone(), &settings.api_base_url, &settings.token) {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            return Vec::new();
        }
    };
    if !client.is_configured() {
        warn!("Telegram bot token is not configured; send canceled");
        return Vec::new();
    }

    let original = match tokio::fs::read(&event.path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read {}: {}", event.path.display(), e);
            return Vec::new();
        }
    };

    info!(
        "Sending '{}' to Telegram (chat {})",
        event.path.display(),
        chat_id
    );

    let plan_settings = settings.clone();
    let plan = match tokio::task::spawn_blocking(move || {
        plan_delivery(&chat_id, original, &file_name, &plan_settings)
    })
    .await
    {
        Ok(plan) => plan,
        Err(e) => {
            error!("Image preparation task failed: {}", e);
            return Vec::new();
        }
    };

    dispatch(plan, &client)
}
