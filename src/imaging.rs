//! Downscaling saved images for Telegram's inline photo path.
//!
//! Resizing keeps the aspect ratio and pins the longest side to the
//! configured threshold. Images already within bounds are passed through
//! byte-for-byte so nothing is re-encoded needlessly.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType};
use thiserror::Error;
use tracing::debug;

/// Longest side allowed for inline photos unless configured otherwise.
pub const DEFAULT_MAX_SIZE: u32 = 2560;

/// JPEG quality used for resized copies.
pub const RESIZE_QUALITY: u8 = 85;

const MIN_COMPRESS_QUALITY: u8 = 30;
const COMPRESS_QUALITY_STEP: u8 = 10;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("failed to decode image")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode JPEG")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOptions {
    /// Longest-side threshold in pixels.
    pub max_size: u32,
    /// Separate threshold for landscape and square images, if set.
    pub landscape_max_width: Option<u32>,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            landscape_max_width: None,
        }
    }
}

impl ResizeOptions {
    pub fn threshold_for(&self, width: u32, height: u32) -> u32 {
        match self.landscape_max_width {
            Some(landscape) if width >= height => landscape,
            _ => self.max_size,
        }
    }
}

/// An encoded image ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    /// Pixel dimensions, when the image was decoded.
    pub dimensions: Option<(u32, u32)>,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            dimensions: None,
        }
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Dimensions that fit `(width, height)` inside `max` on the longest side.
///
/// Returns `None` when the image already fits. The longest output side is
/// exactly `max`; the short side is rounded and never drops below 1.
pub fn fit_within(width: u32, height: u32, max: u32) -> Option<(u32, u32)> {
    let longest = width.max(height);
    if longest <= max || max == 0 {
        return None;
    }
    let scale = |side: u32| -> u32 {
        ((side as f64 * max as f64 / longest as f64).round() as u32).clamp(1, max)
    };
    if width >= height {
        Some((max, scale(height)))
    } else {
        Some((scale(width), max))
    }
}

/// Produce the inline-photo copy of a saved image.
pub fn resize_for_photo(
    original: &[u8],
    file_name: &str,
    options: &ResizeOptions,
) -> Result<ImagePayload, ImagingError> {
    let img = image::load_from_memory(original).map_err(ImagingError::Decode)?;
    let (width, height) = (img.width(), img.height());
    let threshold = options.threshold_for(width, height);

    let Some((new_width, new_height)) = fit_within(width, height, threshold) else {
        debug!(
            "{} is {}x{}, within {}px; sending as-is",
            file_name, width, height, threshold
        );
        return Ok(ImagePayload {
            bytes: original.to_vec(),
            file_name: file_name.to_string(),
            dimensions: Some((width, height)),
        });
    };

    let resized = img.resize_exact(new_width, new_height, FilterType::Lanczos3);
    let bytes = encode_jpeg(&resized, RESIZE_QUALITY)?;
    debug!(
        "Resized {} from {}x{} to {}x{} ({} bytes)",
        file_name,
        width,
        height,
        new_width,
        new_height,
        bytes.len()
    );

    Ok(ImagePayload {
        bytes,
        file_name: derived_name(file_name, "resized"),
        dimensions: Some((new_width, new_height)),
    })
}

/// Re-encode at falling JPEG quality until the payload fits `cap` bytes.
///
/// Starts at quality 85 and steps down by 10; when no quality fits, the
/// smallest attempt is returned.
pub fn compress_to_fit(payload: &ImagePayload, cap: u64) -> Result<ImagePayload, ImagingError> {
    let img = image::load_from_memory(&payload.bytes).map_err(ImagingError::Decode)?;
    let file_name = derived_name(&payload.file_name, "compressed");

    let mut smallest: Option<Vec<u8>> = None;
    let mut quality = RESIZE_QUALITY;
    while quality >= MIN_COMPRESS_QUALITY {
        let bytes = encode_jpeg(&img, quality)?;
        debug!(
            "Compressed {} at quality {}: {} bytes",
            payload.file_name,
            quality,
            bytes.len()
        );
        if bytes.len() as u64 <= cap {
            smallest = Some(bytes);
            break;
        }
        if smallest.as_ref().map_or(true, |s| bytes.len() < s.len()) {
            smallest = Some(bytes);
        }
        quality -= COMPRESS_QUALITY_STEP;
    }

    Ok(ImagePayload {
        bytes: smallest.unwrap_or_else(|| payload.bytes.clone()),
        file_name,
        dimensions: Some((img.width(), img.height())),
    })
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImagingError> {
    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(ImagingError::Encode)?;
    Ok(buf.into_inner())
}

/// `image.png` + `resized` → `image_resized.jpg`
fn derived_name(file_name: &str, suffix: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    format!("{}_{}.jpg", stem, suffix)
}
