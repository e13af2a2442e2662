// Screenshot payload helpers. Drivers hand screenshots around as base64 PNG.
use base64::Engine as _;

use crate::errors::{PilotError, PilotResult};

/// Decodes a base64 screenshot into raw image bytes.
/// Tolerates a `data:image/...;base64,` prefix.
pub fn decode_base64(image_base64: &str) -> PilotResult<Vec<u8>> {
    let payload = image_base64
        .split_once("base64,")
        .map(|(_, rest)| rest)
        .unwrap_or(image_base64)
        .trim();
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| PilotError::Capture(format!("screenshot is not valid base64: {e}")))
}

/// Pixel dimensions of a base64 screenshot, if it decodes as an image.
pub fn dimensions(image_base64: &str) -> Option<(u32, u32)> {
    let bytes = decode_base64(image_base64).ok()?;
    match image::load_from_memory(&bytes) {
        Ok(img) => Some((img.width(), img.height())),
        Err(e) => {
            tracing::debug!(error = %e, "screenshot did not decode as an image");
            None
        }
    }
}

/// Wraps a raw base64 PNG as a data URI for OpenAI-compatible image parts.
pub fn to_data_uri(image_base64: &str) -> String {
    if image_base64.starts_with("data:") {
        image_base64.to_string()
    } else {
        format!("data:image/png;base64,{image_base64}")
    }
}
