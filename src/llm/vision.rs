/// Vision fallback: asks the vision-role model where an element is.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::PilotResult;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::locator::hybrid::VisionFallback;
use crate::perception::screenshot;
use crate::perception::types::Point;

const VISION_SYSTEM_PROMPT: &str = "\
You locate UI elements on mobile screenshots.
Reply with exactly one JSON object {\"x\": <int>, \"y\": <int>} giving the pixel
coordinates of the center of the requested element, measured from the top-left
corner of the screenshot. If the element is not visible, reply with null.
No prose, no code fences.";

pub struct VisionLocator {
    provider: Arc<dyn LlmProvider>,
    cfg: CallConfig,
}

#[derive(Deserialize)]
struct Coords {
    x: f64,
    y: f64,
}

impl VisionLocator {
    pub fn new(provider: Arc<dyn LlmProvider>, cfg: CallConfig) -> Self {
        Self { provider, cfg }
    }

    async fn ask(&self, description: &str, screenshot_b64: &str) -> PilotResult<Option<Point>> {
        let dims = screenshot::dimensions(screenshot_b64);
        let mut prompt = format!("Element: {description}");
        if let Some((w, h)) = dims {
            prompt.push_str(&format!("\nScreenshot size: {w}x{h} pixels."));
        }

        let messages = vec![
            ChatMessage::system(VISION_SYSTEM_PROMPT),
            ChatMessage::user_with_image(prompt, screenshot::to_data_uri(screenshot_b64)),
        ];
        let response = self.provider.chat(messages, &self.cfg).await?;
        let point = parse_coordinates(&response.content);

        if let (Some(p), Some((w, h))) = (point, dims) {
            if p.x as u32 >= w || p.y as u32 >= h {
                tracing::warn!(x = p.x, y = p.y, w, h, "vision coordinates outside screenshot");
                return Ok(None);
            }
        }
        Ok(point)
    }
}

/// Reads `{"x":..,"y":..}` or `null` out of a model reply.
/// Anything else is treated as "not found".
pub fn parse_coordinates(reply: &str) -> Option<Point> {
    let mut text = reply.trim();
    if let Some(inner) = text.strip_prefix("```") {
        let inner = inner.strip_prefix("json").unwrap_or(inner);
        text = inner.trim_end().strip_suffix("```").unwrap_or(inner).trim();
    }
    if text.eq_ignore_ascii_case("null") {
        return None;
    }
    let coords: Coords = serde_json::from_str(text).ok()?;
    if !coords.x.is_finite() || !coords.y.is_finite() || coords.x < 0.0 || coords.y < 0.0 {
        return None;
    }
    Some(Point::new(coords.x.round() as i32, coords.y.round() as i32))
}

#[async_trait]
impl VisionFallback for VisionLocator {
    async fn find(&self, description: &str, screenshot_b64: &str) -> PilotResult<Option<Point>> {
        match self.ask(description, screenshot_b64).await {
            Ok(Some(p)) => {
                tracing::info!(description, x = p.x, y = p.y, "vision located element");
                Ok(Some(p))
            }
            Ok(None) => {
                tracing::info!(description, "vision could not locate element");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(description, error = %e, "vision request failed; treating as not found");
                Ok(None)
            }
        }
    }
}
