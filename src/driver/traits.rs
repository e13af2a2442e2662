use std::time::Duration;

use async_trait::async_trait;

use crate::driver::types::{ElementResult, SwipeDirection};
use crate::errors::{PilotError, PilotResult};
use crate::locator::strategy::LocatorStrategy;
use crate::perception::types::ScreenSize;

/// Capability set of a device backend.
/// Implementations: `WebDriverDevice` (Appium over HTTP) and `MockDriver`.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Backend identifier for logs.
    fn name(&self) -> &str;

    async fn connect(&self) -> PilotResult<()>;

    async fn disconnect(&self) -> PilotResult<()>;

    /// Current screen as base64 PNG.
    async fn screenshot(&self) -> PilotResult<String>;

    /// Raw UI hierarchy (XML page source).
    async fn page_source(&self) -> PilotResult<String>;

    async fn tap(&self, x: i32, y: i32) -> PilotResult<()>;

    /// Types into whatever element currently has focus.
    async fn type_text(&self, text: &str) -> PilotResult<()>;

    async fn swipe(&self, direction: SwipeDirection, duration_ms: u64) -> PilotResult<()>;

    async fn press_key(&self, key: &str) -> PilotResult<()>;

    async fn wait_for(&self, ms: u64) -> PilotResult<()> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }

    async fn screen_size(&self) -> PilotResult<ScreenSize>;

    async fn find_by_accessibility_id(&self, id: &str) -> PilotResult<ElementResult>;

    async fn find_by_resource_id(&self, id: &str) -> PilotResult<ElementResult>;

    async fn find_by_text(&self, text: &str, exact: bool) -> PilotResult<ElementResult>;

    async fn find_by_path(&self, path: &str) -> PilotResult<ElementResult> {
        Ok(ElementResult::not_found(format!(
            "{} does not support structural path lookup ({path})",
            self.name()
        )))
    }

    /// Resolves a locator and taps its center.
    async fn tap_element(&self, locator: &LocatorStrategy) -> PilotResult<()> {
        match find_element(self, locator).await? {
            ElementResult::Found { center, .. } => self.tap(center.x, center.y).await,
            ElementResult::NotFound { reason } => Err(PilotError::Location {
                description: locator.to_string(),
                reason,
            }),
        }
    }

    /// Taps a located element to focus it, then types.
    async fn type_into_element(&self, locator: &LocatorStrategy, text: &str) -> PilotResult<()> {
        self.tap_element(locator).await?;
        self.type_text(text).await
    }
}

/// Structural lookup dispatched on the locator variant.
/// Coordinates resolve to themselves without touching the device.
pub async fn find_element<D>(driver: &D, locator: &LocatorStrategy) -> PilotResult<ElementResult>
where
    D: DeviceDriver + ?Sized,
{
    match locator {
        LocatorStrategy::AccessibilityId(id) => driver.find_by_accessibility_id(id).await,
        LocatorStrategy::ResourceId(id) => driver.find_by_resource_id(id).await,
        LocatorStrategy::Text(text) => driver.find_by_text(text, false).await,
        LocatorStrategy::Path(path) => driver.find_by_path(path).await,
        LocatorStrategy::Coordinates { x, y } => Ok(ElementResult::found(
            crate::perception::types::Point::new(*x, *y),
        )),
    }
}
