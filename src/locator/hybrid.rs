/// Selector-first element location with a vision fallback.
///
/// Every `locate` call appends exactly one `HealingEvent`; the statistics are
/// derived from that log on demand.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::driver::traits::{find_element, DeviceDriver};
use crate::driver::types::ElementResult;
use crate::errors::{PilotError, PilotResult};
use crate::locator::analytics::HealingLogger;
use crate::locator::strategy::LocatorStrategy;
use crate::perception::types::Point;

const DEFAULT_FOCUS_SETTLE: Duration = Duration::from_millis(300);

/// Finds an element's center on a screenshot from a natural-language description.
#[async_trait]
pub trait VisionFallback: Send + Sync {
    /// `Ok(None)` when the element is not visible.
    async fn find(&self, description: &str, screenshot_b64: &str) -> PilotResult<Option<Point>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocateMethod {
    Selector,
    Vision,
    None,
}

/// Method recorded on a healing event. Failures are recorded as `Selector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealMethod {
    Selector,
    Vision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingEvent {
    pub timestamp: DateTime<Utc>,
    pub locator: LocatorStrategy,
    pub success: bool,
    pub method: HealMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub healing_triggered: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocateOutcome {
    pub found: bool,
    pub coordinates: Option<Point>,
    pub method: LocateMethod,
    pub healing_triggered: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealingStats {
    pub total_attempts: usize,
    pub selector_successes: usize,
    pub vision_successes: usize,
    pub failures: usize,
    /// vision successes / total attempts
    pub healing_rate: f64,
    /// (selector + vision successes) / total attempts
    pub success_rate: f64,
}

impl HealingStats {
    pub fn from_events(events: &[HealingEvent]) -> Self {
        let total_attempts = events.len();
        let mut stats = Self {
            total_attempts,
            ..Self::default()
        };
        for e in events {
            match (e.success, e.method) {
                (true, HealMethod::Selector) => stats.selector_successes += 1,
                (true, HealMethod::Vision) => stats.vision_successes += 1,
                (false, _) => stats.failures += 1,
            }
        }
        if total_attempts > 0 {
            let total = total_attempts as f64;
            stats.healing_rate = stats.vision_successes as f64 / total;
            stats.success_rate = (stats.selector_successes + stats.vision_successes) as f64 / total;
        }
        stats
    }
}

pub struct HybridLocator {
    driver: Arc<dyn DeviceDriver>,
    vision: Option<Arc<dyn VisionFallback>>,
    analytics: Option<HealingLogger>,
    focus_settle: Duration,
    events: Vec<HealingEvent>,
}

impl HybridLocator {
    pub fn new(driver: Arc<dyn DeviceDriver>) -> Self {
        Self {
            driver,
            vision: None,
            analytics: None,
            focus_settle: DEFAULT_FOCUS_SETTLE,
            events: Vec::new(),
        }
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionFallback>) -> Self {
        self.vision = Some(vision);
        self
    }

    /// Forwards every recorded event to `logger`.
    pub fn with_analytics(mut self, logger: HealingLogger) -> Self {
        self.analytics = Some(logger);
        self
    }

    pub fn with_focus_settle(mut self, settle: Duration) -> Self {
        self.focus_settle = settle;
        self
    }

    pub fn events(&self) -> &[HealingEvent] {
        &self.events
    }

    pub fn analytics(&self) -> Option<&HealingLogger> {
        self.analytics.as_ref()
    }

    pub fn healing_stats(&self) -> HealingStats {
        HealingStats::from_events(&self.events)
    }

    pub async fn locate(&mut self, locator: &LocatorStrategy, description: &str) -> LocateOutcome {
        let structural_error = match find_element(self.driver.as_ref(), locator).await {
            Ok(ElementResult::Found { center, .. }) => {
                tracing::debug!(%locator, x = center.x, y = center.y, "selector resolved element");
                self.record(locator, true, HealMethod::Selector, Some(center), None, false);
                return LocateOutcome {
                    found: true,
                    coordinates: Some(center),
                    method: LocateMethod::Selector,
                    healing_triggered: false,
                    error: None,
                };
            }
            Ok(ElementResult::NotFound { reason }) => Some(reason),
            Err(e) => Some(e.to_string()),
        };

        if let Some(vision) = self.vision.clone() {
            tracing::info!(%locator, description, "selector failed, trying vision fallback");
            match self.driver.screenshot().await {
                Ok(shot) => match vision.find(description, &shot).await {
                    Ok(Some(point)) => {
                        self.record(locator, true, HealMethod::Vision, Some(point), None, true);
                        return LocateOutcome {
                            found: true,
                            coordinates: Some(point),
                            method: LocateMethod::Vision,
                            healing_triggered: true,
                            error: None,
                        };
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "vision fallback failed"),
                },
                Err(e) => tracing::warn!(error = %e, "screenshot for vision fallback failed"),
            }
        }

        let error = structural_error
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| format!("element not found: {description}"));
        let healing_triggered = self.vision.is_some();
        tracing::warn!(%locator, description, error = %error, "element could not be located");
        self.record(
            locator,
            false,
            HealMethod::Selector,
            None,
            Some(error.clone()),
            healing_triggered,
        );
        LocateOutcome {
            found: false,
            coordinates: None,
            method: LocateMethod::None,
            healing_triggered,
            error: Some(error),
        }
    }

    pub async fn locate_and_tap(
        &mut self,
        locator: &LocatorStrategy,
        description: &str,
    ) -> PilotResult<LocateMethod> {
        let outcome = self.locate(locator, description).await;
        match outcome.coordinates {
            Some(p) if outcome.found => {
                self.driver.tap(p.x, p.y).await?;
                Ok(outcome.method)
            }
            _ => Err(PilotError::Location {
                description: description.to_string(),
                reason: outcome.error.unwrap_or_else(|| "not found".into()),
            }),
        }
    }

    pub async fn locate_and_type(
        &mut self,
        locator: &LocatorStrategy,
        description: &str,
        text: &str,
    ) -> PilotResult<LocateMethod> {
        let method = self.locate_and_tap(locator, description).await?;
        tokio::time::sleep(self.focus_settle).await;
        self.driver.type_text(text).await?;
        Ok(method)
    }

    fn record(
        &mut self,
        locator: &LocatorStrategy,
        success: bool,
        method: HealMethod,
        coordinates: Option<Point>,
        error: Option<String>,
        healing_triggered: bool,
    ) {
        let event = HealingEvent {
            timestamp: Utc::now(),
            locator: locator.clone(),
            success,
            method,
            coordinates,
            error,
            healing_triggered,
        };
        if let Some(logger) = self.analytics.as_mut() {
            logger.log_event(event.clone());
        }
        self.events.push(event);
    }
}
