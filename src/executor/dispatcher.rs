/// Executes one parsed action against the device.
use std::time::Duration;

use crate::agent_engine::parser::{ActionKind, ReasonerOutput};
use crate::config::AgentConfig;
use crate::driver::traits::DeviceDriver;
use crate::errors::{PilotError, PilotResult};
use crate::locator::hybrid::HybridLocator;

/// Result of a successfully executed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// History line describing what was done.
    pub summary: String,
    /// Set only by `done`.
    pub complete: bool,
}

impl Dispatched {
    fn performed(summary: String) -> Self {
        Self {
            summary,
            complete: false,
        }
    }
}

pub struct Dispatcher<'a> {
    driver: &'a dyn DeviceDriver,
    locator: &'a mut HybridLocator,
    cfg: &'a AgentConfig,
}

impl<'a> Dispatcher<'a> {
    pub fn new(driver: &'a dyn DeviceDriver, locator: &'a mut HybridLocator, cfg: &'a AgentConfig) -> Self {
        Self {
            driver,
            locator,
            cfg,
        }
    }

    /// Any failure comes back as `PilotError::Executor`.
    pub async fn dispatch(&mut self, action: &ReasonerOutput) -> PilotResult<Dispatched> {
        let kind = action.action;
        tracing::info!(action = %kind, target = %action.target_element, "executing action");
        let result = match kind {
            ActionKind::Click => self.click(action).await,
            ActionKind::Type => self.type_text(action).await,
            ActionKind::Swipe => self.swipe(action).await,
            ActionKind::Wait => self.wait(action).await,
            ActionKind::Done => Ok(Dispatched {
                summary: format!("done: {}", action.thought),
                complete: true,
            }),
        };
        result.map_err(|e| match e {
            PilotError::Executor(_) => e,
            other => PilotError::Executor(format!("{kind} failed: {other}")),
        })
    }

    async fn click(&mut self, action: &ReasonerOutput) -> PilotResult<Dispatched> {
        let description = action.description();
        if let Some(locator) = action.locator() {
            match self.locator.locate_and_tap(&locator, description).await {
                Ok(method) => {
                    return Ok(Dispatched::performed(format!(
                        "click '{description}' via {locator} ({method:?})"
                    )));
                }
                Err(e) => match action.coordinates() {
                    Some((x, y)) => {
                        tracing::warn!(error = %e, x, y, "locate failed, tapping explicit coordinates");
                        self.driver.tap(x, y).await?;
                        return Ok(Dispatched::performed(format!(
                            "click '{description}' at ({x},{y}) after locate failed"
                        )));
                    }
                    None => return Err(e),
                },
            }
        }

        let (x, y) = action.coordinates().ok_or_else(|| {
            PilotError::Executor("click needs a selector or x/y coordinates".into())
        })?;
        self.driver.tap(x, y).await?;
        Ok(Dispatched::performed(format!("click '{description}' at ({x},{y})")))
    }

    async fn type_text(&mut self, action: &ReasonerOutput) -> PilotResult<Dispatched> {
        let text = action
            .parameters
            .text
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PilotError::Executor("type needs non-empty text".into()))?;
        let description = action.description();

        if let Some(locator) = action.locator() {
            match self.locator.locate_and_type(&locator, description, text).await {
                Ok(_) => {
                    return Ok(Dispatched::performed(format!(
                        "type \"{text}\" into '{description}'"
                    )));
                }
                Err(e @ PilotError::Location { .. }) => {
                    tracing::warn!(error = %e, "locate failed, typing into focused element");
                }
                Err(e) => return Err(e),
            }
        }

        self.driver.type_text(text).await?;
        Ok(Dispatched::performed(format!("type \"{text}\" into focused element")))
    }

    async fn swipe(&mut self, action: &ReasonerOutput) -> PilotResult<Dispatched> {
        let direction = action
            .parameters
            .direction
            .ok_or_else(|| PilotError::Executor("swipe needs a direction".into()))?;
        self.driver.swipe(direction, self.cfg.swipe_duration_ms).await?;
        Ok(Dispatched::performed(format!("swipe {direction}")))
    }

    async fn wait(&mut self, action: &ReasonerOutput) -> PilotResult<Dispatched> {
        let ms = action.parameters.duration.unwrap_or(self.cfg.default_wait_ms);
        tracing::info!(ms, "waiting");
        self.driver.wait_for(ms).await?;
        Ok(Dispatched::performed(format!("wait {ms}ms")))
    }
}

/// Pause after a successful action so the UI can settle.
pub async fn settle(cfg: &AgentConfig) {
    if cfg.settle_ms > 0 {
        tokio::time::sleep(Duration::from_millis(cfg.settle_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent_engine::parser::parse_action;
    use crate::driver::mock::{MockAction, MockDriver};
    use crate::driver::types::SwipeDirection;
    use crate::perception::types::Point;

    struct Fixture {
        driver: Arc<MockDriver>,
        locator: HybridLocator,
        cfg: AgentConfig,
    }

    fn fixture() -> Fixture {
        let driver = Arc::new(MockDriver::login_flow());
        let locator = HybridLocator::new(driver.clone()).with_focus_settle(Duration::ZERO);
        Fixture {
            driver,
            locator,
            cfg: AgentConfig::default(),
        }
    }

    async fn run(f: &mut Fixture, raw: &str) -> PilotResult<Dispatched> {
        let action = parse_action(raw).unwrap();
        Dispatcher::new(f.driver.as_ref(), &mut f.locator, &f.cfg)
            .dispatch(&action)
            .await
    }

    #[tokio::test]
    async fn click_with_selector_taps_element() {
        let mut f = fixture();
        let out = run(
            &mut f,
            r#"{"thought": "t", "action": "click", "parameters": {"selector": "id:login_button"}}"#,
        )
        .await
        .unwrap();
        assert!(!out.complete);
        assert_eq!(f.driver.actions().await, vec![MockAction::Tap(Point::new(540, 1220))]);
        assert_eq!(f.driver.current_screen().await, "home");
    }

    #[tokio::test]
    async fn click_falls_back_to_coordinates() {
        let mut f = fixture();
        run(
            &mut f,
            r#"{"thought": "t", "action": "click", "parameters": {"selector": "id:gone", "x": 5, "y": 6}}"#,
        )
        .await
        .unwrap();
        assert_eq!(f.driver.actions().await, vec![MockAction::Tap(Point::new(5, 6))]);
    }

    #[tokio::test]
    async fn click_without_target_fails() {
        let mut f = fixture();
        let err = run(&mut f, r#"{"thought": "t", "action": "click"}"#).await.unwrap_err();
        assert!(matches!(err, PilotError::Executor(_)));

        let err = run(
            &mut f,
            r#"{"thought": "t", "action": "click", "parameters": {"selector": "id:gone"}}"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PilotError::Executor(_)));
        assert!(f.driver.actions().await.is_empty());
    }

    #[tokio::test]
    async fn type_requires_text() {
        let mut f = fixture();
        let err = run(&mut f, r#"{"thought": "t", "action": "type", "parameters": {"text": ""}}"#)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("non-empty text"));
    }

    #[tokio::test]
    async fn type_falls_back_to_focused_element() {
        let mut f = fixture();
        run(
            &mut f,
            r#"{"thought": "t", "action": "type", "parameters": {"text": "hi", "selector": "id:gone"}}"#,
        )
        .await
        .unwrap();
        assert_eq!(f.driver.actions().await, vec![MockAction::Type("hi".into())]);
    }

    struct BrokenKeyboard(MockDriver);

    #[async_trait::async_trait]
    impl DeviceDriver for BrokenKeyboard {
        fn name(&self) -> &str {
            "broken-keyboard"
        }
        async fn connect(&self) -> PilotResult<()> {
            Ok(())
        }
        async fn disconnect(&self) -> PilotResult<()> {
            Ok(())
        }
        async fn screenshot(&self) -> PilotResult<String> {
            self.0.screenshot().await
        }
        async fn page_source(&self) -> PilotResult<String> {
            self.0.page_source().await
        }
        async fn tap(&self, x: i32, y: i32) -> PilotResult<()> {
            self.0.tap(x, y).await
        }
        async fn type_text(&self, text: &str) -> PilotResult<()> {
            self.0.type_text(text).await?;
            Err(PilotError::Driver("keyboard unavailable".into()))
        }
        async fn swipe(&self, direction: SwipeDirection, duration_ms: u64) -> PilotResult<()> {
            self.0.swipe(direction, duration_ms).await
        }
        async fn press_key(&self, key: &str) -> PilotResult<()> {
            self.0.press_key(key).await
        }
        async fn screen_size(&self) -> PilotResult<crate::perception::types::ScreenSize> {
            self.0.screen_size().await
        }
        async fn find_by_accessibility_id(&self, id: &str) -> PilotResult<crate::driver::types::ElementResult> {
            self.0.find_by_accessibility_id(id).await
        }
        async fn find_by_resource_id(&self, id: &str) -> PilotResult<crate::driver::types::ElementResult> {
            self.0.find_by_resource_id(id).await
        }
        async fn find_by_text(&self, text: &str, exact: bool) -> PilotResult<crate::driver::types::ElementResult> {
            self.0.find_by_text(text, exact).await
        }
    }

    #[tokio::test]
    async fn failed_typing_after_locate_is_not_retried() {
        let driver = Arc::new(BrokenKeyboard(MockDriver::login_flow()));
        let mut locator = HybridLocator::new(driver.clone()).with_focus_settle(Duration::ZERO);
        let cfg = AgentConfig::default();
        let action = parse_action(
            r#"{"thought": "t", "action": "type", "parameters": {"text": "hi", "selector": "id:username"}}"#,
        )
        .unwrap();

        let err = Dispatcher::new(driver.as_ref(), &mut locator, &cfg)
            .dispatch(&action)
            .await
            .unwrap_err();

        assert!(matches!(err, PilotError::Executor(ref m) if m.contains("keyboard unavailable")));
        assert_eq!(
            driver.0.actions().await,
            vec![MockAction::Tap(Point::new(540, 770)), MockAction::Type("hi".into())]
        );
    }

    #[tokio::test]
    async fn swipe_uses_configured_duration() {
        let mut f = fixture();
        run(&mut f, r#"{"thought": "t", "action": "scroll", "parameters": {"direction": "up"}}"#)
            .await
            .unwrap();
        assert_eq!(
            f.driver.actions().await,
            vec![MockAction::Swipe(SwipeDirection::Up, 500)]
        );

        let err = run(&mut f, r#"{"thought": "t", "action": "swipe"}"#).await.unwrap_err();
        assert!(err.to_string().contains("direction"));
    }

    #[tokio::test]
    async fn wait_and_done() {
        let mut f = fixture();
        let out = run(&mut f, r#"{"thought": "t", "action": "wait"}"#).await.unwrap();
        assert_eq!(out.summary, "wait 500ms");

        let out = run(&mut f, r#"{"thought": "all set", "action": "done"}"#).await.unwrap();
        assert!(out.complete);
        assert_eq!(out.summary, "done: all set");
    }
}
