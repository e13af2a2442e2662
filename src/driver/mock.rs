/// In-memory device used for dry runs and tests.
///
/// A mock device is a set of named screens, each an XML hierarchy, plus tap
/// transitions between them. Element lookups prune the current screen the same
/// way the agent does, so selectors behave like they would on a real device.
use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine as _;
use tokio::sync::Mutex;

use crate::driver::traits::DeviceDriver;
use crate::driver::types::{ElementResult, SwipeDirection};
use crate::errors::{PilotError, PilotResult};
use crate::perception::pruner::prune;
use crate::perception::types::{Point, PrunedElement, ScreenSize};

#[derive(Debug, Clone)]
pub struct MockScreen {
    pub name: String,
    pub hierarchy: String,
    /// element key (short id, full id or text) -> target screen
    transitions: Vec<(String, String)>,
}

impl MockScreen {
    pub fn new(name: impl Into<String>, hierarchy: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hierarchy: hierarchy.into(),
            transitions: Vec::new(),
        }
    }

    /// Tapping the element matching `key` switches to screen `target`.
    pub fn on_tap(mut self, key: impl Into<String>, target: impl Into<String>) -> Self {
        self.transitions.push((key.into(), target.into()));
        self
    }
}

/// Everything the agent did to the mock device, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAction {
    Tap(Point),
    Type(String),
    Swipe(SwipeDirection, u64),
    PressKey(String),
}

struct MockState {
    screens: Vec<MockScreen>,
    current: usize,
    connected: bool,
    actions: Vec<MockAction>,
    focused: Option<String>,
    field_values: HashMap<String, String>,
    failing_captures: u32,
}

pub struct MockDriver {
    size: ScreenSize,
    state: Mutex<MockState>,
}

impl MockDriver {
    pub fn new(screens: Vec<MockScreen>) -> Self {
        Self {
            size: ScreenSize {
                width: 1080,
                height: 2340,
            },
            state: Mutex::new(MockState {
                screens,
                current: 0,
                connected: false,
                actions: Vec::new(),
                focused: None,
                field_values: HashMap::new(),
                failing_captures: 0,
            }),
        }
    }

    /// Two screens: a login form and the home screen shown after tapping
    /// the login button.
    pub fn login_flow() -> Self {
        Self::new(vec![
            MockScreen::new("login", LOGIN_SCREEN).on_tap("login_button", "home"),
            MockScreen::new("home", HOME_SCREEN),
        ])
    }

    pub async fn current_screen(&self) -> String {
        let st = self.state.lock().await;
        st.screens
            .get(st.current)
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    pub async fn actions(&self) -> Vec<MockAction> {
        self.state.lock().await.actions.clone()
    }

    /// Text typed into the field with this (short or full) id.
    pub async fn field_value(&self, id: &str) -> Option<String> {
        let st = self.state.lock().await;
        st.field_values
            .iter()
            .find(|(k, _)| id_matches(k, id))
            .map(|(_, v)| v.clone())
    }

    /// Makes the next `n` screenshot/page-source captures fail.
    pub async fn fail_next_captures(&self, n: u32) {
        self.state.lock().await.failing_captures = n;
    }

    async fn current_elements(&self) -> PilotResult<Vec<PrunedElement>> {
        let st = self.state.lock().await;
        let screen = st
            .screens
            .get(st.current)
            .ok_or_else(|| PilotError::Driver("mock device has no screens".into()))?;
        Ok(prune(&screen.hierarchy))
    }

    async fn check_capture(&self, what: &str) -> PilotResult<()> {
        let mut st = self.state.lock().await;
        if st.failing_captures > 0 {
            st.failing_captures -= 1;
            return Err(PilotError::Capture(format!("mock {what} capture failed")));
        }
        Ok(())
    }
}

fn id_matches(full: &str, wanted: &str) -> bool {
    full == wanted || full.rsplit('/').next() == Some(wanted)
}

fn found(el: &PrunedElement) -> ElementResult {
    ElementResult::Found {
        center: el.center(),
        size: Some(ScreenSize {
            width: el.bounds.width().clamp(0, u32::MAX as i64) as u32,
            height: el.bounds.height().clamp(0, u32::MAX as i64) as u32,
        }),
        text: el.text.clone(),
    }
}

fn is_text_field(el: &PrunedElement) -> bool {
    let class = el.short_class();
    class.contains("EditText") || class.contains("TextField")
}

#[async_trait]
impl DeviceDriver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> PilotResult<()> {
        self.state.lock().await.connected = true;
        tracing::info!("mock device connected");
        Ok(())
    }

    async fn disconnect(&self) -> PilotResult<()> {
        self.state.lock().await.connected = false;
        tracing::info!("mock device disconnected");
        Ok(())
    }

    async fn screenshot(&self) -> PilotResult<String> {
        self.check_capture("screenshot").await?;
        let name = self.current_screen().await;
        Ok(base64::engine::general_purpose::STANDARD.encode(format!("mock-screen:{name}")))
    }

    async fn page_source(&self) -> PilotResult<String> {
        self.check_capture("page source").await?;
        let st = self.state.lock().await;
        st.screens
            .get(st.current)
            .map(|s| s.hierarchy.clone())
            .ok_or_else(|| PilotError::Capture("mock device has no screens".into()))
    }

    async fn tap(&self, x: i32, y: i32) -> PilotResult<()> {
        let point = Point::new(x, y);
        let elements = self.current_elements().await?;
        // Last match in document order is the innermost element.
        let hit = elements.iter().rev().find(|e| e.bounds.contains(point)).cloned();

        let mut st = self.state.lock().await;
        st.actions.push(MockAction::Tap(point));

        let Some(hit) = hit else {
            tracing::debug!(x, y, "mock tap hit nothing");
            return Ok(());
        };
        st.focused = if is_text_field(&hit) { hit.id.clone() } else { None };

        let current = st.current;
        let target = st.screens[current]
            .transitions
            .iter()
            .find(|(key, _)| {
                hit.id.as_deref().is_some_and(|id| id_matches(id, key))
                    || hit.text.as_deref() == Some(key.as_str())
            })
            .map(|(_, target)| target.clone());

        if let Some(target) = target {
            if let Some(idx) = st.screens.iter().position(|s| s.name == target) {
                tracing::debug!(from = %st.screens[current].name, to = %target, "mock screen transition");
                st.current = idx;
                st.focused = None;
            }
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> PilotResult<()> {
        let mut st = self.state.lock().await;
        st.actions.push(MockAction::Type(text.to_string()));
        if let Some(id) = st.focused.clone() {
            st.field_values.entry(id).or_default().push_str(text);
        }
        Ok(())
    }

    async fn swipe(&self, direction: SwipeDirection, duration_ms: u64) -> PilotResult<()> {
        self.state
            .lock()
            .await
            .actions
            .push(MockAction::Swipe(direction, duration_ms));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> PilotResult<()> {
        self.state
            .lock()
            .await
            .actions
            .push(MockAction::PressKey(key.to_string()));
        Ok(())
    }

    async fn wait_for(&self, _ms: u64) -> PilotResult<()> {
        Ok(())
    }

    async fn screen_size(&self) -> PilotResult<ScreenSize> {
        Ok(self.size)
    }

    async fn find_by_accessibility_id(&self, id: &str) -> PilotResult<ElementResult> {
        let elements = self.current_elements().await?;
        Ok(elements
            .iter()
            .find(|e| e.description.as_deref() == Some(id) || e.id.as_deref() == Some(id))
            .map(found)
            .unwrap_or_else(|| ElementResult::not_found(format!("no element with accessibility id '{id}'"))))
    }

    async fn find_by_resource_id(&self, id: &str) -> PilotResult<ElementResult> {
        let elements = self.current_elements().await?;
        Ok(elements
            .iter()
            .find(|e| e.id.as_deref().is_some_and(|full| id_matches(full, id)))
            .map(found)
            .unwrap_or_else(|| ElementResult::not_found(format!("no element with resource id '{id}'"))))
    }

    async fn find_by_text(&self, text: &str, exact: bool) -> PilotResult<ElementResult> {
        let elements = self.current_elements().await?;
        let needle = text.to_lowercase();
        Ok(elements
            .iter()
            .find(|e| {
                e.text.as_deref().is_some_and(|t| {
                    if exact {
                        t == text
                    } else {
                        t.to_lowercase().contains(&needle)
                    }
                })
            })
            .map(found)
            .unwrap_or_else(|| ElementResult::not_found(format!("no element with text '{text}'"))))
    }
}

const LOGIN_SCREEN: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" class="android.widget.FrameLayout" package="com.example.app" bounds="[0,0][1080,2340]" displayed="true">
    <node index="0" class="android.widget.TextView" text="Sign in to continue" resource-id="com.example.app:id/title" bounds="[90,400][990,520]" displayed="true" />
    <node index="1" class="android.widget.EditText" text="" resource-id="com.example.app:id/username" content-desc="Username" clickable="true" focusable="true" bounds="[90,700][990,840]" displayed="true" />
    <node index="2" class="android.widget.EditText" text="" resource-id="com.example.app:id/password" content-desc="Password" clickable="true" focusable="true" password="true" bounds="[90,900][990,1040]" displayed="true" />
    <node index="3" class="android.widget.Button" text="Log In" resource-id="com.example.app:id/login_button" clickable="true" bounds="[90,1150][990,1290]" displayed="true" />
    <node index="4" class="android.widget.TextView" text="Forgot password?" clickable="true" bounds="[340,1380][740,1450]" displayed="true" />
  </node>
</hierarchy>"#;

const HOME_SCREEN: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" class="android.widget.FrameLayout" package="com.example.app" bounds="[0,0][1080,2340]" displayed="true">
    <node index="0" class="android.widget.TextView" text="Welcome, testuser" resource-id="com.example.app:id/greeting" bounds="[90,300][990,420]" displayed="true" />
    <node index="1" class="android.widget.ImageButton" content-desc="Settings" resource-id="com.example.app:id/settings" clickable="true" bounds="[920,100][1040,220]" displayed="true" />
    <node index="2" class="android.widget.Button" text="Log Out" resource-id="com.example.app:id/logout" clickable="true" bounds="[90,2100][990,2240]" displayed="true" />
  </node>
</hierarchy>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::strategy::LocatorStrategy;

    #[tokio::test]
    async fn finds_login_fields_by_short_resource_id() {
        let driver = MockDriver::login_flow();
        let r = driver.find_by_resource_id("username").await.unwrap();
        assert_eq!(r.center(), Some(Point::new(540, 770)));

        let r = driver
            .find_by_resource_id("com.example.app:id/password")
            .await
            .unwrap();
        assert_eq!(r.center(), Some(Point::new(540, 970)));
    }

    #[tokio::test]
    async fn text_lookup_is_case_insensitive_unless_exact() {
        let driver = MockDriver::login_flow();
        assert!(driver.find_by_text("log in", false).await.unwrap().is_found());
        assert!(!driver.find_by_text("log in", true).await.unwrap().is_found());
        assert!(driver.find_by_text("Log In", true).await.unwrap().is_found());
    }

    #[tokio::test]
    async fn path_lookup_is_unsupported() {
        let driver = MockDriver::login_flow();
        let r = driver.find_by_path("//node").await.unwrap();
        assert!(r.reason().unwrap().contains("does not support"));
    }

    #[tokio::test]
    async fn typing_goes_to_focused_field() {
        let driver = MockDriver::login_flow();
        driver
            .type_into_element(&LocatorStrategy::ResourceId("username".into()), "testuser")
            .await
            .unwrap();
        assert_eq!(driver.field_value("username").await.as_deref(), Some("testuser"));
        assert_eq!(driver.field_value("password").await, None);
    }

    #[tokio::test]
    async fn tapping_login_button_switches_screen() {
        let driver = MockDriver::login_flow();
        assert_eq!(driver.current_screen().await, "login");
        driver
            .tap_element(&LocatorStrategy::Text("Log In".into()))
            .await
            .unwrap();
        assert_eq!(driver.current_screen().await, "home");
        assert!(driver.find_by_text("Welcome", false).await.unwrap().is_found());
    }

    #[tokio::test]
    async fn tap_element_reports_location_error() {
        let driver = MockDriver::login_flow();
        let err = driver
            .tap_element(&LocatorStrategy::ResourceId("nope".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Location { .. }));
    }

    #[tokio::test]
    async fn capture_failures_are_injected() {
        let driver = MockDriver::login_flow();
        driver.fail_next_captures(1).await;
        assert!(driver.screenshot().await.is_err());
        assert!(driver.screenshot().await.is_ok());
    }
}
