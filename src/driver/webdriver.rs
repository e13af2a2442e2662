/// Appium / W3C WebDriver backend.
///
/// Speaks plain WebDriver JSON over HTTP. One session per driver; the session
/// id is created in `connect` and deleted in `disconnect`.
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::config::{DriverConfig, Platform};
use crate::driver::traits::DeviceDriver;
use crate::driver::types::{ElementResult, SwipeDirection};
use crate::errors::{PilotError, PilotResult};
use crate::perception::types::{Point, ScreenSize};

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

pub struct WebDriverDevice {
    config: DriverConfig,
    client: reqwest::Client,
    session_id: Mutex<Option<String>>,
}

impl WebDriverDevice {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            session_id: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.server_url.trim_end_matches('/'), path)
    }

    async fn session_path(&self, suffix: &str) -> PilotResult<String> {
        let guard = self.session_id.lock().await;
        let sid = guard
            .as_deref()
            .ok_or_else(|| PilotError::Driver("no WebDriver session; call connect first".into()))?;
        Ok(format!("/session/{sid}{suffix}"))
    }

    /// Sends a request and returns the status plus the parsed body.
    async fn call_raw(&self, method: Method, path: &str, body: Option<Value>) -> PilotResult<(StatusCode, Value)> {
        let mut req = self.client.request(method.clone(), self.url(path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        tracing::trace!(%method, path, "webdriver request");
        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, value))
    }

    /// Like `call_raw` but non-2xx responses become `PilotError::Driver`.
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> PilotResult<Value> {
        let (status, value) = self.call_raw(method, path, body).await?;
        if !status.is_success() {
            return Err(PilotError::Driver(format!("{status}: {}", error_message(&value))));
        }
        Ok(value.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn session_call(&self, method: Method, suffix: &str, body: Option<Value>) -> PilotResult<Value> {
        let path = self.session_path(suffix).await?;
        self.call(method, &path, body).await
    }

    fn capabilities(&self) -> Value {
        let mut caps = serde_json::Map::new();
        match self.config.platform {
            Platform::Android => {
                caps.insert("platformName".into(), json!("Android"));
                caps.insert("appium:automationName".into(), json!("UiAutomator2"));
            }
            Platform::Ios => {
                caps.insert("platformName".into(), json!("iOS"));
                caps.insert("appium:automationName".into(), json!("XCUITest"));
            }
        }
        if let Some(device) = &self.config.device_id {
            caps.insert("appium:udid".into(), json!(device));
        }
        for (k, v) in &self.config.capabilities {
            caps.insert(k.clone(), v.clone());
        }
        json!({ "capabilities": { "alwaysMatch": Value::Object(caps) } })
    }

    /// Runs `POST /element` and resolves the hit to its rect.
    async fn find(&self, using: &str, value: &str) -> PilotResult<ElementResult> {
        let path = self.session_path("/element").await?;
        let (status, body) = self
            .call_raw(Method::POST, &path, Some(json!({ "using": using, "value": value })))
            .await?;

        if !status.is_success() {
            let message = error_message(&body);
            if status == StatusCode::NOT_FOUND || body["value"]["error"] == "no such element" {
                tracing::debug!(using, value, "element not found");
                return Ok(ElementResult::not_found(format!(
                    "no element for {using} '{value}'"
                )));
            }
            return Err(PilotError::Driver(format!("{status}: {message}")));
        }

        let element_id = body["value"][ELEMENT_KEY]
            .as_str()
            .or_else(|| body["value"]["ELEMENT"].as_str())
            .ok_or_else(|| PilotError::Driver("element response without element id".into()))?
            .to_string();

        let rect = self
            .session_call(Method::GET, &format!("/element/{element_id}/rect"), None)
            .await?;
        let x = rect["x"].as_f64().unwrap_or(0.0);
        let y = rect["y"].as_f64().unwrap_or(0.0);
        let w = rect["width"].as_f64().unwrap_or(0.0);
        let h = rect["height"].as_f64().unwrap_or(0.0);

        let text = self
            .session_call(Method::GET, &format!("/element/{element_id}/text"), None)
            .await
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|t| !t.is_empty());

        Ok(ElementResult::Found {
            center: Point::new((x + w / 2.0).round() as i32, (y + h / 2.0).round() as i32),
            size: Some(ScreenSize {
                width: w.max(0.0) as u32,
                height: h.max(0.0) as u32,
            }),
            text,
        })
    }

    async fn perform(&self, actions: Value) -> PilotResult<()> {
        self.session_call(Method::POST, "/actions", Some(json!({ "actions": actions })))
            .await?;
        Ok(())
    }
}

fn error_message(body: &Value) -> String {
    body["value"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

/// Quotes a string for use inside an XPath expression.
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{s}'")
    } else if !s.contains('"') {
        format!("\"{s}\"")
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

fn text_xpath(platform: Platform, text: &str, exact: bool) -> String {
    let attr = match platform {
        Platform::Android => "@text",
        Platform::Ios => "@label",
    };
    let lit = xpath_literal(text);
    if exact {
        format!("//*[{attr}={lit}]")
    } else {
        format!("//*[contains({attr}, {lit})]")
    }
}

fn finger(actions: Value) -> Value {
    json!([{
        "type": "pointer",
        "id": "finger1",
        "parameters": { "pointerType": "touch" },
        "actions": actions,
    }])
}

/// Android key codes for the named keys the agent uses.
fn android_keycode(key: &str) -> Option<u32> {
    Some(match key.to_ascii_lowercase().as_str() {
        "home" => 3,
        "back" => 4,
        "tab" => 61,
        "enter" | "return" => 66,
        "delete" | "backspace" => 67,
        "menu" => 82,
        "search" => 84,
        "app_switch" | "recents" => 187,
        _ => return None,
    })
}

#[async_trait]
impl DeviceDriver for WebDriverDevice {
    fn name(&self) -> &str {
        "webdriver"
    }

    async fn connect(&self) -> PilotResult<()> {
        let value = self
            .call(Method::POST, "/session", Some(self.capabilities()))
            .await?;
        let sid = value["sessionId"]
            .as_str()
            .ok_or_else(|| PilotError::Driver("session response without sessionId".into()))?
            .to_string();
        tracing::info!(session = %sid, server = %self.config.server_url, "webdriver session created");
        *self.session_id.lock().await = Some(sid);
        Ok(())
    }

    async fn disconnect(&self) -> PilotResult<()> {
        let sid = self.session_id.lock().await.take();
        if let Some(sid) = sid {
            self.call(Method::DELETE, &format!("/session/{sid}"), None).await?;
            tracing::info!(session = %sid, "webdriver session deleted");
        }
        Ok(())
    }

    async fn screenshot(&self) -> PilotResult<String> {
        let value = self
            .session_call(Method::GET, "/screenshot", None)
            .await
            .map_err(|e| PilotError::Capture(format!("screenshot: {e}")))?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PilotError::Capture("screenshot response is not a string".into()))
    }

    async fn page_source(&self) -> PilotResult<String> {
        let value = self
            .session_call(Method::GET, "/source", None)
            .await
            .map_err(|e| PilotError::Capture(format!("page source: {e}")))?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PilotError::Capture("page source response is not a string".into()))
    }

    async fn tap(&self, x: i32, y: i32) -> PilotResult<()> {
        tracing::debug!(x, y, "tap");
        self.perform(finger(json!([
            { "type": "pointerMove", "duration": 0, "x": x, "y": y },
            { "type": "pointerDown", "button": 0 },
            { "type": "pause", "duration": 100 },
            { "type": "pointerUp", "button": 0 },
        ])))
        .await
    }

    async fn type_text(&self, text: &str) -> PilotResult<()> {
        let active = self.session_call(Method::GET, "/element/active", None).await?;
        let element_id = active[ELEMENT_KEY]
            .as_str()
            .or_else(|| active["ELEMENT"].as_str())
            .ok_or_else(|| PilotError::Driver("no focused element to type into".into()))?
            .to_string();
        let chars: Vec<String> = text.chars().map(String::from).collect();
        self.session_call(
            Method::POST,
            &format!("/element/{element_id}/value"),
            Some(json!({ "text": text, "value": chars })),
        )
        .await?;
        Ok(())
    }

    async fn swipe(&self, direction: SwipeDirection, duration_ms: u64) -> PilotResult<()> {
        let size = self.screen_size().await?;
        let (from, to) = direction.gesture(size);
        tracing::debug!(%direction, ?from, ?to, duration_ms, "swipe");
        self.perform(finger(json!([
            { "type": "pointerMove", "duration": 0, "x": from.x, "y": from.y },
            { "type": "pointerDown", "button": 0 },
            { "type": "pointerMove", "duration": duration_ms, "x": to.x, "y": to.y },
            { "type": "pointerUp", "button": 0 },
        ])))
        .await
    }

    async fn press_key(&self, key: &str) -> PilotResult<()> {
        match self.config.platform {
            Platform::Android => {
                let code = android_keycode(key)
                    .ok_or_else(|| PilotError::Driver(format!("unsupported key '{key}'")))?;
                self.session_call(
                    Method::POST,
                    "/appium/device/press_keycode",
                    Some(json!({ "keycode": code })),
                )
                .await?;
            }
            Platform::Ios => {
                self.session_call(
                    Method::POST,
                    "/appium/device/press_button",
                    Some(json!({ "name": key.to_ascii_lowercase() })),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn screen_size(&self) -> PilotResult<ScreenSize> {
        let rect = self.session_call(Method::GET, "/window/rect", None).await?;
        Ok(ScreenSize {
            width: rect["width"].as_u64().unwrap_or(0) as u32,
            height: rect["height"].as_u64().unwrap_or(0) as u32,
        })
    }

    async fn find_by_accessibility_id(&self, id: &str) -> PilotResult<ElementResult> {
        self.find("accessibility id", id).await
    }

    async fn find_by_resource_id(&self, id: &str) -> PilotResult<ElementResult> {
        self.find("id", id).await
    }

    async fn find_by_text(&self, text: &str, exact: bool) -> PilotResult<ElementResult> {
        self.find("xpath", &text_xpath(self.config.platform, text, exact))
            .await
    }

    async fn find_by_path(&self, path: &str) -> PilotResult<ElementResult> {
        self.find("xpath", path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn device(server: &MockServer) -> WebDriverDevice {
        WebDriverDevice::new(DriverConfig {
            server_url: server.base_url(),
            device_id: Some("emulator-5554".into()),
            ..DriverConfig::default()
        })
    }

    async fn connected(server: &MockServer) -> WebDriverDevice {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/session");
                then.status(200)
                    .json_body(json!({ "value": { "sessionId": "s1", "capabilities": {} } }));
            })
            .await;
        let d = device(server);
        d.connect().await.unwrap();
        d
    }

    #[test]
    fn xpath_literal_quotes() {
        assert_eq!(xpath_literal("Log In"), "'Log In'");
        assert_eq!(xpath_literal("Don't"), "\"Don't\"");
        assert_eq!(xpath_literal("a'b\"c"), "concat('a', \"'\", 'b\"c')");
    }

    #[test]
    fn text_xpath_per_platform() {
        assert_eq!(text_xpath(Platform::Android, "OK", true), "//*[@text='OK']");
        assert_eq!(
            text_xpath(Platform::Ios, "OK", false),
            "//*[contains(@label, 'OK')]"
        );
    }

    #[tokio::test]
    async fn calls_before_connect_fail() {
        let server = MockServer::start_async().await;
        let d = device(&server);
        assert!(matches!(d.screenshot().await, Err(PilotError::Capture(_))));
    }

    #[tokio::test]
    async fn screenshot_and_source_use_session() {
        let server = MockServer::start_async().await;
        let d = connected(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/session/s1/screenshot");
                then.status(200).json_body(json!({ "value": "iVBORw0KGgo=" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/session/s1/source");
                then.status(200).json_body(json!({ "value": "<hierarchy/>" }));
            })
            .await;
        assert_eq!(d.screenshot().await.unwrap(), "iVBORw0KGgo=");
        assert_eq!(d.page_source().await.unwrap(), "<hierarchy/>");
    }

    #[tokio::test]
    async fn find_by_resource_id_resolves_rect_center() {
        let server = MockServer::start_async().await;
        let d = connected(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/session/s1/element");
                then.status(200).json_body(json!({ "value": { ELEMENT_KEY: "e7" } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/session/s1/element/e7/rect");
                then.status(200)
                    .json_body(json!({ "value": { "x": 100, "y": 200, "width": 300, "height": 51 } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/session/s1/element/e7/text");
                then.status(200).json_body(json!({ "value": "Log In" }));
            })
            .await;

        let r = d.find_by_resource_id("com.example:id/login").await.unwrap();
        assert_eq!(r.center(), Some(Point::new(250, 226)));
        match r {
            ElementResult::Found { size, text, .. } => {
                assert_eq!(size, Some(ScreenSize { width: 300, height: 51 }));
                assert_eq!(text.as_deref(), Some("Log In"));
            }
            other => panic!("expected found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_element_is_not_found_not_error() {
        let server = MockServer::start_async().await;
        let d = connected(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/session/s1/element");
                then.status(404).json_body(json!({
                    "value": { "error": "no such element", "message": "An element could not be located" }
                }));
            })
            .await;
        let r = d.find_by_accessibility_id("ghost").await.unwrap();
        assert!(!r.is_found());
    }

    #[tokio::test]
    async fn server_errors_surface_as_driver_errors() {
        let server = MockServer::start_async().await;
        let d = connected(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/session/s1/actions");
                then.status(500)
                    .json_body(json!({ "value": { "error": "unknown error", "message": "boom" } }));
            })
            .await;
        let err = d.tap(1, 2).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn unsupported_android_key() {
        let server = MockServer::start_async().await;
        let d = connected(&server).await;
        assert!(d.press_key("hyper").await.is_err());
    }
}
