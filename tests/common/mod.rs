#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mobile_pilot::agent_engine::engine::AgentEngine;
use mobile_pilot::config::AgentConfig;
use mobile_pilot::driver::mock::MockDriver;
use mobile_pilot::errors::{PilotError, PilotResult};
use mobile_pilot::llm::provider::LlmProvider;
use mobile_pilot::llm::types::{CallConfig, ChatMessage, LlmResponse};
use mobile_pilot::locator::hybrid::{HybridLocator, VisionFallback};
use mobile_pilot::perception::types::Point;

/// Replies with canned texts in order; errors once the script runs out.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Same reply forever.
    pub fn repeating(reply: &str, times: usize) -> Arc<Self> {
        Self::new(std::iter::repeat(reply.to_string()).take(times))
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> PilotResult<LlmResponse> {
        self.requests.lock().unwrap().push(messages);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PilotError::ReasoningService("script exhausted".into()))?;
        Ok(LlmResponse {
            content: reply,
            reasoning: String::new(),
        })
    }
}

pub struct FixedVision(pub Option<Point>);

#[async_trait]
impl VisionFallback for FixedVision {
    async fn find(&self, _description: &str, _screenshot_b64: &str) -> PilotResult<Option<Point>> {
        Ok(self.0)
    }
}

pub fn fast_config() -> AgentConfig {
    AgentConfig {
        settle_ms: 0,
        focus_settle_ms: 0,
        ..AgentConfig::default()
    }
}

pub fn call_config() -> CallConfig {
    CallConfig {
        model: "test-model".into(),
        stream: false,
        temperature: 0.0,
    }
}

pub fn engine(
    driver: Arc<MockDriver>,
    provider: Arc<ScriptedProvider>,
    vision: Option<Arc<dyn VisionFallback>>,
) -> AgentEngine {
    let mut locator = HybridLocator::new(driver.clone()).with_focus_settle(Duration::ZERO);
    if let Some(vision) = vision {
        locator = locator.with_vision(vision);
    }
    AgentEngine::new(driver, locator, provider, call_config(), fast_config())
}

pub fn action(action: &str, parameters: serde_json::Value, target: &str) -> String {
    serde_json::json!({
        "thought": format!("{action} {target}"),
        "action": action,
        "parameters": parameters,
        "target_element": target,
    })
    .to_string()
}
