/// Turns free-form reasoning-service text into a validated action.
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::driver::types::SwipeDirection;
use crate::errors::{PilotError, PilotResult};
use crate::locator::strategy::LocatorStrategy;

pub const UNSPECIFIED_TARGET: &str = "unspecified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Type,
    #[serde(alias = "scroll")]
    Swipe,
    Wait,
    Done,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Type => "type",
            Self::Swipe => "swipe",
            Self::Wait => "wait",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionParams {
    #[serde(default, deserialize_with = "rounded")]
    pub x: Option<i32>,
    #[serde(default, deserialize_with = "rounded")]
    pub y: Option<i32>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub direction: Option<SwipeDirection>,
    /// Milliseconds.
    #[serde(default)]
    pub duration: Option<u64>,
    /// Locator hint, see `LocatorStrategy::from_hint`.
    #[serde(default, alias = "locator")]
    pub selector: Option<String>,
    #[serde(default, alias = "elementDescription")]
    pub element_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonerOutput {
    pub thought: String,
    pub action: ActionKind,
    #[serde(default)]
    pub parameters: ActionParams,
    #[serde(default = "unspecified_target", alias = "targetElement")]
    pub target_element: String,
}

fn unspecified_target() -> String {
    UNSPECIFIED_TARGET.to_string()
}

fn rounded<'de, D>(d: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<f64> = Option::deserialize(d)?;
    Ok(v.map(|n| n.round() as i32))
}

impl ReasonerOutput {
    pub fn locator(&self) -> Option<LocatorStrategy> {
        self.parameters
            .selector
            .as_deref()
            .and_then(LocatorStrategy::from_hint)
    }

    /// What the vision fallback is asked to find.
    pub fn description(&self) -> &str {
        self.parameters
            .element_description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&self.target_element)
    }

    pub fn coordinates(&self) -> Option<(i32, i32)> {
        Some((self.parameters.x?, self.parameters.y?))
    }
}

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[\w+-]*\s*([\s\S]*?)```").expect("valid regex"))
}

fn braces() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[\s\S]*\}").expect("valid regex"))
}

/// Fenced code block first, then the widest `{...}` span.
fn extract_json(raw: &str) -> Option<&str> {
    if let Some(block) = fenced_block().captures(raw).and_then(|c| c.get(1)) {
        let inner = block.as_str().trim();
        if !inner.is_empty() {
            return Some(inner);
        }
    }
    braces().find(raw).map(|m| m.as_str())
}

pub fn parse_action(raw: &str) -> PilotResult<ReasonerOutput> {
    let candidate =
        extract_json(raw).ok_or_else(|| PilotError::parse("no JSON object in response", raw))?;
    let output: ReasonerOutput = serde_json::from_str(candidate)
        .map_err(|e| PilotError::parse(format!("invalid action: {e}"), candidate))?;
    tracing::debug!(action = %output.action, target = %output.target_element, "parsed action");
    Ok(output)
}
