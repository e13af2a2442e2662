use serde::{Deserialize, Serialize};

use crate::agent_engine::parser::ReasonerOutput;
use crate::perception::types::PrunedElement;

/// Everything the perceive-reason-act loop knows about one run.
///
/// Stages never mutate this directly; they return a [`StatePatch`] that is
/// merged with [`AgentState::apply`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    pub goal: String,
    pub action_history: Vec<String>,
    pub errors: Vec<String>,
    pub retry_count: u32,
    pub iteration: u32,
    pub is_complete: bool,
    pub last_action: Option<ReasonerOutput>,
    /// Base64 screenshot from the last successful observation.
    #[serde(skip)]
    pub screenshot: Option<String>,
    pub elements: Vec<PrunedElement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryUpdate {
    Reset,
    Increment,
}

/// Fields a stage changed. `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub action_history: Vec<String>,
    pub errors: Vec<String>,
    pub retry: Option<RetryUpdate>,
    pub iteration: Option<u32>,
    pub is_complete: Option<bool>,
    /// `Some(None)` clears the pending action.
    pub last_action: Option<Option<ReasonerOutput>>,
    pub screenshot: Option<String>,
    pub elements: Option<Vec<PrunedElement>>,
}

impl StatePatch {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            retry: Some(RetryUpdate::Increment),
            ..Self::default()
        }
    }

    pub fn history(mut self, entry: impl Into<String>) -> Self {
        self.action_history.push(entry.into());
        self
    }
}

impl AgentState {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Self::default()
        }
    }

    pub fn apply(&mut self, patch: StatePatch) {
        self.action_history.extend(patch.action_history);
        self.errors.extend(patch.errors);
        match patch.retry {
            Some(RetryUpdate::Reset) => self.retry_count = 0,
            Some(RetryUpdate::Increment) => self.retry_count += 1,
            None => {}
        }
        if let Some(iteration) = patch.iteration {
            self.iteration = self.iteration.max(iteration);
        }
        if let Some(done) = patch.is_complete {
            self.is_complete = done;
        }
        if let Some(action) = patch.last_action {
            self.last_action = action;
        }
        if let Some(shot) = patch.screenshot {
            self.screenshot = Some(shot);
        }
        if let Some(elements) = patch.elements {
            self.elements = elements;
        }
    }

    pub fn recent_history(&self, n: usize) -> &[String] {
        let start = self.action_history.len().saturating_sub(n);
        &self.action_history[start..]
    }

    pub fn recent_errors(&self, n: usize) -> &[String] {
        let start = self.errors.len().saturating_sub(n);
        &self.errors[start..]
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Completed,
    MaxRetries,
    Failed,
}

impl TerminalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::MaxRetries => "max_retries",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
