use crate::agent_engine::state::{AgentState, TerminalOutcome};
use crate::config::AgentConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Continue,
    End,
}

/// Decides after every cycle whether the loop goes round again.
pub struct LoopController {
    max_retries: u32,
    max_iterations: u32,
}

impl LoopController {
    pub fn new(max_retries: u32, max_iterations: u32) -> Self {
        Self {
            max_retries,
            max_iterations,
        }
    }

    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self::new(cfg.max_retries, cfg.max_iterations)
    }

    pub fn decide(&self, state: &AgentState) -> Route {
        if state.is_complete
            || state.retry_count >= self.max_retries
            || state.iteration >= self.max_iterations
        {
            Route::End
        } else {
            Route::Continue
        }
    }

    pub fn outcome(&self, state: &AgentState) -> TerminalOutcome {
        if state.is_complete {
            TerminalOutcome::Completed
        } else if state.retry_count >= self.max_retries {
            TerminalOutcome::MaxRetries
        } else {
            TerminalOutcome::Failed
        }
    }
}
