use std::sync::Arc;

use crate::agent_engine::loop_control::{LoopController, Route};
use crate::agent_engine::parser::{parse_action, ReasonerOutput};
use crate::agent_engine::state::{AgentState, RetryUpdate, StatePatch, TerminalOutcome};
use crate::config::AgentConfig;
use crate::driver::traits::DeviceDriver;
use crate::errors::PilotResult;
use crate::executor::dispatcher::{self, Dispatcher};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::locator::hybrid::{HealingStats, HybridLocator};
use crate::perception::pruner::{format_elements, try_prune};
use crate::perception::screenshot;

const HISTORY_WINDOW: usize = 5;
const ERROR_WINDOW: usize = 3;

const SYSTEM_PROMPT: &str = "\
You are a mobile automation agent. You see a screenshot of an Android or iOS
device and a list of the interactive elements on screen, and you decide the
single next action that moves toward the user's goal.

Reply with one JSON object, optionally inside a ```json code block:
{
  \"thought\": \"why this action\",
  \"action\": \"click\" | \"type\" | \"swipe\" | \"wait\" | \"done\",
  \"parameters\": {
    \"selector\": \"id:<resource-id> | accessibility_id:<id> | text:<visible text> | xpath:<path>\",
    \"element_description\": \"what the element looks like, for visual search\",
    \"x\": <int>, \"y\": <int>,
    \"text\": \"text to type\",
    \"direction\": \"up\" | \"down\" | \"left\" | \"right\",
    \"duration\": <milliseconds>
  },
  \"target_element\": \"short label of the element acted on\"
}

Rules:
- Prefer a selector built from the element list over raw coordinates.
- `type` focuses the element given by `selector` first, then types `text`.
- Use `done` only once the goal is visibly achieved.
- If the previous action failed, try a different element or approach.";

/// Summary of one `run`.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: TerminalOutcome,
    pub state: AgentState,
    pub healing: HealingStats,
}

/// The perceive-reason-act loop for one device.
pub struct AgentEngine {
    driver: Arc<dyn DeviceDriver>,
    locator: HybridLocator,
    reasoner: Arc<dyn LlmProvider>,
    reasoner_cfg: CallConfig,
    loop_ctrl: LoopController,
    config: AgentConfig,
}

impl AgentEngine {
    pub fn new(
        driver: Arc<dyn DeviceDriver>,
        locator: HybridLocator,
        reasoner: Arc<dyn LlmProvider>,
        reasoner_cfg: CallConfig,
        config: AgentConfig,
    ) -> Self {
        Self {
            driver,
            locator,
            reasoner,
            reasoner_cfg,
            loop_ctrl: LoopController::from_config(&config),
            config,
        }
    }

    pub fn locator(&self) -> &HybridLocator {
        &self.locator
    }

    /// Runs until the goal is done or a budget is exhausted.
    /// Budget exhaustion is reported through `RunReport::outcome`, never as an error.
    pub async fn run(&mut self, goal: &str) -> RunReport {
        let mut state = AgentState::new(goal);
        tracing::info!(
            goal,
            driver = self.driver.name(),
            max_retries = self.config.max_retries,
            max_iterations = self.config.max_iterations,
            "agent run started"
        );

        loop {
            let patch = self.observe(&state).await;
            state.apply(patch);
            tracing::info!(iteration = state.iteration, elements = state.elements.len(), "Observing → Reasoning");

            let patch = self.reason(&state).await;
            state.apply(patch);
            tracing::info!(iteration = state.iteration, "Reasoning → Executing");

            let patch = self.execute(&state).await;
            state.apply(patch);

            match self.loop_ctrl.decide(&state) {
                Route::Continue => {
                    tracing::info!(
                        iteration = state.iteration,
                        retry_count = state.retry_count,
                        "Deciding → Observing"
                    );
                }
                Route::End => break,
            }
        }

        let outcome = self.loop_ctrl.outcome(&state);
        let healing = self.locator.healing_stats();
        tracing::info!(
            outcome = %outcome,
            iterations = state.iteration,
            actions = state.action_history.len(),
            errors = state.errors.len(),
            "agent run ended"
        );
        RunReport {
            outcome,
            state,
            healing,
        }
    }

    /// Captures screenshot and hierarchy together and prunes the hierarchy.
    pub async fn observe(&self, state: &AgentState) -> StatePatch {
        let iteration = Some(state.iteration + 1);
        let (shot, source) = tokio::join!(self.driver.screenshot(), self.driver.page_source());

        let (shot, source) = match (shot, source) {
            (Ok(shot), Ok(source)) => (shot, source),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "observation failed; keeping previous snapshot");
                return StatePatch {
                    iteration,
                    ..StatePatch::failure(format!("observe: {e}"))
                };
            }
        };

        match try_prune(&source) {
            Ok(elements) => StatePatch {
                iteration,
                screenshot: Some(shot),
                elements: Some(elements),
                ..StatePatch::default()
            },
            Err(e) => {
                tracing::warn!(error = %e, "hierarchy unparseable; continuing with screenshot only");
                StatePatch {
                    iteration,
                    screenshot: Some(shot),
                    elements: Some(Vec::new()),
                    errors: vec![format!("observe: {e}")],
                    ..StatePatch::default()
                }
            }
        }
    }

    /// Asks the reasoning service for the next action.
    pub async fn reason(&self, state: &AgentState) -> StatePatch {
        if state.is_complete {
            return StatePatch::default();
        }

        match self.decide_next(state).await {
            Ok(action) => {
                tracing::info!(
                    action = %action.action,
                    target = %action.target_element,
                    thought = %action.thought,
                    "action decided"
                );
                StatePatch {
                    last_action: Some(Some(action)),
                    ..StatePatch::default()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "reasoning failed");
                StatePatch {
                    last_action: Some(None),
                    ..StatePatch::failure(format!("reason: {e}"))
                }
            }
        }
    }

    async fn decide_next(&self, state: &AgentState) -> PilotResult<ReasonerOutput> {
        let prompt = build_prompt(state);
        let user = match state.screenshot.as_deref() {
            Some(shot) => ChatMessage::user_with_image(prompt, screenshot::to_data_uri(shot)),
            None => ChatMessage::user(prompt),
        };
        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), user];
        let response = self.reasoner.chat(messages, &self.reasoner_cfg).await?;
        parse_action(&response.content)
    }

    /// Runs the pending action, if any.
    pub async fn execute(&mut self, state: &AgentState) -> StatePatch {
        let Some(action) = state.last_action.as_ref() else {
            tracing::debug!("no pending action");
            return StatePatch::default();
        };

        let result = Dispatcher::new(self.driver.as_ref(), &mut self.locator, &self.config)
            .dispatch(action)
            .await;

        match result {
            Ok(done) if done.complete => {
                tracing::info!(summary = %done.summary, "goal complete");
                self.log_healing_stats();
                StatePatch {
                    is_complete: Some(true),
                    retry: Some(RetryUpdate::Reset),
                    ..StatePatch::default()
                }
                .history(done.summary)
            }
            Ok(done) => {
                tracing::info!(summary = %done.summary, "action succeeded");
                dispatcher::settle(&self.config).await;
                StatePatch {
                    retry: Some(RetryUpdate::Reset),
                    ..StatePatch::default()
                }
                .history(done.summary)
            }
            Err(e) => {
                tracing::warn!(action = %action.action, error = %e, "action failed");
                StatePatch::failure(format!("execute: {e}"))
                    .history(format!("FAILED: {} '{}': {e}", action.action, action.target_element))
            }
        }
    }

    fn log_healing_stats(&self) {
        let stats = self.locator.healing_stats();
        tracing::info!(
            total = stats.total_attempts,
            selector = stats.selector_successes,
            vision = stats.vision_successes,
            failures = stats.failures,
            healing_rate = stats.healing_rate,
            success_rate = stats.success_rate,
            "healing statistics"
        );
        if let Some(logger) = self.locator.analytics() {
            tracing::info!("\n{}", logger.report());
        }
    }
}

/// Per-turn prompt: goal, recent history, recent errors and the element list.
pub fn build_prompt(state: &AgentState) -> String {
    let mut prompt = format!("Goal: {}\n", state.goal);

    let history = state.recent_history(HISTORY_WINDOW);
    if !history.is_empty() {
        prompt.push_str("\nRecent actions:\n");
        for entry in history {
            prompt.push_str(&format!("- {entry}\n"));
        }
    }

    let errors = state.recent_errors(ERROR_WINDOW);
    if !errors.is_empty() {
        prompt.push_str(&format!(
            "\nRecent errors (consecutive failures: {}):\n",
            state.retry_count
        ));
        for error in errors {
            prompt.push_str(&format!("- {error}\n"));
        }
    }

    prompt.push_str("\nElements on screen:\n");
    prompt.push_str(&format_elements(&state.elements));
    prompt.push_str("\n\nWhat is the next action?");
    prompt
}
