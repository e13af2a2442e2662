/// Session-level healing analytics.
///
/// A passive recorder: the hybrid locator submits every event it logs, and the
/// logger turns them into counters, a summary document and a text report.
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PilotResult;
use crate::locator::hybrid::{HealMethod, HealingEvent, HealingStats};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: HealingStats,
    pub events: Vec<HealingEvent>,
}

pub struct HealingLogger {
    session_id: String,
    started_at: DateTime<Utc>,
    events: Vec<HealingEvent>,
}

impl HealingLogger {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            events: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn log_event(&mut self, event: HealingEvent) {
        if event.healing_triggered && event.success {
            tracing::info!(
                session = %self.session_id,
                locator = %event.locator,
                "self-healing recovered element via vision"
            );
        }
        self.events.push(event);
    }

    pub fn stats(&self) -> HealingStats {
        HealingStats::from_events(&self.events)
    }

    /// Point-in-time summary; `ended_at` is the time of the call.
    pub fn summary(&self) -> HealingSummary {
        HealingSummary {
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            stats: self.stats(),
            events: self.events.clone(),
        }
    }

    pub fn report(&self) -> String {
        let s = self.stats();
        let duration = Utc::now() - self.started_at;
        let mut out = format!(
            "Self-healing report (session {})\n\
             Duration:            {:.1}s\n\
             Total locate calls:  {}\n\
             Selector successes:  {}\n\
             Vision successes:    {}\n\
             Failures:            {}\n\
             Healing rate:        {:.1}%\n\
             Overall success:     {:.1}%",
            self.session_id,
            duration.num_milliseconds() as f64 / 1000.0,
            s.total_attempts,
            s.selector_successes,
            s.vision_successes,
            s.failures,
            s.healing_rate * 100.0,
            s.success_rate * 100.0,
        );
        let healed: Vec<&HealingEvent> = self
            .events
            .iter()
            .filter(|e| e.success && e.method == HealMethod::Vision)
            .collect();
        if !healed.is_empty() {
            out.push_str("\nHealed locators:");
            for e in healed {
                out.push_str(&format!("\n  - {}", e.locator));
            }
        }
        out
    }

    /// Writes the summary as pretty JSON. Nothing is ever read back.
    pub fn export_json(&self, path: &Path) -> PilotResult<()> {
        let json = serde_json::to_string_pretty(&self.summary())?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "healing summary exported");
        Ok(())
    }
}

impl Default for HealingLogger {
    fn default() -> Self {
        Self::new()
    }
}
