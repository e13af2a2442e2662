pub mod agent_engine;
pub mod cli;
pub mod config;
pub mod driver;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod locator;
pub mod perception;

use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::engine::{AgentEngine, RunReport};
use crate::cli::Args;
use crate::config::{AppConfig, DriverKind};
use crate::driver::mock::MockDriver;
use crate::driver::traits::DeviceDriver;
use crate::driver::webdriver::WebDriverDevice;
use crate::errors::PilotResult;
use crate::llm::registry::{LlmRole, ProviderRegistry};
use crate::llm::vision::VisionLocator;
use crate::locator::analytics::HealingLogger;
use crate::locator::hybrid::HybridLocator;

pub fn build_driver(config: &AppConfig) -> Arc<dyn DeviceDriver> {
    match config.driver.kind {
        DriverKind::Device => Arc::new(WebDriverDevice::new(config.driver.clone())),
        DriverKind::Mock => Arc::new(MockDriver::login_flow()),
    }
}

/// Wires driver, providers and locator into an engine.
pub fn build_engine(config: &AppConfig, driver: Arc<dyn DeviceDriver>) -> PilotResult<AgentEngine> {
    let registry = ProviderRegistry::from_config(&config.llm);
    let (reasoner, reasoner_cfg) = registry.call_config_for_role(LlmRole::Reasoning)?;
    let (vision_provider, vision_cfg) = registry.call_config_for_role(LlmRole::Vision)?;
    tracing::info!(
        reasoner = reasoner.name(),
        reasoning_model = %reasoner_cfg.model,
        vision_model = %vision_cfg.model,
        "providers resolved"
    );

    let locator = HybridLocator::new(driver.clone())
        .with_vision(Arc::new(VisionLocator::new(vision_provider, vision_cfg)))
        .with_analytics(HealingLogger::new())
        .with_focus_settle(Duration::from_millis(config.agent.focus_settle_ms));

    Ok(AgentEngine::new(
        driver,
        locator,
        reasoner,
        reasoner_cfg,
        config.agent.clone(),
    ))
}

/// Runs one goal end to end: connect, loop, disconnect, optional report export.
pub async fn run(args: &Args) -> PilotResult<RunReport> {
    let config = config::load_config(args.config.as_deref())?;
    let driver = build_driver(&config);
    let mut engine = build_engine(&config, driver.clone())?;

    driver.connect().await?;
    let report = engine.run(&args.goal).await;
    if let Err(e) = driver.disconnect().await {
        tracing::warn!(error = %e, "disconnect failed");
    }

    if let (Some(path), Some(logger)) = (args.healing_report.as_deref(), engine.locator().analytics()) {
        if let Err(e) = logger.export_json(path) {
            tracing::warn!(error = %e, path = %path.display(), "healing report export failed");
        }
    }
    Ok(report)
}
