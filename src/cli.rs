use std::path::PathBuf;

use clap::Parser;

/// Mobile Pilot - drives a phone toward a natural-language goal
#[derive(Parser, Debug, Clone)]
#[command(
    name = "mobile-pilot",
    version,
    about = "Self-healing mobile UI automation driven by a vision-capable model",
    after_help = "ENVIRONMENT VARIABLES:\n\
        PILOT_LLM_HOST        Reasoning service host or chat-completions URL\n\
        PILOT_MODEL           Reasoning model name\n\
        PILOT_VISION_MODEL    Vision fallback model name\n\
        PILOT_LLM_API_KEY     API key for the active provider\n\
        PILOT_DRIVER          device | mock\n\
        PILOT_DEVICE_ID       Device UDID / serial\n\
        PILOT_APPIUM_URL      Appium server root\n\
        RUST_LOG              Log filter (default: info)"
)]
pub struct Args {
    /// What the agent should accomplish on the device
    pub goal: String,

    /// Path to config.toml (default: next to the executable, then the working directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the self-healing summary as JSON to this path
    #[arg(long)]
    pub healing_report: Option<PathBuf>,
}
