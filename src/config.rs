use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            DEFAULT_PROVIDER.to_string(),
            ProviderEntry {
                display_name: "Local OpenAI-compatible endpoint".into(),
                api_base: "http://localhost:11434/v1/chat/completions".into(),
                model: "llama3.2-vision".into(),
                temperature: default_temperature(),
                api_key: None,
            },
        );
        Self {
            active_provider: DEFAULT_PROVIDER.into(),
            providers,
            roles: RolesConfig::default(),
        }
    }
}

const DEFAULT_PROVIDER: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Falls back to env var PILOT_<ID>_API_KEY at load time.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps agent roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Decides the next action from screenshot + element list.
    pub reasoning: Option<RoleEntry>,
    /// Finds element coordinates on a screenshot when selectors fail.
    pub vision: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    #[default]
    Device,
    Mock,
}

impl std::str::FromStr for DriverKind {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "device" | "appium" | "webdriver" => Ok(Self::Device),
            "mock" | "test" => Ok(Self::Mock),
            other => Err(PilotError::Config(format!("unknown driver type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Android,
    Ios,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub kind: DriverKind,
    /// Appium / WebDriver server root.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub platform: Platform,
    /// Extra capabilities merged into the session request.
    #[serde(default)]
    pub capabilities: HashMap<String, serde_json::Value>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            kind: DriverKind::default(),
            server_url: default_server_url(),
            device_id: None,
            platform: Platform::default(),
            capabilities: HashMap::new(),
        }
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:4723".into()
}

/// Loop budgets and timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Pause after every successful action so the UI can update.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Pause between focusing a field and typing into it.
    #[serde(default = "default_focus_settle_ms")]
    pub focus_settle_ms: u64,
    #[serde(default = "default_swipe_ms")]
    pub swipe_duration_ms: u64,
    #[serde(default = "default_wait_ms")]
    pub default_wait_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_iterations: default_max_iterations(),
            settle_ms: default_settle_ms(),
            focus_settle_ms: default_focus_settle_ms(),
            swipe_duration_ms: default_swipe_ms(),
            default_wait_ms: default_wait_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_iterations() -> u32 {
    15
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_focus_settle_ms() -> u64 {
    300
}

fn default_swipe_ms() -> u64 {
    500
}

fn default_wait_ms() -> u64 {
    500
}

impl AppConfig {
    /// Applies `PILOT_*` overrides. `lookup` is the environment in production
    /// and a map in tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> PilotResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let active = self.llm.active_provider.clone();
        // The reasoning role may point at a provider other than the active one.
        let reasoning_provider = self
            .llm
            .roles
            .reasoning
            .as_ref()
            .map(|r| r.provider.clone())
            .unwrap_or_else(|| active.clone());

        if let Some(host) = lookup("PILOT_LLM_HOST") {
            let url = completions_url(&host);
            for id in [&active, &reasoning_provider] {
                if let Some(entry) = self.llm.providers.get_mut(id) {
                    entry.api_base = url.clone();
                }
            }
        }
        if let Some(model) = lookup("PILOT_MODEL") {
            if let Some(entry) = self.llm.providers.get_mut(&active) {
                entry.model = model.clone();
            }
            if let Some(role) = self.llm.roles.reasoning.as_mut() {
                role.model = model;
            }
        }
        if let Some(key) = lookup("PILOT_LLM_API_KEY") {
            if let Some(entry) = self.llm.providers.get_mut(&active) {
                entry.api_key = Some(key);
            }
        }
        if let Some(model) = lookup("PILOT_VISION_MODEL") {
            match self.llm.roles.vision.as_mut() {
                Some(role) => role.model = model,
                None => {
                    self.llm.roles.vision = Some(RoleEntry {
                        provider: active.clone(),
                        model,
                        stream: false,
                        temperature: None,
                    })
                }
            }
        }
        for (id, entry) in self.llm.providers.iter_mut() {
            if entry.api_key.is_none() {
                entry.api_key = lookup(&format!("PILOT_{}_API_KEY", id.to_uppercase()));
            }
        }

        if let Some(kind) = lookup("PILOT_DRIVER") {
            self.driver.kind = kind.parse()?;
        }
        if let Some(device) = lookup("PILOT_DEVICE_ID") {
            self.driver.device_id = Some(device);
        }
        if let Some(url) = lookup("PILOT_APPIUM_URL") {
            self.driver.server_url = url;
        }
        Ok(())
    }
}

/// Accepts either a bare host (`http://gpu-box:11434`) or a full endpoint.
fn completions_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.ends_with("/chat/completions") {
        host.to_string()
    } else if host.ends_with("/v1") {
        format!("{host}/chat/completions")
    } else {
        format!("{host}/v1/chat/completions")
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    let candidate = std::env::current_dir().ok()?.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Some(candidate);
    }
    None
}

pub fn load_config_from(path: &Path) -> PilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

/// Loads `config.toml` (explicit path, next to the executable, or in the
/// working directory; defaults when none exists), then environment overrides.
pub fn load_config(explicit: Option<&Path>) -> PilotResult<AppConfig> {
    let mut config = match explicit {
        Some(path) => load_config_from(path)?,
        None => match resolve_config_path() {
            Some(path) => load_config_from(&path)?,
            None => {
                tracing::info!("no config.toml found; using defaults");
                AppConfig::default()
            }
        },
    };
    config.apply_env_overrides(|k| std::env::var(k).ok())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_loop_budgets() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_retries, 3);
        assert_eq!(cfg.agent.max_iterations, 15);
        assert_eq!(cfg.agent.default_wait_ms, 500);
        assert_eq!(cfg.driver.kind, DriverKind::Device);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [agent]
            max_iterations = 4

            [driver]
            kind = "mock"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.max_iterations, 4);
        assert_eq!(cfg.agent.max_retries, 3);
        assert_eq!(cfg.driver.kind, DriverKind::Mock);
        assert_eq!(cfg.llm.active_provider, "default");
    }

    #[test]
    fn env_overrides_service_and_driver() {
        let mut cfg = AppConfig::default();
        cfg.apply_env_overrides(env(&[
            ("PILOT_LLM_HOST", "http://gpu-box:11434/"),
            ("PILOT_MODEL", "qwen2.5vl"),
            ("PILOT_VISION_MODEL", "qwen2.5vl:32b"),
            ("PILOT_DRIVER", "mock"),
            ("PILOT_DEVICE_ID", "emulator-5554"),
        ]))
        .unwrap();

        let entry = &cfg.llm.providers["default"];
        assert_eq!(entry.api_base, "http://gpu-box:11434/v1/chat/completions");
        assert_eq!(entry.model, "qwen2.5vl");
        assert_eq!(cfg.llm.roles.vision.as_ref().unwrap().model, "qwen2.5vl:32b");
        assert_eq!(cfg.driver.kind, DriverKind::Mock);
        assert_eq!(cfg.driver.device_id.as_deref(), Some("emulator-5554"));
    }

    #[test]
    fn model_env_reaches_configured_roles() {
        let mut cfg: AppConfig = toml::from_str(include_str!("../config.example.toml")).unwrap();
        cfg.apply_env_overrides(env(&[
            ("PILOT_MODEL", "override-model"),
            ("PILOT_VISION_MODEL", "override-vision"),
            ("PILOT_LLM_HOST", "http://gpu-box:8000/v1"),
        ]))
        .unwrap();

        let reasoning = cfg.llm.roles.reasoning.as_ref().unwrap();
        assert_eq!(reasoning.model, "override-model");
        assert!(reasoning.stream);
        let vision = cfg.llm.roles.vision.as_ref().unwrap();
        assert_eq!(vision.model, "override-vision");
        assert_eq!(vision.temperature, Some(0.0));
        assert_eq!(
            cfg.llm.providers["local"].api_base,
            "http://gpu-box:8000/v1/chat/completions"
        );

        let registry = crate::llm::registry::ProviderRegistry::from_config(&cfg.llm);
        let (_, call) = registry
            .call_config_for_role(crate::llm::registry::LlmRole::Reasoning)
            .unwrap();
        assert_eq!(call.model, "override-model");
    }

    #[test]
    fn provider_api_key_from_env() {
        let mut cfg = AppConfig::default();
        cfg.apply_env_overrides(env(&[("PILOT_DEFAULT_API_KEY", "sk-test")]))
            .unwrap();
        assert_eq!(cfg.llm.providers["default"].api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn rejects_unknown_driver() {
        let mut cfg = AppConfig::default();
        let err = cfg
            .apply_env_overrides(env(&[("PILOT_DRIVER", "carrier-pigeon")]))
            .unwrap_err();
        assert!(matches!(err, PilotError::Config(_)));
    }

    #[test]
    fn completions_url_variants() {
        assert_eq!(completions_url("http://h:1"), "http://h:1/v1/chat/completions");
        assert_eq!(completions_url("http://h:1/v1"), "http://h:1/v1/chat/completions");
        assert_eq!(
            completions_url("https://api.x/v1/chat/completions"),
            "https://api.x/v1/chat/completions"
        );
    }
}
