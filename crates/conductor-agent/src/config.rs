use conductor_core::{ConductorError, ConductorResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[serde(alias = "anthropic")]
    Claude,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Claude => "claude",
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: LlmProvider,
    pub model_id: String,
    /// Literal key; takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: String,
    /// Name of an environment variable holding the key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub api_base_url: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model_id", &self.model_id)
            .field("api_key", &"[REDACTED]")
            .field("api_key_env", &self.api_key_env)
            .field("api_base_url", &self.api_base_url)
            .field("enabled", &self.enabled)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ModelConfig {
    /// Minimal enabled configuration with a literal key.
    pub fn claude(model_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::Claude,
            model_id: model_id.into(),
            api_key: api_key.into(),
            api_key_env: None,
            api_base_url: None,
            enabled: true,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
        }
    }

    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                LlmProvider::Claude => "https://api.anthropic.com",
            }
        }
    }

    /// The API key: the literal value, else the named environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.trim().is_empty() {
            return Some(self.api_key.clone());
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Fails unless the provider is enabled and has credentials.
    pub fn validate(&self) -> ConductorResult<()> {
        if !self.enabled {
            return Err(ConductorError::Configuration(format!(
                "no enabled completion provider ({} is disabled)",
                self.provider.as_str()
            )));
        }
        if self.model_id.trim().is_empty() {
            return Err(ConductorError::Configuration(
                "model_id must not be empty".into(),
            ));
        }
        if self.resolve_api_key().is_none() {
            return Err(ConductorError::Configuration(format!(
                "no API key configured for provider {}",
                self.provider.as_str()
            )));
        }
        Ok(())
    }
}

/// Bounds and deadlines for the orchestration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout_secs: u64,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_registry_timeout")]
    pub registry_timeout_secs: u64,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_max_iterations() -> u32 {
    5
}

fn default_completion_timeout() -> u64 {
    120
}

fn default_tool_timeout() -> u64 {
    60
}

fn default_registry_timeout() -> u64 {
    15
}

fn default_preview_chars() -> usize {
    200
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            completion_timeout_secs: default_completion_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            registry_timeout_secs: default_registry_timeout(),
            preview_chars: default_preview_chars(),
        }
    }
}

impl OrchestratorConfig {
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }
}
