//! `conductor.toml` loading.

use conductor_agent::{ModelConfig, ModelRates, Orchestrator, OrchestratorConfig, RateTable};
use conductor_core::{ConductorError, ConductorResult};
use conductor_mcp::{StaticServerDirectory, ToolServerConfig};
use conductor_session::FileConversationStore;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ConductorConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Per-family price overrides, merged over the built-in table.
    #[serde(default)]
    pub pricing: HashMap<String, ModelRates>,
    #[serde(default)]
    pub servers: Vec<ToolServerConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}

impl ConductorConfig {
    pub fn from_toml_str(raw: &str) -> ConductorResult<Self> {
        toml::from_str(raw).map_err(|e| ConductorError::Configuration(e.to_string()))
    }

    pub async fn load(path: &Path) -> ConductorResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ConductorError::Configuration(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn conversations_dir(&self) -> PathBuf {
        self.data_dir.join("conversations")
    }

    /// Wires the orchestrator: static server directory, file conversation
    /// store, and the merged rate table.
    pub async fn build_orchestrator(&self) -> ConductorResult<Orchestrator> {
        let directory =
            StaticServerDirectory::from_configs(&self.servers, self.orchestrator.tool_timeout())?;
        let store = FileConversationStore::new(self.conversations_dir()).await?;

        info!(
            provider = self.model.provider.as_str(),
            model = %self.model.model_id,
            servers = directory.server_count(),
            "Orchestrator configured"
        );

        Ok(Orchestrator::new(
            self.model.clone(),
            self.orchestrator.clone(),
            Arc::new(directory),
        )
        .with_store(Arc::new(store))
        .with_rates(RateTable::with_overrides(&self.pricing)))
    }
}
