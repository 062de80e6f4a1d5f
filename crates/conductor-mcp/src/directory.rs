//! Which tool servers a caller may use.

use crate::client::{HttpToolClient, ToolProtocol};
use crate::config::{ToolServerConfig, Transport};
use crate::stdio::StdioToolClient;
use async_trait::async_trait;
use conductor_core::ConductorResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A tool server registered for a caller, ready to be queried.
#[derive(Clone)]
pub struct RegisteredServer {
    /// Protocol client for the server.
    pub client: Arc<dyn ToolProtocol>,
    /// Whether `initialize` must precede `tools/list`.
    pub handshake: bool,
}

impl RegisteredServer {
    /// Wraps a client without a handshake requirement.
    pub fn new(client: Arc<dyn ToolProtocol>) -> Self {
        Self {
            client,
            handshake: false,
        }
    }
}

/// Source of the tool servers registered to a caller.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    /// Servers `user_id` may use. Order is preserved in the aggregated registry.
    async fn servers_for(&self, user_id: &str) -> ConductorResult<Vec<RegisteredServer>>;
}

/// Directory backed by the static `[[servers]]` configuration.
pub struct StaticServerDirectory {
    servers: Vec<(ToolServerConfig, Arc<dyn ToolProtocol>)>,
}

impl StaticServerDirectory {
    /// Build one client per configured server. HTTP servers share a
    /// connection pool; stdio servers are spawned on first use.
    pub fn from_configs(
        configs: &[ToolServerConfig],
        default_timeout: Duration,
    ) -> ConductorResult<Self> {
        let http = reqwest::Client::new();
        let mut servers = Vec::with_capacity(configs.len());
        for config in configs {
            let client: Arc<dyn ToolProtocol> = match config.transport()? {
                Transport::Http { .. } => {
                    let client = HttpToolClient::new(config, http.clone(), default_timeout)?;
                    debug!(
                        server = %config.id,
                        url = %client.url(),
                        "HTTP tool server configured"
                    );
                    Arc::new(client)
                }
                Transport::Stdio { .. } => {
                    let client = StdioToolClient::new(config, default_timeout)?;
                    debug!(
                        server = %config.id,
                        command = %client.command(),
                        "Stdio tool server configured"
                    );
                    Arc::new(client)
                }
            };
            servers.push((config.clone(), client));
        }
        info!(servers = servers.len(), "Tool server directory loaded");
        Ok(Self { servers })
    }

    /// Number of configured servers, enabled or not.
    pub fn server_count(&self) -> usize {
        self.servers.len()
    }
}

#[async_trait]
impl ServerDirectory for StaticServerDirectory {
    async fn servers_for(&self, user_id: &str) -> ConductorResult<Vec<RegisteredServer>> {
        Ok(self
            .servers
            .iter()
            .filter(|(config, _)| config.serves(user_id))
            .map(|(config, client)| RegisteredServer {
                client: client.clone(),
                handshake: config.handshake,
            })
            .collect())
    }
}
