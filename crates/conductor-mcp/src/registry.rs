//! Tool registry aggregation.
//!
//! A request takes one [`ToolRegistry`] snapshot up front and uses it for every
//! round. Servers are queried concurrently; a server that is unreachable,
//! slow, or returns a malformed tool list is skipped with a WARN trace entry
//! and never fails the request.

use crate::client::ToolProtocol;
use crate::directory::{RegisteredServer, ServerDirectory};
use crate::protocol::{McpToolDef, ServerInfo};
use conductor_core::{
    ConductorError, ConductorResult, ExecutionTracer, ToolKey, ToolSchema, TraceLevel,
};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const COMPONENT: &str = "registry";

/// One invocable remote tool: identity, schema, and the client that owns it.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Typed `{server_id, tool_name}` identity.
    pub key: ToolKey,
    /// Namespaced name shown to the model.
    pub wire_name: String,
    /// Description reported by the server.
    pub description: String,
    /// JSON Schema of the tool input.
    pub input_schema: serde_json::Value,
    /// Client of the owning server.
    pub client: Arc<dyn ToolProtocol>,
}

impl ToolDescriptor {
    /// Creates a descriptor, deriving the wire name from the key.
    pub fn new(
        key: ToolKey,
        description: impl Into<String>,
        input_schema: serde_json::Value,
        client: Arc<dyn ToolProtocol>,
    ) -> Self {
        Self {
            wire_name: key.wire_name(),
            key,
            description: description.into(),
            input_schema,
            client,
        }
    }

    /// The protocol-clean schema sent to the completion API. Provenance
    /// (server id, server-local tool name, client) stays behind.
    pub fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.wire_name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("key", &self.key)
            .field("wire_name", &self.wire_name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Immutable per-request snapshot of every tool available to a caller.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// A registry with no tools.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a descriptor. A wire-name collision hands the descriptor back.
    pub fn insert(&mut self, descriptor: ToolDescriptor) -> Result<(), Box<ToolDescriptor>> {
        if self.index.contains_key(&descriptor.wire_name) {
            return Err(Box::new(descriptor));
        }
        self.index
            .insert(descriptor.wire_name.clone(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    /// Looks a tool up by the name the model used.
    pub fn get(&self, wire_name: &str) -> Option<&ToolDescriptor> {
        self.index.get(wire_name).map(|&i| &self.tools[i])
    }

    /// All descriptors, in discovery order.
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Whether any tool is exposed under the `server` wire-name prefix.
    pub fn has_server(&self, server: &str) -> bool {
        self.tools
            .iter()
            .filter_map(|t| ToolKey::parse(&t.wire_name))
            .any(|key| key.server_id == server)
    }

    /// Wire names, in discovery order.
    pub fn wire_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.wire_name.as_str()).collect()
    }

    /// Number of tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is available.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

struct FetchedServer {
    info: Option<ServerInfo>,
    tools: Vec<McpToolDef>,
    elapsed: Duration,
}

/// Builds [`ToolRegistry`] snapshots from a [`ServerDirectory`].
pub struct RegistryAggregator {
    directory: Arc<dyn ServerDirectory>,
    timeout: Duration,
}

impl RegistryAggregator {
    /// `timeout` bounds discovery on each server.
    pub fn new(directory: Arc<dyn ServerDirectory>, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    /// Query every server registered to `user_id` and flatten their tools.
    ///
    /// Only cancellation fails this call; everything else degrades to fewer
    /// tools.
    pub async fn build(
        &self,
        user_id: &str,
        tracer: &mut ExecutionTracer,
        cancel: &CancellationToken,
    ) -> ConductorResult<ToolRegistry> {
        let lookup = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConductorError::Cancelled),
            servers = self.directory.servers_for(user_id) => servers,
        };

        let servers = match lookup {
            Ok(servers) => servers,
            Err(e) => {
                tracer.log_with(
                    TraceLevel::Warn,
                    COMPONENT,
                    format!("Tool server lookup failed, continuing without tools: {e}"),
                    serde_json::json!({"user_id": user_id, "error": e.kind()}),
                );
                return Ok(ToolRegistry::empty());
            }
        };

        if servers.is_empty() {
            tracer.info(COMPONENT, "No tool servers registered for caller");
            return Ok(ToolRegistry::empty());
        }

        let fetches = servers.iter().map(|server| self.fetch(server));
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConductorError::Cancelled),
            results = join_all(fetches) => results,
        };

        let mut registry = ToolRegistry::empty();
        let mut skipped = Vec::new();

        for (server, result) in servers.iter().zip(results) {
            let server_id = server.client.server_id();
            match result {
                Ok(fetched) => {
                    if let Some(info) = &fetched.info {
                        tracer.log_with(
                            TraceLevel::Info,
                            COMPONENT,
                            format!("Tool server '{server_id}' initialized"),
                            serde_json::json!({
                                "server": server_id,
                                "name": info.name,
                                "version": info.version,
                            }),
                        );
                    }
                    debug!(
                        server = %server_id,
                        tools = fetched.tools.len(),
                        elapsed_ms = fetched.elapsed.as_millis() as u64,
                        "Tool server listed"
                    );
                    for def in fetched.tools {
                        let descriptor = ToolDescriptor::new(
                            ToolKey::new(server_id, def.name),
                            def.description,
                            def.input_schema,
                            server.client.clone(),
                        );
                        if let Err(dup) = registry.insert(descriptor) {
                            tracer.warn(
                                COMPONENT,
                                format!(
                                    "Skipping tool '{}': name '{}' is already registered",
                                    dup.key, dup.wire_name
                                ),
                            );
                        }
                    }
                }
                Err(e) => {
                    skipped.push(server_id.to_string());
                    tracer.log_with(
                        TraceLevel::Warn,
                        COMPONENT,
                        format!("Tool server '{server_id}' skipped: {e}"),
                        serde_json::json!({"server": server_id, "error": e.kind()}),
                    );
                }
            }
        }

        let level = if skipped.is_empty() {
            TraceLevel::Success
        } else {
            TraceLevel::Info
        };
        tracer.log_with(
            level,
            COMPONENT,
            format!(
                "Tool registry built: {} tools from {} of {} servers",
                registry.len(),
                servers.len() - skipped.len(),
                servers.len()
            ),
            serde_json::json!({"tools": registry.wire_names(), "skipped": skipped}),
        );

        Ok(registry)
    }

    async fn fetch(&self, server: &RegisteredServer) -> ConductorResult<FetchedServer> {
        let start = Instant::now();
        let work = async {
            let info = if server.handshake {
                server.client.initialize().await?.server_info
            } else {
                None
            };
            let tools = server.client.list_tools().await?;
            for tool in &tools {
                tool.validate().map_err(ConductorError::Protocol)?;
            }
            Ok::<_, ConductorError>((info, tools))
        };

        let (info, tools) = tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| {
                ConductorError::Timeout(format!(
                    "tool discovery on '{}' after {}s",
                    server.client.server_id(),
                    self.timeout.as_secs()
                ))
            })??;

        Ok(FetchedServer {
            info,
            tools,
            elapsed: start.elapsed(),
        })
    }
}
