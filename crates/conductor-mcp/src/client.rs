//! Tool protocol client: JSON-RPC 2.0 over HTTP, one endpoint per server.
//!
//! A server that answers `initialize` with an `Mcp-Session-Id` header gets
//! that id echoed on every later request, and the handshake is completed
//! with a `notifications/initialized` notification.

use crate::config::ToolServerConfig;
use crate::protocol::*;
use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Header carrying the server-assigned session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// The operations the engine needs from one remote tool server.
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    /// Identifier of the server (namespace prefix of its tools).
    fn server_id(&self) -> &str;

    /// Perform the `initialize` handshake.
    async fn initialize(&self) -> ConductorResult<InitializeResult>;

    /// List the server's tools.
    async fn list_tools(&self) -> ConductorResult<Vec<McpToolDef>>;

    /// Invoke one tool by its server-local name.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> ConductorResult<McpToolResult>;
}

/// Tool protocol client over HTTP POST.
pub struct HttpToolClient {
    server_id: String,
    url: String,
    http: reqwest::Client,
    headers: HeaderMap,
    timeout: Duration,
    next_id: AtomicU64,
    session_id: RwLock<Option<HeaderValue>>,
}

impl HttpToolClient {
    /// Build a client from server configuration. `http` is shared across
    /// servers; `default_timeout` applies unless the config overrides it.
    pub fn new(
        config: &ToolServerConfig,
        http: reqwest::Client,
        default_timeout: Duration,
    ) -> ConductorResult<Self> {
        let url = config.url.clone().ok_or_else(|| {
            ConductorError::Configuration(format!(
                "tool server '{}' has no url for the HTTP transport",
                config.id
            ))
        })?;
        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                ConductorError::Configuration(format!(
                    "invalid header name '{key}' for tool server '{}': {e}",
                    config.id
                ))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                ConductorError::Configuration(format!(
                    "invalid value for header '{key}' of tool server '{}'",
                    config.id
                ))
            })?;
            headers.insert(name, value);
        }

        Ok(Self {
            server_id: config.id.clone(),
            url,
            http,
            headers,
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(default_timeout),
            next_id: AtomicU64::new(1),
            session_id: RwLock::new(None),
        })
    }

    /// The endpoint this client posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Session id assigned by the server, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .await
            .as_ref()
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// POST one JSON-RPC message, echoing the session id if one is known.
    async fn post<T: serde::Serialize>(
        &self,
        method: &str,
        message: &T,
    ) -> ConductorResult<reqwest::Response> {
        let mut builder = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .timeout(self.timeout)
            .json(message);
        let session = self.session_id.read().await.clone();
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        if let Some(session) = resp.headers().get(SESSION_HEADER) {
            let mut current = self.session_id.write().await;
            if current.as_ref() != Some(session) {
                debug!(server = %self.server_id, "Tool server assigned a session");
                *current = Some(session.clone());
            }
        }
        Ok(resp)
    }

    /// Send a JSON-RPC notification. Any 2xx status (usually 202) is accepted.
    async fn notify(&self, method: &str) -> ConductorResult<()> {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        debug!(server = %self.server_id, method, "Sending JSON-RPC notification");

        let resp = self.post(method, &msg).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ConductorError::Http(format!(
                "tool server '{}' answered {status} to '{method}': {body}",
                self.server_id
            )));
        }
        Ok(())
    }

    /// Send a JSON-RPC request and return its `result` member.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> ConductorResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);

        debug!(server = %self.server_id, method, id, "Sending JSON-RPC request");

        let resp = self.post(method, &req).await?;

        let status = resp.status();
        let is_sse = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));
        let body = resp
            .text()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        if !status.is_success() {
            return Err(ConductorError::Http(format!(
                "tool server '{}' answered {status} to '{method}': {body}",
                self.server_id
            )));
        }

        let payload = if is_sse {
            last_sse_data(&body).ok_or_else(|| {
                ConductorError::Protocol(format!(
                    "tool server '{}' sent an event stream without data for '{method}'",
                    self.server_id
                ))
            })?
        } else {
            body.as_str()
        };

        let resp: JsonRpcResponse = serde_json::from_str(payload).map_err(|e| {
            ConductorError::Protocol(format!(
                "tool server '{}' sent an invalid JSON-RPC response to '{method}': {e}",
                self.server_id
            ))
        })?;

        if let Some(resp_id) = &resp.id {
            if resp_id != &serde_json::Value::from(id) {
                return Err(ConductorError::Protocol(format!(
                    "tool server '{}' answered request {id} with id {resp_id}",
                    self.server_id
                )));
            }
        }

        if let Some(err) = resp.error {
            return Err(ConductorError::Protocol(format!(
                "JSON-RPC error {}: {}",
                err.code, err.message
            )));
        }

        resp.result.ok_or_else(|| {
            ConductorError::Protocol(format!("Empty {method} result from '{}'", self.server_id))
        })
    }

    fn transport_error(&self, method: &str, e: reqwest::Error) -> ConductorError {
        if e.is_timeout() {
            ConductorError::Timeout(format!(
                "'{method}' on tool server '{}' after {}s",
                self.server_id,
                self.timeout.as_secs()
            ))
        } else {
            ConductorError::Http(format!(
                "tool server '{}' unreachable for '{method}': {e}",
                self.server_id
            ))
        }
    }
}

/// The last `data:` payload of a server-sent-events body.
fn last_sse_data(body: &str) -> Option<&str> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .last()
}

#[async_trait]
impl ToolProtocol for HttpToolClient {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    async fn initialize(&self) -> ConductorResult<InitializeResult> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "conductor",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let result = self.request("initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result).map_err(|e| {
            ConductorError::Protocol(format!("Failed to parse initialize result: {e}"))
        })?;

        self.notify("notifications/initialized").await?;
        Ok(init)
    }

    async fn list_tools(&self) -> ConductorResult<Vec<McpToolDef>> {
        let result = self.request("tools/list", None).await?;
        let list: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| ConductorError::Protocol(format!("Failed to parse tools: {e}")))?;
        Ok(list.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> ConductorResult<McpToolResult> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });

        let result = self.request("tools/call", Some(params)).await?;
        serde_json::from_value(result)
            .map_err(|e| ConductorError::Protocol(format!("Failed to parse tool result: {e}")))
    }
}
