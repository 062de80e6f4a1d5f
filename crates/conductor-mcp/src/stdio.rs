//! Tool protocol client over a child process's stdio.
//!
//! The server is spawned on first use. Requests and responses are single
//! JSON-RPC lines; a reader task routes responses back by id so concurrent
//! calls share one process.

use crate::client::ToolProtocol;
use crate::config::ToolServerConfig;
use crate::protocol::*;
use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Response routes by request id; `None` once the server's stdout has closed.
type PendingMap = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>>;

/// A running server process.
struct StdioProcess {
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    _child: Mutex<Child>,
}

/// A process that completed the handshake.
struct StdioSession {
    process: StdioProcess,
    init: InitializeResult,
}

/// Tool protocol client for servers launched as a subprocess.
pub struct StdioToolClient {
    server_id: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
    next_id: AtomicU64,
    session: OnceCell<StdioSession>,
}

impl StdioToolClient {
    /// Build a client from server configuration. Nothing is spawned until the
    /// first call.
    pub fn new(config: &ToolServerConfig, default_timeout: Duration) -> ConductorResult<Self> {
        let command = config.command.clone().ok_or_else(|| {
            ConductorError::Configuration(format!(
                "tool server '{}' has no command for the stdio transport",
                config.id
            ))
        })?;
        Ok(Self {
            server_id: config.id.clone(),
            command,
            args: config.args.clone(),
            env: config.env.clone(),
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(default_timeout),
            next_id: AtomicU64::new(1),
            session: OnceCell::new(),
        })
    }

    /// The executable this client launches.
    pub fn command(&self) -> &str {
        &self.command
    }

    async fn session(&self) -> ConductorResult<&StdioSession> {
        self.session.get_or_try_init(|| self.spawn()).await
    }

    /// Spawn the process and complete the `initialize` handshake.
    async fn spawn(&self) -> ConductorResult<StdioSession> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ConductorError::Protocol(format!(
                "failed to spawn tool server '{}' ({}): {e}",
                self.server_id, self.command
            ))
        })?;
        let stdin = child.stdin.take().ok_or_else(|| {
            ConductorError::Protocol(format!(
                "tool server '{}' stdin not available",
                self.server_id
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ConductorError::Protocol(format!(
                "tool server '{}' stdout not available",
                self.server_id
            ))
        })?;

        let pending: PendingMap = Arc::new(Mutex::new(Some(HashMap::new())));
        let routes = pending.clone();
        let server_id = self.server_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                            Ok(resp) => {
                                let Some(id) = resp.id.as_ref().and_then(|v| v.as_u64()) else {
                                    continue;
                                };
                                let tx = routes.lock().await.as_mut().and_then(|m| m.remove(&id));
                                if let Some(tx) = tx {
                                    let _ = tx.send(resp);
                                }
                            }
                            Err(e) => {
                                debug!(
                                    server = %server_id,
                                    line = %trimmed,
                                    error = %e,
                                    "Non-JSON-RPC line from tool server"
                                );
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(server = %server_id, "Tool server stdout closed");
                        break;
                    }
                    Err(e) => {
                        warn!(server = %server_id, error = %e, "Error reading tool server stdout");
                        break;
                    }
                }
            }
            // Dropping the senders fails whoever is still waiting.
            routes.lock().await.take();
        });

        let process = StdioProcess {
            stdin: Mutex::new(stdin),
            pending,
            _child: Mutex::new(child),
        };

        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "conductor",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result = self.request_on(&process, "initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result).map_err(|e| {
            ConductorError::Protocol(format!("Failed to parse initialize result: {e}"))
        })?;
        self.write_line(
            &process,
            "notifications/initialized",
            &serde_json::json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await?;

        info!(
            server = %self.server_id,
            command = %self.command,
            version = %init.protocol_version,
            "Tool server process started"
        );
        Ok(StdioSession { process, init })
    }

    async fn write_line<T: serde::Serialize>(
        &self,
        process: &StdioProcess,
        method: &str,
        message: &T,
    ) -> ConductorResult<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let mut stdin = process.stdin.lock().await;
        let written: std::io::Result<()> = async {
            stdin.write_all(&line).await?;
            stdin.flush().await
        }
        .await;
        written.map_err(|e| {
            ConductorError::Protocol(format!(
                "failed to send '{method}' to tool server '{}': {e}",
                self.server_id
            ))
        })
    }

    async fn request_on(
        &self,
        process: &StdioProcess,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> ConductorResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        match process.pending.lock().await.as_mut() {
            Some(routes) => {
                routes.insert(id, tx);
            }
            None => return Err(self.exited(method)),
        }

        debug!(server = %self.server_id, method, id, "Sending JSON-RPC request");
        if let Err(e) = self.write_line(process, method, &req).await {
            self.forget(process, id).await;
            return Err(e);
        }

        let resp = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => return Err(self.exited(method)),
            Err(_) => {
                self.forget(process, id).await;
                return Err(ConductorError::Timeout(format!(
                    "'{method}' on tool server '{}' after {}s",
                    self.server_id,
                    self.timeout.as_secs()
                )));
            }
        };

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

    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> ConductorResult<serde_json::Value> {
        let session = self.session().await?;
        self.request_on(&session.process, method, params).await
    }

    async fn forget(&self, process: &StdioProcess, id: u64) {
        if let Some(routes) = process.pending.lock().await.as_mut() {
            routes.remove(&id);
        }
    }

    fn exited(&self, method: &str) -> ConductorError {
        ConductorError::Protocol(format!(
            "tool server '{}' exited before answering '{method}'",
            self.server_id
        ))
    }
}

#[async_trait]
impl ToolProtocol for StdioToolClient {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    async fn initialize(&self) -> ConductorResult<InitializeResult> {
        Ok(self.session().await?.init.clone())
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

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    /// A line-oriented tool server in POSIX sh. It only lists tools once the
    /// `notifications/initialized` line has arrived.
    const SCRIPT: &str = r##"
ready=0
while IFS= read -r line; do
  case "$line" in
    *'"method":"notifications/initialized"'*) ready=1; continue ;;
  esac
  id=$(printf '%s' "$line" | sed -n 's/^{"jsonrpc":"2.0","id":\([0-9]*\),.*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"sh-files","version":"1.2.0"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      if [ "$ready" = 1 ]; then
        printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"list_dir","description":"List a directory","inputSchema":{"type":"object"}}]}}\n' "$id"
      else
        printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32002,"message":"not initialized"}}\n' "$id"
      fi ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"%s"}]}}\n' "$id" "$GREETING" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"unknown method"}}\n' "$id" ;;
  esac
done
"##;

    fn config(command: &str, args: Vec<String>) -> ToolServerConfig {
        serde_json::from_value(serde_json::json!({
            "id": "files",
            "command": command,
            "args": args,
            "env": {"GREETING": "hello from files"},
        }))
        .unwrap()
    }

    fn sh_client() -> StdioToolClient {
        let cfg = config("sh", vec!["-c".into(), SCRIPT.into()]);
        StdioToolClient::new(&cfg, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_handshake_then_list_and_call() {
        let client = sh_client();
        assert_eq!(client.command(), "sh");

        let init = client.initialize().await.unwrap();
        assert_eq!(init.protocol_version, "2024-11-05");
        assert_eq!(init.server_info.unwrap().name, "sh-files");

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "list_dir");

        let result = client
            .call_tool("list_dir", serde_json::json!({"path": "/tmp"}))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "hello from files");
    }

    #[tokio::test]
    async fn test_list_tools_spawns_on_first_use() {
        let tools = sh_client().list_tools().await.unwrap();
        assert_eq!(tools[0].name, "list_dir");
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_process() {
        let client = sh_client();
        let (a, b) = tokio::join!(
            client.call_tool("list_dir", serde_json::json!({})),
            client.call_tool("list_dir", serde_json::json!({}))
        );
        assert_eq!(a.unwrap().text(), "hello from files");
        assert_eq!(b.unwrap().text(), "hello from files");
    }

    #[tokio::test]
    async fn test_missing_executable_is_an_error() {
        let cfg = config("/nonexistent/conductor-tool-server", vec![]);
        let client = StdioToolClient::new(&cfg, Duration::from_secs(1)).unwrap();
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, ConductorError::Protocol(_)));
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_exited_server_fails_pending_request() {
        let cfg = config("sh", vec!["-c".into(), "exit 0".into()]);
        let client = StdioToolClient::new(&cfg, Duration::from_secs(5)).unwrap();
        let err = client.initialize().await.unwrap_err();
        assert!(matches!(err, ConductorError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let cfg = config("sh", vec!["-c".into(), "sleep 30".into()]);
        let client = StdioToolClient::new(&cfg, Duration::from_millis(200)).unwrap();
        let err = client.initialize().await.unwrap_err();
        assert!(matches!(err, ConductorError::Timeout(_)));
    }
}
