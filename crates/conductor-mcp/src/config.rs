use conductor_core::{ConductorError, ConductorResult};
use serde::Deserialize;
use std::collections::HashMap;

/// Configuration for a single tool server.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolServerConfig {
    /// Stable identifier; becomes the namespace prefix of the server's tools.
    pub id: String,
    /// JSON-RPC endpoint for servers reached over HTTP.
    #[serde(default)]
    pub url: Option<String>,
    /// Executable for servers spawned as a child process speaking
    /// newline-delimited JSON-RPC on stdin/stdout.
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments passed to `command`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for `command`.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Disabled servers are never queried (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Callers allowed to use this server. Empty means every caller.
    #[serde(default)]
    pub users: Vec<String>,
    /// Extra HTTP headers sent with every request (e.g. auth).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Per-request deadline override in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Call `initialize` before `tools/list` (default: false).
    #[serde(default)]
    pub handshake: bool,
}

fn default_true() -> bool {
    true
}

/// How the engine reaches a tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport<'a> {
    /// POST JSON-RPC to this endpoint.
    Http { url: &'a str },
    /// Spawn this executable and talk over its stdio.
    Stdio { command: &'a str },
}

impl ToolServerConfig {
    /// Whether `user_id` may use this server.
    pub fn serves(&self, user_id: &str) -> bool {
        self.enabled
            && (self.users.is_empty() || self.users.iter().any(|u| u == user_id || u == "*"))
    }

    /// The configured transport. Exactly one of `url` and `command` must be set.
    pub fn transport(&self) -> ConductorResult<Transport<'_>> {
        match (self.url.as_deref(), self.command.as_deref()) {
            (Some(url), None) => Ok(Transport::Http { url }),
            (None, Some(command)) => Ok(Transport::Stdio { command }),
            (Some(_), Some(_)) => Err(ConductorError::Configuration(format!(
                "tool server '{}' sets both url and command",
                self.id
            ))),
            (None, None) => Err(ConductorError::Configuration(format!(
                "tool server '{}' needs a url or a command",
                self.id
            ))),
        }
    }
}
