use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between server id and tool name in wire names.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Longest tool name the completion API accepts.
pub const MAX_WIRE_NAME_LEN: usize = 64;

/// Typed identity of a remote tool: the server that owns it plus the tool's
/// own name on that server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolKey {
    /// Identifier of the owning tool server.
    pub server_id: String,
    /// Name of the tool as the server reports it.
    pub tool_name: String,
}

impl ToolKey {
    /// Creates a key from its two parts.
    pub fn new(server_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            tool_name: tool_name.into(),
        }
    }

    /// The namespaced name shown to the model: `{server_id}__{tool_name}`,
    /// restricted to `[A-Za-z0-9_-]` and at most 64 characters.
    pub fn wire_name(&self) -> String {
        let mut name: String = format!("{}{NAMESPACE_SEPARATOR}{}", self.server_id, self.tool_name)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        name.truncate(MAX_WIRE_NAME_LEN);
        name
    }

    /// Splits a wire name at the first separator. Only meaningful for names
    /// that were not altered by sanitisation.
    pub fn parse(wire_name: &str) -> Option<Self> {
        let (server, tool) = wire_name.split_once(NAMESPACE_SEPARATOR)?;
        if server.is_empty() || tool.is_empty() {
            return None;
        }
        Some(Self::new(server, tool))
    }
}

impl fmt::Display for ToolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{NAMESPACE_SEPARATOR}{}", self.server_id, self.tool_name)
    }
}

/// Protocol-clean tool schema as transmitted to the completion API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Namespaced wire name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema of the input object.
    pub input_schema: serde_json::Value,
}

/// A request from the model to invoke a specific tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique identifier assigned by the model for this call.
    pub id: String,
    /// Namespaced wire name of the tool.
    pub name: String,
    /// JSON arguments to pass to the tool.
    pub input: serde_json::Value,
}

/// The result returned after executing a [`ToolCallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The id of the request this result answers.
    pub tool_use_id: String,
    /// The textual output produced by the tool, or the failure message.
    pub content: String,
    /// Whether the call ended in an error.
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful tool result.
    pub fn success(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Creates an error tool result.
    pub fn error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}
