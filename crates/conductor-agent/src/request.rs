//! Inbound request and outbound response envelopes.

use conductor_core::{ConductorError, ConversationTurn, TraceEntry};
use serde::{Deserialize, Serialize};

/// A chat request from the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    pub user_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub file_metadata: Option<FileMetadata>,
}

impl ChatRequest {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_history: Vec::new(),
            user_id: user_id.into(),
            conversation_id: None,
            file_metadata: None,
        }
    }

    /// The user message with the attachment note appended, if any.
    pub fn user_text(&self) -> String {
        match &self.file_metadata {
            Some(file) => format!("{}\n\n{}", self.message, file.describe()),
            None => self.message.clone(),
        }
    }
}

/// A file the caller attached to the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub file_name: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl FileMetadata {
    /// Note appended to the user turn so tools can locate the file.
    pub fn describe(&self) -> String {
        let mut note = format!("[Attached file: {}", self.file_name);
        if let Some(path) = &self.file_path {
            note.push_str(&format!(", path: {path}"));
        }
        if let Some(content_type) = &self.content_type {
            note.push_str(&format!(", type: {content_type}"));
        }
        if let Some(size) = self.size {
            note.push_str(&format!(", size: {size} bytes"));
        }
        note.push(']');
        note
    }
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The model stopped for a reason other than tool use.
    Completed,
    /// The iteration bound was hit while the model still wanted tools.
    IterationLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub provider: String,
    pub model: String,
    pub tokens: TokenUsage,
    /// Estimated cost in USD.
    pub cost: f64,
    /// Wall time in milliseconds.
    pub duration: u64,
    pub mcp_tools_executed: usize,
    pub tools_available: usize,
    pub iterations: u32,
    pub termination: TerminationReason,
}

/// Successful reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub reply: String,
    pub logs: Vec<TraceEntry>,
    pub conversation_id: String,
    pub metadata: ResponseMetadata,
}

/// A fatal failure plus the trace collected up to it.
#[derive(Debug)]
pub struct RequestFailure {
    pub error: ConductorError,
    pub logs: Vec<TraceEntry>,
}

impl RequestFailure {
    pub fn into_envelope(self) -> ErrorEnvelope {
        ErrorEnvelope {
            success: false,
            error: self.error.to_string(),
            error_type: self.error.kind().to_string(),
            logs: self.logs,
        }
    }
}

impl std::fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for RequestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Uniform failure envelope `{success:false, error, logs}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub error_type: String,
    pub logs: Vec<TraceEntry>,
}
