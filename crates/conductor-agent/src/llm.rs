use crate::backends::claude::ClaudeBackend;
use crate::backends::CompletionBackend;
use crate::config::{LlmProvider, ModelConfig};
use crate::usage::RoundUsage;
use conductor_core::{
    ConductorError, ConductorResult, ContentBlock, ConversationTurn, ToolSchema,
};
use conductor_mcp::ToolDescriptor;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    /// The model wants tools run; drives another loop round.
    ToolUse,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            other => StopReason::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
            StopReason::Other(raw) => raw,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completion round as seen by the loop.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: RoundUsage,
    /// `anthropic-ratelimit-*` headers, when the provider sent any.
    pub rate_limits: BTreeMap<String, String>,
}

impl CompletionResponse {
    /// The first text block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(ContentBlock::as_text)
    }
}

/// Completion client that dispatches to the configured provider backend and
/// applies the per-call deadline and cancellation.
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(config: ModelConfig, timeout: Duration) -> Self {
        let backend: Arc<dyn CompletionBackend> = match config.provider {
            LlmProvider::Claude => Arc::new(ClaudeBackend::new(config)),
        };
        Self { backend, timeout }
    }

    /// Create from a pre-built backend (for custom providers and tests).
    pub fn from_backend(backend: Arc<dyn CompletionBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn provider(&self) -> &str {
        self.backend.provider()
    }

    /// Runs one completion call. Provenance (server id, owning client) is
    /// stripped from `tools`; an empty slice sends no tools parameter.
    pub async fn invoke(
        &self,
        system_prompt: Option<&str>,
        messages: &[ConversationTurn],
        tools: &[ToolDescriptor],
        cancel: &CancellationToken,
    ) -> ConductorResult<CompletionResponse> {
        let schemas: Vec<ToolSchema> = tools.iter().map(ToolDescriptor::to_schema).collect();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConductorError::Cancelled),
            outcome = tokio::time::timeout(
                self.timeout,
                self.backend.chat(system_prompt, messages, &schemas),
            ) => match outcome {
                Ok(result) => result,
                Err(_) => Err(ConductorError::Timeout(format!(
                    "completion call exceeded {}s",
                    self.timeout.as_secs()
                ))),
            },
        }
    }
}
