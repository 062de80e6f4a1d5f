pub mod claude;

use crate::llm::CompletionResponse;
use conductor_core::{ConductorResult, ConversationTurn, ToolSchema};
use async_trait::async_trait;

/// Trait for completion provider backends.
///
/// A backend turns one request (system prompt, history, protocol-clean tool
/// schemas) into one [`CompletionResponse`]. Deadlines and cancellation are
/// applied by [`CompletionClient`](crate::llm::CompletionClient), not here.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short provider name used in traces and response metadata.
    fn provider(&self) -> &str;

    /// Non-streaming chat completion. `tools` is empty when none are offered.
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[ConversationTurn],
        tools: &[ToolSchema],
    ) -> ConductorResult<CompletionResponse>;
}
