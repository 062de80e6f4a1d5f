//! Tool dispatch with contained failures.
//!
//! Every path out of [`ToolDispatcher::dispatch`] is a [`ToolCallResult`]:
//! unknown names, transport errors, JSON-RPC errors, deadlines and
//! cancellation all become error results so one bad tool cannot sink the
//! rest of its round.

use crate::registry::ToolRegistry;
use conductor_core::{ConductorError, ToolCallRequest, ToolCallResult, ToolKey};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of one dispatched call plus what the trace needs to know about it.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Wire name the model asked for.
    pub tool: String,
    /// Owning server, when the tool resolved.
    pub server_id: Option<String>,
    /// The contained result.
    pub result: ToolCallResult,
    /// Wall time spent on the call.
    pub duration: Duration,
}

/// Resolves tool calls against a registry snapshot and invokes them.
pub struct ToolDispatcher {
    timeout: Duration,
}

impl ToolDispatcher {
    /// `timeout` bounds each individual tool call.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Execute one call. Never fails: errors come back as error results.
    pub async fn dispatch(
        &self,
        request: &ToolCallRequest,
        registry: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> ToolCallResult {
        let Some(tool) = registry.get(&request.name) else {
            warn!(tool = %request.name, call_id = %request.id, "Tool not in registry snapshot");
            let detail = match ToolKey::parse(&request.name) {
                Some(key) if !registry.has_server(&key.server_id) => format!(
                    "{} (no tool server '{}' is available)",
                    request.name, key.server_id
                ),
                _ => request.name.clone(),
            };
            return ToolCallResult::error(
                &request.id,
                ConductorError::ToolResolution(detail).to_string(),
            );
        };

        info!(
            server = %tool.key.server_id,
            tool = %tool.key.tool_name,
            call_id = %request.id,
            "Dispatching tool call"
        );

        let call = tool
            .client
            .call_tool(&tool.key.tool_name, request.input.clone());

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConductorError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => result.unwrap_or_else(|_| {
                Err(ConductorError::Timeout(format!(
                    "tool '{}' after {}s",
                    request.name,
                    self.timeout.as_secs()
                )))
            }),
        };

        match outcome {
            Ok(result) if result.is_error => {
                let text = result.text();
                warn!(tool = %request.name, call_id = %request.id, "Tool reported an error");
                let content = if text.is_empty() {
                    format!("Tool '{}' reported an error", request.name)
                } else {
                    text
                };
                ToolCallResult::error(&request.id, content)
            }
            Ok(result) => ToolCallResult::success(&request.id, result.text()),
            Err(e) => {
                warn!(tool = %request.name, call_id = %request.id, error = %e, "Tool call failed");
                ToolCallResult::error(
                    &request.id,
                    ConductorError::ToolExecution(e.to_string()).to_string(),
                )
            }
        }
    }

    /// Execute every call of a round concurrently and wait for all of them.
    /// Outcomes come back in request order, whatever order they finished in.
    pub async fn dispatch_all(
        &self,
        requests: &[ToolCallRequest],
        registry: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> Vec<DispatchOutcome> {
        let mut pending: FuturesUnordered<_> = requests
            .iter()
            .enumerate()
            .map(|(idx, request)| async move {
                let start = Instant::now();
                let result = self.dispatch(request, registry, cancel).await;
                (idx, result, start.elapsed())
            })
            .collect();

        let mut slots: Vec<Option<DispatchOutcome>> = (0..requests.len()).map(|_| None).collect();
        while let Some((idx, result, duration)) = pending.next().await {
            let request = &requests[idx];
            slots[idx] = Some(DispatchOutcome {
                tool: request.name.clone(),
                server_id: registry.get(&request.name).map(|t| t.key.server_id.clone()),
                result,
                duration,
            });
        }

        slots.into_iter().flatten().collect()
    }
}
