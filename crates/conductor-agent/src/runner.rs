use crate::backends::CompletionBackend;
use crate::config::{ModelConfig, OrchestratorConfig};
use crate::llm::{CompletionClient, CompletionResponse, StopReason};
use crate::request::{
    ChatRequest, ChatResponse, RequestFailure, ResponseMetadata, TerminationReason, TokenUsage,
};
use crate::usage::{RateTable, UsageAccumulator};
use conductor_core::message::tool_requests;
use conductor_core::trace::preview;
use conductor_core::{
    ConductorError, ConductorResult, ConversationTurn, ExecutionTracer, ToolCallRequest,
    ToolCallResult, TraceLevel,
};
use conductor_mcp::{RegistryAggregator, ServerDirectory, ToolDispatcher, ToolRegistry};
use conductor_session::{ConversationRecord, ConversationStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const ORCHESTRATOR: &str = "orchestrator";
const COMPLETION: &str = "completion";
const DISPATCHER: &str = "dispatcher";
const PERSISTENCE: &str = "persistence";

/// Per-request loop state. Created when a request arrives and dropped once
/// its response is built.
#[derive(Debug)]
pub struct OrchestrationState {
    /// Tool rounds completed so far; never exceeds `max_iterations`.
    pub iteration: u32,
    pub max_iterations: u32,
    pub messages: Vec<ConversationTurn>,
    pub stop_reason: Option<StopReason>,
    pub usage: UsageAccumulator,
    pub tracer: ExecutionTracer,
    /// Tool calls dispatched across all rounds, failed ones included.
    pub tools_executed: usize,
}

impl OrchestrationState {
    pub fn new(max_iterations: u32, messages: Vec<ConversationTurn>, tracer: ExecutionTracer) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            messages,
            stop_reason: None,
            usage: UsageAccumulator::new(),
            tracer,
            tools_executed: 0,
        }
    }
}

/// What the loop settled on.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// First text block of the terminal assistant turn, or empty.
    pub reply: String,
    pub termination: TerminationReason,
}

impl LoopOutcome {
    fn from_response(response: &CompletionResponse, termination: TerminationReason) -> Self {
        Self {
            reply: response.first_text().unwrap_or_default().to_string(),
            termination,
        }
    }
}

/// The orchestrator: drives the bounded agentic loop for one request.
/// Prompt → completion → tool calls → dispatch → backfill → repeat.
pub struct Orchestrator {
    model: ModelConfig,
    settings: OrchestratorConfig,
    completion: CompletionClient,
    aggregator: RegistryAggregator,
    dispatcher: ToolDispatcher,
    store: Option<Arc<dyn ConversationStore>>,
    rates: RateTable,
}

impl Orchestrator {
    pub fn new(
        model: ModelConfig,
        settings: OrchestratorConfig,
        directory: Arc<dyn ServerDirectory>,
    ) -> Self {
        let completion = CompletionClient::new(model.clone(), settings.completion_timeout());
        Self::assemble(model, settings, completion, directory)
    }

    /// Create with a pre-built completion backend.
    pub fn with_backend(
        model: ModelConfig,
        settings: OrchestratorConfig,
        directory: Arc<dyn ServerDirectory>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        let completion = CompletionClient::from_backend(backend, settings.completion_timeout());
        Self::assemble(model, settings, completion, directory)
    }

    fn assemble(
        model: ModelConfig,
        settings: OrchestratorConfig,
        completion: CompletionClient,
        directory: Arc<dyn ServerDirectory>,
    ) -> Self {
        Self {
            aggregator: RegistryAggregator::new(directory, settings.registry_timeout()),
            dispatcher: ToolDispatcher::new(settings.tool_timeout()),
            model,
            settings,
            completion,
            store: None,
            rates: RateTable::default(),
        }
    }

    /// Persist finished transcripts to `store`.
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_rates(mut self, rates: RateTable) -> Self {
        self.rates = rates;
        self
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    pub fn aggregator(&self) -> &RegistryAggregator {
        &self.aggregator
    }

    /// Handle one chat request end to end.
    ///
    /// Fatal errors (configuration, completion provider, deadline, cancel)
    /// come back as a [`RequestFailure`] carrying the trace up to that point.
    /// Tool failures and persistence failures never do.
    pub async fn handle(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, RequestFailure> {
        let started = Instant::now();
        let mut tracer = ExecutionTracer::new();
        let conversation_id = request
            .conversation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        tracer.log_with(
            TraceLevel::Info,
            ORCHESTRATOR,
            "Request received",
            json!({
                "conversation_id": conversation_id,
                "user_id": request.user_id,
                "history_turns": request.conversation_history.len(),
                "message_chars": request.message.chars().count(),
                "file": request.file_metadata.as_ref().map(|f| f.file_name.clone()),
            }),
        );

        if let Err(e) = self.model.validate() {
            tracer.error(ORCHESTRATOR, format!("Configuration rejected: {e}"));
            return Err(RequestFailure {
                error: e,
                logs: tracer.into_entries(),
            });
        }
        tracer.log_with(
            TraceLevel::Info,
            ORCHESTRATOR,
            "Configuration loaded",
            json!({
                "provider": self.completion.provider(),
                "model": self.model.model_id,
                "max_iterations": self.settings.max_iterations,
            }),
        );

        let registry = match self
            .aggregator
            .build(&request.user_id, &mut tracer, cancel)
            .await
        {
            Ok(registry) => registry,
            Err(e) => {
                tracer.log_with(
                    TraceLevel::Error,
                    ORCHESTRATOR,
                    format!("Request aborted: {e}"),
                    json!({"error": e.kind(), "fatal": e.is_fatal()}),
                );
                return Err(RequestFailure {
                    error: e,
                    logs: tracer.into_entries(),
                });
            }
        };

        let user_turn = ConversationTurn::user(request.user_text());
        let mut messages = request.conversation_history.clone();
        messages.push(user_turn.clone());
        let mut state = OrchestrationState::new(self.settings.max_iterations, messages, tracer);

        info!(
            conversation_id = %conversation_id,
            user_id = %request.user_id,
            tools = registry.len(),
            "Starting agentic loop"
        );

        let outcome = match self.run_loop(&mut state, &registry, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                state.tracer.log_with(
                    TraceLevel::Error,
                    ORCHESTRATOR,
                    format!("Request aborted: {e}"),
                    json!({
                        "iteration": state.iteration,
                        "error": e.kind(),
                        "fatal": e.is_fatal(),
                    }),
                );
                return Err(RequestFailure {
                    error: e,
                    logs: state.tracer.into_entries(),
                });
            }
        };

        let cost = self.rates.cost(&self.model.model_id, &state.usage);
        state.tracer.log_with(
            TraceLevel::Info,
            ORCHESTRATOR,
            "Usage totals",
            json!({
                "rounds": state.usage.rounds(),
                "input_tokens": state.usage.input_tokens(),
                "output_tokens": state.usage.output_tokens(),
                "family": self.rates.family_of(&self.model.model_id),
                "cost": cost,
            }),
        );

        let mut transcript = request.conversation_history;
        transcript.push(user_turn);
        if !outcome.reply.is_empty() {
            transcript.push(ConversationTurn::assistant(outcome.reply.clone()));
        }
        self.persist(
            &conversation_id,
            &request.user_id,
            transcript,
            &outcome,
            &mut state,
            cost,
        )
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        state.tracer.log_with(
            TraceLevel::Success,
            ORCHESTRATOR,
            "Response ready",
            json!({
                "duration_ms": duration_ms,
                "iterations": state.iteration,
                "tools_executed": state.tools_executed,
                "termination": outcome.termination,
            }),
        );

        Ok(ChatResponse {
            success: true,
            reply: outcome.reply,
            conversation_id,
            metadata: ResponseMetadata {
                provider: self.completion.provider().to_string(),
                model: self.model.model_id.clone(),
                tokens: TokenUsage {
                    input: state.usage.input_tokens(),
                    output: state.usage.output_tokens(),
                    total: state.usage.total_tokens(),
                },
                cost,
                duration: duration_ms,
                mcp_tools_executed: state.tools_executed,
                tools_available: registry.len(),
                iterations: state.iteration,
                termination: outcome.termination,
            },
            logs: state.tracer.into_entries(),
        })
    }

    /// Runs completion rounds until the model stops asking for tools or the
    /// iteration bound is hit. Only completion failures and cancellation
    /// escape; tool failures are already results.
    pub async fn run_loop(
        &self,
        state: &mut OrchestrationState,
        registry: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> ConductorResult<LoopOutcome> {
        loop {
            if cancel.is_cancelled() {
                return Err(ConductorError::Cancelled);
            }

            let response = self.complete_round(state, registry, cancel).await?;
            state.stop_reason = Some(response.stop_reason.clone());

            if response.stop_reason != StopReason::ToolUse {
                return Ok(LoopOutcome::from_response(
                    &response,
                    TerminationReason::Completed,
                ));
            }

            if state.iteration >= state.max_iterations {
                state.tracer.log_with(
                    TraceLevel::Warn,
                    ORCHESTRATOR,
                    format!(
                        "Reached max iterations ({}); accepting last response",
                        state.max_iterations
                    ),
                    json!({"iteration": state.iteration}),
                );
                return Ok(LoopOutcome::from_response(
                    &response,
                    TerminationReason::IterationLimit,
                ));
            }

            let requests = tool_requests(&response.content);
            if requests.is_empty() || registry.is_empty() {
                state.tracer.warn(
                    ORCHESTRATOR,
                    format!(
                        "Model requested {} tool call(s) with {} tool(s) available; ending loop",
                        requests.len(),
                        registry.len()
                    ),
                );
                return Ok(LoopOutcome::from_response(
                    &response,
                    TerminationReason::Completed,
                ));
            }

            let results = self.dispatch_round(state, &requests, registry, cancel).await;
            if cancel.is_cancelled() {
                return Err(ConductorError::Cancelled);
            }

            state
                .messages
                .push(ConversationTurn::assistant_blocks(response.content));
            state.messages.push(ConversationTurn::tool_results(results));
            state.iteration += 1;
        }
    }

    async fn complete_round(
        &self,
        state: &mut OrchestrationState,
        registry: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> ConductorResult<CompletionResponse> {
        let tools = registry.descriptors();
        state.tracer.log_with(
            TraceLevel::Ai,
            COMPLETION,
            format!(
                "Calling {} (round {})",
                self.model.model_id,
                state.usage.rounds() + 1
            ),
            json!({
                "iteration": state.iteration,
                "messages": state.messages.len(),
                "tools": tools.len(),
            }),
        );

        let started = Instant::now();
        let response = self
            .completion
            .invoke(
                self.model.system_prompt.as_deref(),
                &state.messages,
                tools,
                cancel,
            )
            .await?;
        state.usage.record(response.usage);

        state.tracer.log_with(
            TraceLevel::Ai,
            COMPLETION,
            format!("Completion received ({})", response.stop_reason),
            json!({
                "duration_ms": started.elapsed().as_millis() as u64,
                "input_tokens": response.usage.input_tokens,
                "output_tokens": response.usage.output_tokens,
                "stop_reason": response.stop_reason.as_str(),
                "blocks": response.content.len(),
            }),
        );

        if !response.rate_limits.is_empty() {
            state.tracer.log_with(
                TraceLevel::Info,
                COMPLETION,
                "Provider rate limits",
                json!(response.rate_limits),
            );
        }

        Ok(response)
    }

    async fn dispatch_round(
        &self,
        state: &mut OrchestrationState,
        requests: &[ToolCallRequest],
        registry: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> Vec<ToolCallResult> {
        for request in requests {
            state.tracer.log_with(
                TraceLevel::Info,
                DISPATCHER,
                format!("Dispatching tool '{}'", request.name),
                json!({
                    "id": request.id,
                    "server": registry.get(&request.name).map(|t| t.key.server_id.clone()),
                    "input": request.input,
                    "iteration": state.iteration,
                }),
            );
        }

        let outcomes = self
            .dispatcher
            .dispatch_all(requests, registry, cancel)
            .await;
        state.tools_executed += outcomes.len();

        outcomes
            .into_iter()
            .map(|outcome| {
                let (level, verb) = if outcome.result.is_error {
                    (TraceLevel::Warn, "failed")
                } else {
                    (TraceLevel::Success, "completed")
                };
                state.tracer.log_with(
                    level,
                    DISPATCHER,
                    format!("Tool '{}' {verb}", outcome.tool),
                    json!({
                        "id": outcome.result.tool_use_id,
                        "server": outcome.server_id,
                        "duration_ms": outcome.duration.as_millis() as u64,
                        "is_error": outcome.result.is_error,
                        "preview": preview(&outcome.result.content, self.settings.preview_chars),
                    }),
                );
                outcome.result
            })
            .collect()
    }

    /// Best-effort, at-most-once. Failure is traced and swallowed.
    async fn persist(
        &self,
        conversation_id: &str,
        user_id: &str,
        transcript: Vec<ConversationTurn>,
        outcome: &LoopOutcome,
        state: &mut OrchestrationState,
        cost: f64,
    ) {
        let Some(store) = &self.store else {
            debug!(conversation_id, "No conversation store configured");
            return;
        };

        let mut record = ConversationRecord::new(conversation_id, user_id, transcript);
        record.metadata.insert("model".into(), json!(self.model.model_id));
        record.metadata.insert(
            "usage".into(),
            json!({
                "input_tokens": state.usage.input_tokens(),
                "output_tokens": state.usage.output_tokens(),
                "cost": cost,
            }),
        );
        record
            .metadata
            .insert("termination".into(), json!(outcome.termination));

        match store.save(&record).await {
            Ok(()) => state.tracer.log_with(
                TraceLevel::Info,
                PERSISTENCE,
                "Conversation saved",
                json!({"conversation_id": conversation_id, "turns": record.turn_count()}),
            ),
            Err(e) => state.tracer.log_with(
                TraceLevel::Warn,
                PERSISTENCE,
                format!("Conversation not saved: {e}"),
                json!({
                    "conversation_id": conversation_id,
                    "error": e.kind(),
                    "fatal": e.is_fatal(),
                }),
            ),
        }
    }
}
