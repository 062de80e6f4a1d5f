//! Completion client and bounded tool-orchestration loop for Conductor.
//!
//! The [`Orchestrator`] takes a [`ChatRequest`], snapshots the caller's tool
//! registry once, then alternates completion calls and concurrent tool
//! dispatch until the model stops asking for tools or the iteration bound is
//! reached. Usage is summed per round and priced by [`RateTable`]; every step
//! lands in the execution trace returned with the reply.

pub mod backends;
pub mod config;
pub mod llm;
pub mod request;
pub mod runner;
pub mod usage;

pub use backends::claude::ClaudeBackend;
pub use backends::CompletionBackend;
pub use config::{LlmProvider, ModelConfig, OrchestratorConfig};
pub use llm::{CompletionClient, CompletionResponse, StopReason};
pub use request::{
    ChatRequest, ChatResponse, ErrorEnvelope, FileMetadata, RequestFailure, ResponseMetadata,
    TerminationReason, TokenUsage,
};
pub use runner::{LoopOutcome, OrchestrationState, Orchestrator};
pub use usage::{ModelRates, RateTable, RoundUsage, UsageAccumulator};
