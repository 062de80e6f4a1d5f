//! Core types and error definitions for the Conductor orchestration engine.
//!
//! This crate provides the foundational types shared across all Conductor crates,
//! including error handling, conversation turns, tool call abstractions, and the
//! per-request execution trace.
//!
//! # Main types
//!
//! - [`ConductorError`]: Unified error enum for all Conductor subsystems.
//! - [`ConductorResult`]: Convenience alias for `Result<T, ConductorError>`.
//! - [`ConversationTurn`]: One user or assistant turn in the message history.
//! - [`ContentBlock`]: Text, tool-use, or tool-result block inside a turn.
//! - [`ToolKey`]: Typed `{server_id, tool_name}` identity of a remote tool.
//! - [`ToolCallRequest`] / [`ToolCallResult`]: One tool invocation and its outcome.
//! - [`ExecutionTracer`]: Append-only structured log returned with every reply.

pub mod error;
pub mod message;
pub mod tool;
pub mod trace;

pub use error::{ConductorError, ConductorResult};
pub use message::{ContentBlock, ConversationTurn, Role, TurnContent};
pub use tool::{ToolCallRequest, ToolCallResult, ToolKey, ToolSchema};
pub use trace::{ExecutionTracer, TraceEntry, TraceLevel};
