//! Remote tool access for Conductor.
//!
//! Tool servers speak JSON-RPC 2.0 (`initialize`, `tools/list`, `tools/call`)
//! over HTTP or a child process's stdio. This crate talks to them
//! ([`HttpToolClient`], [`StdioToolClient`]), decides which
//! servers a caller may use ([`ServerDirectory`]), flattens every server's
//! tools into one namespaced snapshot ([`RegistryAggregator`]), and executes
//! model tool calls against that snapshot with contained failures
//! ([`ToolDispatcher`]).

pub mod client;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod protocol;
pub mod registry;
pub mod stdio;

pub use client::{HttpToolClient, ToolProtocol};
pub use config::{ToolServerConfig, Transport};
pub use directory::{RegisteredServer, ServerDirectory, StaticServerDirectory};
pub use dispatcher::{DispatchOutcome, ToolDispatcher};
pub use registry::{RegistryAggregator, ToolDescriptor, ToolRegistry};
pub use stdio::StdioToolClient;
