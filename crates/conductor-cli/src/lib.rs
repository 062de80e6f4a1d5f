//! Configuration loading and the HTTP surface behind the `conductor` binary.

pub mod config;
pub mod server;

pub use config::{ConductorConfig, ServerConfig};
pub use server::router;
