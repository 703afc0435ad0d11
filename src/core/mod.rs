//! Core types shared by the client and the reference provider.
//!
//! Configuration loading and the bounded-output policy used by
//! text-producing operations.

mod config;
pub mod output;

pub use config::{AgentConfig, Config, LlmConfig, ProviderConfig, ServeConfig};
pub use output::{bound_lines, bound_lines_with_hint, BoundedOutput};
