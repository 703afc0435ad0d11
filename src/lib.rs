//! # mcpilot
//!
//! Connect an LLM to tools served by MCP capability providers.
//!
//! mcpilot starts providers as child processes, discovers the operations they
//! advertise, and runs a dispatch loop that lets a reasoning engine call those
//! operations until it produces a final answer.
//!
//! ## Features
//!
//! - **Sessions**: JSON-RPC 2.0 over stdio with id-correlated requests
//! - **Routing**: several providers behind one tool namespace
//! - **Engines**: Ollama and OpenAI-compatible function calling
//! - **Reference provider**: guidelines, PR templates and change analysis
//!
//! ## Quick Start
//!
//! ```bash
//! # List tools of the configured providers
//! mcpilot tools
//!
//! # Ask a question
//! mcpilot chat "Which PR template fits a bug fix?"
//!
//! # Run the bundled provider on stdio
//! mcpilot serve --guidelines ./guidelines --templates ./templates
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::format_push_string)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::use_self)]

pub mod agent;
pub mod core;
pub mod mcp;
pub mod provider;

#[cfg(feature = "ai")]
pub mod llm;

pub use agent::{
    ConversationState, DispatchError, DispatchLoop, DispatchOptions, EngineReply,
    InvocationRequest, OperationInvoker, ReasoningEngine, Turn, TurnOutcome,
};
pub use core::{bound_lines, BoundedOutput, Config};
pub use mcp::{
    CapabilityDescriptor, CapabilityRegistry, FunctionDeclaration, ProviderSet, Session,
    Transport,
};
pub use provider::ProviderServer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "mcpilot";
