//! MCP (Model Context Protocol) client.
//!
//! Connects to capability providers over newline-delimited JSON-RPC,
//! discovers what they offer and exposes their operations to the dispatch
//! loop as function declarations.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                   DispatchLoop                      │
//! │                        │ invoke(name, args)         │
//! │  ┌─────────────────────▼──────────────────────┐    │
//! │  │                ProviderSet                  │    │
//! │  │  • routes operation names to providers     │    │
//! │  │  • adapts descriptors for the engine       │    │
//! │  └─────────────────────┬──────────────────────┘    │
//! │         ┌──────────────┼──────────────┐            │
//! │         ▼              ▼              ▼            │
//! │   ProviderHandle  ProviderHandle  ProviderHandle   │
//! │   Session+Registry     ...            ...          │
//! │         │                                          │
//! │     Transport (pending map, reader task)           │
//! └─────────┼──────────────────────────────────────────┘
//!           ▼
//!     provider process (stdin/stdout)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mcpilot::core::ProviderConfig;
//! use mcpilot::mcp::{ProviderHandle, ProviderSet};
//!
//! let config = ProviderConfig::new("resources", "mcpilot").with_args(vec!["serve".into()]);
//! let mut providers = ProviderSet::new();
//! providers.add(ProviderHandle::connect(&config).await?)?;
//!
//! let functions = providers.function_declarations();
//! ```

pub mod protocol;
pub mod registry;
pub mod router;
pub mod schema;
pub mod session;
pub mod transport;

pub use protocol::{
    CallToolParams, CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCPResource,
    ReadResourceResult, RequestId, ToolContent,
};
pub use registry::{
    format_capabilities, format_resources, CapabilityDescriptor, CapabilityRegistry,
    ConfigurationError,
};
pub use router::{ProviderHandle, ProviderSet, ProviderSetError};
pub use schema::{adapt, FunctionDeclaration, FunctionSpec};
pub use session::{Session, SessionError, SessionOptions};
pub use transport::{Transport, TransportError};
