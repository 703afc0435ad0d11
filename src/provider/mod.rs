//! Reference capability provider, run by `mcpilot serve`.
//!
//! Serves team guidelines and PR templates as resources and exposes a few
//! operations over them. Documents are loaded once at startup and never
//! change while serving.

#[cfg(feature = "git")]
mod changes;
mod library;
mod server;
mod tools;

#[cfg(feature = "git")]
pub use changes::{analyze, analyze_file_changes, ChangeAnalysis};
pub use library::{Document, DocumentLibrary, TemplateCatalog, LIST_URI};
pub use server::ProviderServer;
pub use tools::{AnalyzeArgs, ProviderError, ToolBox};
