//! Conversation state and the dispatch loop.
//!
//! The loop is generic over a [`ReasoningEngine`] (an LLM with function
//! calling) and an [`OperationInvoker`] (usually a
//! [`ProviderSet`](crate::mcp::ProviderSet)), so it can be driven by scripted
//! engines and recording invokers in tests.

mod conversation;
mod dispatch;

pub use conversation::{new_call_id, ConversationState, InvocationRequest, Role, Turn};
pub use dispatch::{
    DispatchError, DispatchLoop, DispatchOptions, EngineReply, InvokeError, OperationInvoker,
    ReasoningEngine, TurnOutcome,
};

/// Default system prompt for interactive chat.
pub fn default_system_prompt(tool_names: &[&str]) -> String {
    let mut prompt = String::from(
        "You are a helpful assistant with access to tools provided by MCP servers. \
         Use a tool when it helps answer the user's request, then answer plainly.",
    );

    if !tool_names.is_empty() {
        prompt.push_str("\n\nAvailable tools: ");
        prompt.push_str(&tool_names.join(", "));
    }

    prompt
}
