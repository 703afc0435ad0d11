//! The dispatch loop.
//!
//! Alternates between the reasoning engine and operation invocations until
//! the engine answers without requesting any operation:
//!
//! ```text
//! AWAIT_MODEL ─┬─ no invocations ──────────────► DONE
//!              └─ invocations ─► EXECUTING ─► AWAIT_MODEL
//! ```
//!
//! Invocations run one at a time, in the order the engine listed them.
//! Failed invocations become error result turns so the engine can react;
//! only engine failures and the cycle cap end a turn early.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::conversation::{ConversationState, InvocationRequest, Turn};
use crate::core::AgentConfig;
use crate::mcp::protocol::CallToolResult;
use crate::mcp::schema::FunctionDeclaration;
use crate::mcp::transport::TransportError;

/// Reply from a reasoning engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineReply {
    /// Text content (may be empty when invocations are requested)
    pub content: String,
    /// Requested invocations, in order
    pub invocations: Vec<InvocationRequest>,
}

impl EngineReply {
    /// A plain answer.
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), invocations: Vec::new() }
    }

    /// A reply requesting invocations.
    pub fn invoke(invocations: Vec<InvocationRequest>) -> Self {
        Self { content: String::new(), invocations }
    }

    pub fn has_invocations(&self) -> bool {
        !self.invocations.is_empty()
    }
}

/// A model that decides, per turn, whether to request operations.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Produce the next reply for the full conversation.
    async fn complete(
        &self,
        conversation: &ConversationState,
        functions: &[FunctionDeclaration],
    ) -> anyhow::Result<EngineReply>;

    /// Engine name.
    fn name(&self) -> &str;

    /// Check if the engine is reachable.
    async fn is_available(&self) -> bool {
        true
    }
}

#[async_trait]
impl ReasoningEngine for Box<dyn ReasoningEngine> {
    async fn complete(
        &self,
        conversation: &ConversationState,
        functions: &[FunctionDeclaration],
    ) -> anyhow::Result<EngineReply> {
        (**self).complete(conversation, functions).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn is_available(&self) -> bool {
        (**self).is_available().await
    }
}

/// Error from an invoker.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("operation '{0}' is not provided by any connected provider")]
    UnknownOperation(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Something that can run a named operation.
#[async_trait]
pub trait OperationInvoker: Send {
    async fn invoke(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, InvokeError>;
}

/// Limits applied by the loop.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum invocation batches per user turn
    pub max_cycles: usize,
    /// Deadline for one reasoning-engine call
    pub engine_timeout: Duration,
    /// Deadline for one invocation
    pub invoke_timeout: Duration,
    /// System prompt placed at the start of the conversation
    pub system_prompt: Option<String>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for DispatchOptions {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_cycles: config.max_cycles,
            engine_timeout: Duration::from_secs(config.engine_timeout_secs),
            invoke_timeout: Duration::from_secs(config.invoke_timeout_secs),
            system_prompt: config.system_prompt.clone(),
        }
    }
}

impl DispatchOptions {
    /// Set the cycle cap.
    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Set the engine deadline.
    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = timeout;
        self
    }

    /// Set the per-invocation deadline.
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// A turn that could not be completed.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Reasoning engine failed: {0:#}")]
    Engine(anyhow::Error),

    #[error("Reasoning engine did not answer within {0:?}")]
    EngineTimeout(Duration),

    #[error("Stopped after {max_cycles} invocation cycles without a final answer")]
    LoopExceeded { max_cycles: usize },
}

/// Final answer of one user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The engine's plain answer
    pub text: String,
    /// Invocation batches executed before the answer
    pub cycles: usize,
    /// Invocations executed before the answer
    pub invocations: usize,
}

/// Drives one conversation against one engine and one invoker.
pub struct DispatchLoop<E, I> {
    engine: E,
    invoker: I,
    functions: Vec<FunctionDeclaration>,
    options: DispatchOptions,
    conversation: ConversationState,
}

impl<E: ReasoningEngine, I: OperationInvoker> DispatchLoop<E, I> {
    /// Create a loop; the system prompt, if any, becomes the first turn.
    pub fn new(
        engine: E,
        invoker: I,
        functions: Vec<FunctionDeclaration>,
        options: DispatchOptions,
    ) -> Self {
        let mut conversation = ConversationState::new();
        if let Some(prompt) = options.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            conversation.append(Turn::system(prompt));
        }

        Self { engine, invoker, functions, options, conversation }
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn functions(&self) -> &[FunctionDeclaration] {
        &self.functions
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Take the engine, the invoker and the conversation back.
    pub fn into_parts(self) -> (E, I, ConversationState) {
        (self.engine, self.invoker, self.conversation)
    }

    /// Run one user turn to completion.
    pub async fn run_turn(&mut self, message: &str) -> Result<TurnOutcome, DispatchError> {
        self.conversation.append(Turn::user(message));

        let mut cycles = 0;
        let mut invocations = 0;

        loop {
            tracing::debug!(
                engine = self.engine.name(),
                cycle = cycles,
                turns = self.conversation.len(),
                "Awaiting reasoning engine"
            );

            let reply = match tokio::time::timeout(
                self.options.engine_timeout,
                self.engine.complete(&self.conversation, &self.functions),
            )
            .await
            {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => return Err(DispatchError::Engine(e)),
                Err(_) => return Err(DispatchError::EngineTimeout(self.options.engine_timeout)),
            };

            if !reply.has_invocations() {
                self.conversation.append(Turn::assistant(reply.content.clone(), Vec::new()));
                return Ok(TurnOutcome { text: reply.content, cycles, invocations });
            }

            if cycles >= self.options.max_cycles {
                tracing::warn!(max_cycles = self.options.max_cycles, "Invocation cycle cap reached");
                return Err(DispatchError::LoopExceeded { max_cycles: self.options.max_cycles });
            }
            cycles += 1;

            let requests = reply.invocations.clone();
            self.conversation.append(Turn::assistant(reply.content, reply.invocations));

            for request in &requests {
                let turn = self.execute(request).await;
                self.conversation.append(turn);
                invocations += 1;
            }
        }
    }

    /// Run one invocation; every outcome becomes a result turn.
    async fn execute(&mut self, request: &InvocationRequest) -> Turn {
        tracing::info!(operation = %request.name, id = %request.id, "Invoking operation");

        let timeout = self.options.invoke_timeout;
        let outcome = tokio::time::timeout(
            timeout,
            self.invoker.invoke(&request.name, request.arguments.clone()),
        )
        .await;

        match outcome {
            Ok(Ok(result)) => {
                if result.is_error() {
                    tracing::debug!(operation = %request.name, "Operation reported an error");
                }
                Turn::result(request, result.first_text(), result.is_error())
            }
            Ok(Err(InvokeError::UnknownOperation(name))) => {
                tracing::warn!(operation = %name, "Engine requested an unknown operation");
                Turn::result(
                    request,
                    format!("UnknownOperation: operation '{}' is not available", name),
                    true,
                )
            }
            Ok(Err(InvokeError::Transport(e))) => {
                tracing::warn!(operation = %request.name, error = %e, "Invocation failed");
                Turn::result(request, format!("TransportError: {}", e), true)
            }
            Err(_) => {
                tracing::warn!(operation = %request.name, ?timeout, "Invocation timed out");
                Turn::result(
                    request,
                    format!(
                        "TimeoutError: operation '{}' did not complete within {:?}",
                        request.name, timeout
                    ),
                    true,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    struct Scripted {
        replies: Mutex<VecDeque<EngineReply>>,
    }

    impl Scripted {
        fn new(replies: Vec<EngineReply>) -> Self {
            Self { replies: Mutex::new(replies.into()) }
        }
    }

    #[async_trait]
    impl ReasoningEngine for Scripted {
        async fn complete(
            &self,
            _conversation: &ConversationState,
            _functions: &[FunctionDeclaration],
        ) -> anyhow::Result<EngineReply> {
            self.replies.lock().pop_front().ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Echo;

    #[async_trait]
    impl OperationInvoker for Echo {
        async fn invoke(
            &mut self,
            name: &str,
            _arguments: Map<String, Value>,
        ) -> Result<CallToolResult, InvokeError> {
            Ok(CallToolResult::text(format!("ran {}", name)))
        }
    }

    #[tokio::test]
    async fn test_plain_answer_adds_two_turns() {
        let engine = Scripted::new(vec![EngineReply::text("hello")]);
        let mut dispatch = DispatchLoop::new(engine, Echo, Vec::new(), DispatchOptions::default());

        let outcome = dispatch.run_turn("hi").await.unwrap();
        assert_eq!(outcome.text, "hello");
        assert_eq!(outcome.cycles, 0);
        assert_eq!(dispatch.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_system_prompt_is_first_turn() {
        let engine = Scripted::new(vec![EngineReply::text("ok")]);
        let options = DispatchOptions::default().with_system_prompt("be brief");
        let mut dispatch = DispatchLoop::new(engine, Echo, Vec::new(), options);

        dispatch.run_turn("hi").await.unwrap();
        assert_eq!(dispatch.conversation().turns()[0], Turn::system("be brief"));
        assert_eq!(dispatch.conversation().len(), 3);
    }

    #[tokio::test]
    async fn test_engine_failure_keeps_conversation() {
        let engine = Scripted::new(Vec::new());
        let mut dispatch = DispatchLoop::new(engine, Echo, Vec::new(), DispatchOptions::default());

        let err = dispatch.run_turn("hi").await.unwrap_err();
        assert!(matches!(err, DispatchError::Engine(_)));
        assert!(err.to_string().contains("script exhausted"));
        assert_eq!(dispatch.conversation().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_cycle_cap() {
        let engine = Scripted::new(vec![EngineReply::invoke(vec![InvocationRequest::new("x")])]);
        let options = DispatchOptions::default().with_max_cycles(0);
        let mut dispatch = DispatchLoop::new(engine, Echo, Vec::new(), options);

        let err = dispatch.run_turn("hi").await.unwrap_err();
        assert!(matches!(err, DispatchError::LoopExceeded { max_cycles: 0 }));
        assert_eq!(dispatch.conversation().len(), 1);
    }
}
