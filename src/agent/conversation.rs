//! Conversation state.
//!
//! An ordered, append-only log of turns. Only the dispatch loop appends;
//! everything else gets a shared reference.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An operation the reasoning engine asked to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Call id, echoed back on the matching result turn
    pub id: String,
    /// Operation name
    pub name: String,
    /// Arguments object
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl InvocationRequest {
    /// Create a request with a fresh call id.
    pub fn new(name: impl Into<String>) -> Self {
        Self { id: new_call_id(), name: name.into(), arguments: Map::new() }
    }

    /// Add an argument.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Set the call id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Generate a call id for engines that do not supply one.
pub fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    OperationResult,
}

/// One entry of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum Turn {
    /// Instructions placed before the first user turn
    #[serde(rename = "system")]
    System { content: String },

    /// End-user message
    #[serde(rename = "user")]
    User { content: String },

    /// Reasoning-engine reply, kept verbatim including any requested invocations
    #[serde(rename = "assistant")]
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        invocations: Vec<InvocationRequest>,
    },

    /// Result of one invocation
    #[serde(rename = "tool")]
    OperationResult {
        invocation_id: String,
        name: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Turn::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Turn::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>, invocations: Vec<InvocationRequest>) -> Self {
        Turn::Assistant { content: content.into(), invocations }
    }

    /// Result turn answering `request`.
    pub fn result(request: &InvocationRequest, content: impl Into<String>, is_error: bool) -> Self {
        Turn::OperationResult {
            invocation_id: request.id.clone(),
            name: request.name.clone(),
            content: content.into(),
            is_error,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Turn::System { .. } => Role::System,
            Turn::User { .. } => Role::User,
            Turn::Assistant { .. } => Role::Assistant,
            Turn::OperationResult { .. } => Role::OperationResult,
        }
    }

    /// Text content of the turn.
    pub fn content(&self) -> &str {
        match self {
            Turn::System { content }
            | Turn::User { content }
            | Turn::Assistant { content, .. }
            | Turn::OperationResult { content, .. } => content,
        }
    }
}

/// Ordered turn history of one session.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn. Turns are never edited or removed.
    pub(crate) fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Text of the most recent non-empty assistant turn.
    pub fn last_answer(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|turn| match turn {
            Turn::Assistant { content, .. } if !content.is_empty() => Some(content.as_str()),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a ConversationState {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}
