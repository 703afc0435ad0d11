//! OpenAI API integration.
//!
//! Works with any `/chat/completions` endpoint that supports `tools`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::arguments_object;
use crate::agent::{new_call_id, ConversationState, EngineReply, InvocationRequest, ReasoningEngine, Turn};
use crate::mcp::schema::FunctionDeclaration;

/// OpenAI chat-completions engine.
pub struct OpenAiEngine {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: Option<f32>,
}

impl OpenAiEngine {
    /// Create an engine with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: None,
        }
    }

    /// Create an engine reading the API key from `var`.
    pub fn from_env(var: &str) -> anyhow::Result<Self> {
        let api_key = std::env::var(var).map_err(|_| anyhow::anyhow!("{} not set", var))?;
        Ok(Self::new(api_key))
    }

    /// Create with a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Create with a custom base URL (for compatible APIs).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn build_request<'a>(
        &'a self,
        conversation: &ConversationState,
        functions: &'a [FunctionDeclaration],
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: to_messages(conversation),
            tools: functions,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiEngine {
    async fn complete(
        &self,
        conversation: &ConversationState,
        functions: &[FunctionDeclaration],
    ) -> anyhow::Result<EngineReply> {
        let request = self.build_request(conversation, functions);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, body);
        }

        let response: ChatResponse = response.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| parse_reply(c.message))
            .ok_or_else(|| anyhow::anyhow!("No response from OpenAI"))
    }

    fn name(&self) -> &str {
        "openai"
    }

    async fn is_available(&self) -> bool {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await;

        response.map(|r| r.status().is_success()).unwrap_or(false)
    }
}

fn to_messages(conversation: &ConversationState) -> Vec<ChatMessage> {
    conversation
        .iter()
        .map(|turn| match turn {
            Turn::System { content } => ChatMessage::plain("system", content),
            Turn::User { content } => ChatMessage::plain("user", content),
            Turn::Assistant { content, invocations } => ChatMessage {
                role: "assistant".to_string(),
                content: (!content.is_empty()).then(|| content.clone()),
                tool_calls: invocations
                    .iter()
                    .map(|call| ToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: FunctionCall {
                            name: call.name.clone(),
                            arguments: Value::Object(call.arguments.clone()).to_string(),
                        },
                    })
                    .collect(),
                tool_call_id: None,
            },
            Turn::OperationResult { invocation_id, content, .. } => ChatMessage {
                tool_call_id: Some(invocation_id.clone()),
                ..ChatMessage::plain("tool", content)
            },
        })
        .collect()
}

fn parse_reply(message: ChatMessage) -> EngineReply {
    let invocations = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments =
                arguments_object(&call.function.name, Value::String(call.function.arguments));
            InvocationRequest {
                id: if call.id.is_empty() { new_call_id() } else { call.id },
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    EngineReply { content: message.content.unwrap_or_default(), invocations }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [FunctionDeclaration],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}
