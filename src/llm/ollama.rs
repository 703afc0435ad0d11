//! Ollama local LLM integration.
//!
//! Uses the `/api/chat` endpoint with `tools`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::arguments_object;
use crate::agent::{new_call_id, ConversationState, EngineReply, InvocationRequest, ReasoningEngine, Turn};
use crate::mcp::schema::FunctionDeclaration;

/// Ollama chat engine.
pub struct OllamaEngine {
    client: Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaEngine {
    /// Create a new Ollama engine with default settings.
    ///
    /// Honors `OLLAMA_HOST` and `OLLAMA_MODEL`; otherwise localhost:11434.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.1:8b".to_string()),
            temperature: None,
        }
    }

    /// Create with a specific base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create with a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
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
            stream: false,
            options: self.temperature.map(|temperature| ChatOptions { temperature }),
        }
    }
}

impl Default for OllamaEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReasoningEngine for OllamaEngine {
    async fn complete(
        &self,
        conversation: &ConversationState,
        functions: &[FunctionDeclaration],
    ) -> anyhow::Result<EngineReply> {
        let request = self.build_request(conversation, functions);

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({}): {}", status, body);
        }

        let response: ChatResponse = response.json().await?;
        Ok(parse_reply(response.message))
    }

    fn name(&self) -> &str {
        "ollama"
    }

    async fn is_available(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(std::time::Duration::from_secs(2))
            .send()
            .await;

        result.is_ok()
    }
}

/// Map the conversation onto Ollama chat messages.
fn to_messages(conversation: &ConversationState) -> Vec<ChatMessage> {
    conversation
        .iter()
        .map(|turn| match turn {
            Turn::System { content } => ChatMessage::plain("system", content),
            Turn::User { content } => ChatMessage::plain("user", content),
            Turn::Assistant { content, invocations } => ChatMessage {
                tool_calls: invocations
                    .iter()
                    .map(|call| ToolCall {
                        id: Some(call.id.clone()),
                        function: FunctionCall {
                            name: call.name.clone(),
                            arguments: Value::Object(call.arguments.clone()),
                        },
                    })
                    .collect(),
                ..ChatMessage::plain("assistant", content)
            },
            Turn::OperationResult { name, content, .. } => ChatMessage {
                tool_name: Some(name.clone()),
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
            let arguments = arguments_object(&call.function.name, call.function.arguments);
            InvocationRequest {
                id: call.id.filter(|id| !id.is_empty()).unwrap_or_else(new_call_id),
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    EngineReply { content: message.content, invocations }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [FunctionDeclaration],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self { role: role.to_string(), content: content.to_string(), tool_calls: Vec::new(), tool_name: None }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: FunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ollama_engine_creation() {
        let engine = OllamaEngine::new();
        assert_eq!(engine.name(), "ollama");
    }

    #[test]
    fn test_ollama_with_custom_url() {
        let engine = OllamaEngine::new().with_base_url("http://custom:8080/");
        assert_eq!(engine.base_url, "http://custom:8080");
    }

    #[test]
    fn test_ollama_with_custom_model() {
        let engine = OllamaEngine::new().with_model("qwen3:1.7b");
        assert_eq!(engine.model(), "qwen3:1.7b");
    }

    #[test]
    fn test_conversation_mapping() {
        let call = InvocationRequest::new("search_guidelines").with_id("call_1").arg("keyword", "test");
        let mut conversation = ConversationState::new();
        conversation.append(Turn::user("find testing guidelines"));
        conversation.append(Turn::assistant("", vec![call.clone()]));
        conversation.append(Turn::result(&call, "Found 2 matches", false));

        let messages = serde_json::to_value(to_messages(&conversation)).unwrap();
        assert_eq!(messages[0], json!({"role": "user", "content": "find testing guidelines"}));
        assert_eq!(messages[1]["tool_calls"][0]["function"]["name"], "search_guidelines");
        assert_eq!(messages[1]["tool_calls"][0]["function"]["arguments"], json!({"keyword": "test"}));
        assert_eq!(
            messages[2],
            json!({"role": "tool", "content": "Found 2 matches", "tool_name": "search_guidelines"})
        );
    }

    #[test]
    fn test_request_omits_empty_tools() {
        let engine = OllamaEngine::new().with_model("m");
        let request = serde_json::to_value(engine.build_request(&ConversationState::new(), &[])).unwrap();
        assert!(request.get("tools").is_none());
        assert_eq!(request["stream"], false);
    }

    #[test]
    fn test_parse_reply_with_tool_calls() {
        let message: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [
                {"function": {"name": "get_pr_templates", "arguments": {}}},
                {"function": {"name": "suggest_template", "arguments": {"change_type": "bug"}}}
            ]
        }))
        .unwrap();

        let reply = parse_reply(message);
        assert_eq!(reply.invocations.len(), 2);
        assert_eq!(reply.invocations[0].name, "get_pr_templates");
        assert!(reply.invocations[0].id.starts_with("call_"));
        assert_eq!(reply.invocations[1].arguments["change_type"], "bug");
    }

    #[test]
    fn test_parse_plain_reply() {
        let message: ChatMessage =
            serde_json::from_value(json!({"role": "assistant", "content": "Done."})).unwrap();
        let reply = parse_reply(message);
        assert_eq!(reply, EngineReply::text("Done."));
    }
}
