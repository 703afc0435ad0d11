//! Shared fixtures: in-process providers over `tokio::io::duplex`.

#![allow(dead_code)]

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use mcpilot::mcp::{Session, SessionOptions, Transport};
use mcpilot::provider::{Document, DocumentLibrary, ProviderServer, TemplateCatalog, ToolBox};

const CHANNEL_CAPACITY: usize = 64 * 1024;

/// Reference provider loaded with a small document set.
pub fn sample_server() -> ProviderServer {
    let library = DocumentLibrary::from_documents(
        vec![
            Document::new("pr-guidelines.md", "# PR Guidelines\nKeep PRs small.\nAdd tests."),
            Document::new("coding-standards.md", "# Coding Standards\nName things clearly."),
        ],
        vec![
            Document::new("bug.md", "## Bug Fix\nRoot cause:"),
            Document::new("feature.md", "## Feature\nMotivation:"),
        ],
    );
    ProviderServer::new("resources", ToolBox::new(library, TemplateCatalog::default()))
}

/// Transport connected to `server` running on a background task.
pub fn serve_in_process(server: ProviderServer, name: &str) -> Transport {
    let (client, provider) = tokio::io::duplex(CHANNEL_CAPACITY);
    let (provider_read, provider_write) = tokio::io::split(provider);
    tokio::spawn(async move {
        let _ = server.serve(provider_read, provider_write).await;
    });

    let (client_read, client_write) = tokio::io::split(client);
    Transport::from_streams(name, client_read, client_write)
}

/// Initialized session with the sample provider.
pub async fn sample_session(name: &str) -> Session {
    Session::initialize(serve_in_process(sample_server(), name), SessionOptions::default())
        .await
        .unwrap()
}

/// How a scripted provider answers one request.
pub enum Reply {
    Result(Value),
    Error(i32, &'static str),
    /// Write this line verbatim
    Raw(String),
    /// Never answer
    Ignore,
    /// Close the channel
    Hangup,
}

/// Successful `initialize` result.
pub fn init_result(name: &str) -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {"tools": {}},
        "serverInfo": {"name": name, "version": "0.0.1"}
    })
}

/// Transport connected to a provider that answers through `handler`.
///
/// Notifications are swallowed; `handler` sees every request's method and params.
pub fn scripted_provider<F>(name: &str, handler: F) -> Transport
where
    F: Fn(&str, &Value) -> Reply + Send + 'static,
{
    let (client, provider) = tokio::io::duplex(CHANNEL_CAPACITY);
    let (provider_read, mut provider_write) = tokio::io::split(provider);

    tokio::spawn(async move {
        let mut lines = BufReader::new(provider_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let message: Value = serde_json::from_str(&line).unwrap();
            let Some(id) = message.get("id").cloned() else {
                continue;
            };
            let method = message["method"].as_str().unwrap_or_default().to_string();
            let params = message.get("params").cloned().unwrap_or(Value::Null);

            let out = match handler(&method, &params) {
                Reply::Result(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string(),
                Reply::Error(code, message) => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": code, "message": message}
                })
                .to_string(),
                Reply::Raw(raw) => raw,
                Reply::Ignore => continue,
                Reply::Hangup => break,
            };

            if provider_write.write_all(format!("{}\n", out).as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let (client_read, client_write) = tokio::io::split(client);
    Transport::from_streams(name, client_read, client_write)
}

/// Tool entry as a provider would list it.
pub fn tool(name: &str, description: &str) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {"type": "object", "properties": {}}
    })
}
