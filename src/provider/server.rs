//! JSON-RPC front end of the reference provider.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::library::{DocumentLibrary, TemplateCatalog};
use super::tools::ToolBox;
use crate::core::ServeConfig;
use crate::mcp::protocol::{
    error_codes, CallToolParams, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    MCPImplementation, MCPInitializeResult, MCPServerCapabilities, ReadResourceParams,
    ReadResourceResult, ResourceContents, PROTOCOL_VERSION,
};

/// Capability provider serving guidelines, templates and change analysis.
#[derive(Debug, Clone)]
pub struct ProviderServer {
    name: String,
    toolbox: ToolBox,
}

impl ProviderServer {
    pub fn new(name: impl Into<String>, toolbox: ToolBox) -> Self {
        Self { name: name.into(), toolbox }
    }

    /// Load documents from the configured directories.
    pub fn from_config(config: &ServeConfig) -> Self {
        let guidelines = expand_path(&config.guidelines_dir);
        let templates = expand_path(&config.templates_dir);
        let library = DocumentLibrary::load(&guidelines, &templates);

        tracing::info!(
            guidelines = library.guidelines().len(),
            templates = library.templates().len(),
            "Loaded provider documents"
        );

        let catalog = TemplateCatalog::default().with_type_mapping(&config.type_mapping);
        let toolbox = ToolBox::new(library, catalog)
            .with_repo(expand_path(&config.repo_path))
            .with_max_diff_lines(config.max_diff_lines);

        Self::new(config.name.clone(), toolbox)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn toolbox(&self) -> &ToolBox {
        &self.toolbox
    }

    /// Answer one request.
    pub fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        tracing::debug!(method = %request.method, id = %request.id, "Provider request");

        match self.dispatch(&request.method, request.params) {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::failure(request.id, error),
        }
    }

    fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => to_value(self.initialize_result()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.toolbox.definitions() })),
            "tools/call" => {
                let params: CallToolParams = parse_params(params)?;
                to_value(self.toolbox.call(&params.name, params.arguments))
            }
            "resources/list" => Ok(json!({ "resources": self.toolbox.library().resources() })),
            "resources/read" => {
                let params: ReadResourceParams = parse_params(params)?;
                let text = self.toolbox.library().read(&params.uri).ok_or_else(|| {
                    JsonRpcError::new(
                        error_codes::RESOURCE_NOT_FOUND,
                        format!("Resource not found: {}", params.uri),
                    )
                })?;
                to_value(ReadResourceResult {
                    contents: vec![ResourceContents {
                        uri: params.uri,
                        mime_type: Some("text/markdown".to_string()),
                        text: Some(text),
                        blob: None,
                    }],
                })
            }
            other => Err(JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        }
    }

    fn initialize_result(&self) -> MCPInitializeResult {
        MCPInitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: MCPServerCapabilities {
                tools: Some(json!({})),
                resources: Some(json!({})),
                prompts: None,
            },
            server_info: MCPImplementation {
                name: self.name.clone(),
                version: Some(crate::VERSION.to_string()),
            },
            instructions: Some(
                "Team guidelines and PR templates are available as resources; \
                 use the tools to search them and to analyse local changes."
                    .to_string(),
            ),
        }
    }

    /// Serve requests from `reader` until it reaches EOF.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let request = match serde_json::from_str::<JsonRpcMessage>(line) {
                Ok(JsonRpcMessage::Request(request)) => request,
                Ok(JsonRpcMessage::Notification(note)) => {
                    tracing::debug!(method = %note.method, "Provider notification");
                    continue;
                }
                Ok(JsonRpcMessage::Response(response)) => {
                    tracing::debug!(id = %response.id, "Ignoring unsolicited response");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unparseable message");
                    continue;
                }
            };

            let mut out = serde_json::to_string(&self.handle(request))?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }

        tracing::debug!(provider = %self.name, "Input closed, provider stopping");
        Ok(())
    }

    /// Serve on the process's stdin and stdout.
    pub async fn serve_stdio(&self) -> anyhow::Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

fn parse_params<T: for<'de> serde::Deserialize<'de>>(params: Option<Value>) -> Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, format!("Invalid params: {}", e)))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))
}
