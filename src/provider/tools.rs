//! Operations exposed by the reference provider.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::library::{DocumentLibrary, TemplateCatalog};
use crate::mcp::protocol::{CallToolResult, ToolDefinition};

/// Error raised while running a provider operation.
///
/// Always reported in-band as an error result.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("No PR templates available")]
    NoTemplates,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    keyword: String,
}

#[derive(Debug, Deserialize)]
struct SuggestArgs {
    changes_summary: String,
    change_type: String,
}

/// Arguments of `analyze_file_changes`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzeArgs {
    pub base_branch: String,
    pub include_diff: bool,
    pub max_diff_lines: usize,
}

impl Default for AnalyzeArgs {
    fn default() -> Self {
        Self { base_branch: "main".to_string(), include_diff: true, max_diff_lines: 500 }
    }
}

#[derive(Debug, Clone, Serialize)]
struct TemplateEntry {
    filename: String,
    #[serde(rename = "type")]
    label: String,
    content: String,
}

/// The provider's operations and the immutable tables they read.
#[derive(Debug, Clone)]
pub struct ToolBox {
    library: DocumentLibrary,
    catalog: TemplateCatalog,
    repo_path: PathBuf,
    max_diff_lines: usize,
}

impl ToolBox {
    pub fn new(library: DocumentLibrary, catalog: TemplateCatalog) -> Self {
        Self { library, catalog, repo_path: PathBuf::from("."), max_diff_lines: 500 }
    }

    /// Repository analysed by `analyze_file_changes`.
    pub fn with_repo(mut self, repo_path: impl Into<PathBuf>) -> Self {
        self.repo_path = repo_path.into();
        self
    }

    /// Default diff budget when the caller does not pass one.
    pub fn with_max_diff_lines(mut self, max_diff_lines: usize) -> Self {
        self.max_diff_lines = max_diff_lines;
        self
    }

    pub fn library(&self) -> &DocumentLibrary {
        &self.library
    }

    /// Tool listing, in the order it is advertised.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut tools = vec![
            ToolDefinition {
                name: "search_guidelines".to_string(),
                description: Some(
                    "Search for a keyword across all team guidelines and templates (case-insensitive)"
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "keyword": {"type": "string", "description": "The keyword to search for"}
                    },
                    "required": ["keyword"]
                }),
            },
            ToolDefinition {
                name: "get_resource_info".to_string(),
                description: Some("Get information about all available resources and tools".to_string()),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDefinition {
                name: "get_pr_templates".to_string(),
                description: Some("List available PR templates with their content".to_string()),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDefinition {
                name: "suggest_template".to_string(),
                description: Some(
                    "Suggest the most appropriate PR template for an analysed change".to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "changes_summary": {
                            "type": "string",
                            "description": "Your analysis of what the changes do"
                        },
                        "change_type": {
                            "type": "string",
                            "description": "The type of change (bug, feature, docs, refactor, test, etc.)"
                        }
                    },
                    "required": ["changes_summary", "change_type"]
                }),
            },
        ];

        if cfg!(feature = "git") {
            tools.push(ToolDefinition {
                name: "analyze_file_changes".to_string(),
                description: Some(
                    "Get the diff and list of changed files in the repository against a base branch"
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "base_branch": {"type": "string", "default": "main"},
                        "include_diff": {"type": "boolean", "default": true},
                        "max_diff_lines": {"type": "integer", "default": self.max_diff_lines}
                    }
                }),
            });
        }

        tools
    }

    /// Run one operation; failures come back as error results.
    pub fn call(&self, name: &str, arguments: Option<Map<String, Value>>) -> CallToolResult {
        let arguments = Value::Object(arguments.unwrap_or_default());
        match self.dispatch(name, arguments) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(tool = name, error = %e, "Tool call failed");
                CallToolResult::error(e.to_string())
            }
        }
    }

    fn dispatch(&self, name: &str, arguments: Value) -> Result<CallToolResult, ProviderError> {
        match name {
            "search_guidelines" => {
                let args: SearchArgs = parse_args(name, arguments)?;
                Ok(CallToolResult::text(self.library.search(&args.keyword)))
            }
            "get_resource_info" => Ok(CallToolResult::text(self.resource_info())),
            "get_pr_templates" => {
                Ok(CallToolResult::text(serde_json::to_string_pretty(&self.templates())?))
            }
            "suggest_template" => {
                let args: SuggestArgs = parse_args(name, arguments)?;
                self.suggest_template(&args).map(CallToolResult::text)
            }
            #[cfg(feature = "git")]
            "analyze_file_changes" => {
                let args: AnalyzeArgs =
                    parse_args(name, fill_defaults(arguments, self.max_diff_lines))?;
                Ok(super::changes::analyze_file_changes(&self.repo_path, &args))
            }
            other => Err(ProviderError::UnknownTool(other.to_string())),
        }
    }

    fn templates(&self) -> Vec<TemplateEntry> {
        self.catalog
            .labels()
            .iter()
            .filter_map(|(file_name, label)| {
                self.library.template(file_name).map(|doc| TemplateEntry {
                    filename: file_name.clone(),
                    label: label.clone(),
                    content: doc.content.clone(),
                })
            })
            .collect()
    }

    fn suggest_template(&self, args: &SuggestArgs) -> Result<String, ProviderError> {
        let templates = self.templates();
        let wanted = self.catalog.resolve(&args.change_type);
        let selected = templates
            .iter()
            .find(|t| t.filename == wanted)
            .or_else(|| templates.first())
            .ok_or(ProviderError::NoTemplates)?;

        let suggestion = json!({
            "recommended_template": selected,
            "reasoning": format!(
                "Based on your analysis: '{}', this appears to be a {} change.",
                args.changes_summary, args.change_type
            ),
            "template_content": selected.content,
            "usage_hint": "An assistant can help you fill out this template based on the specific changes in your PR."
        });

        Ok(serde_json::to_string_pretty(&suggestion)?)
    }

    fn resource_info(&self) -> String {
        let mut info = vec!["## Available Resources\n".to_string(), "### Team Guidelines".to_string()];
        for doc in self.library.guidelines() {
            info.push(format!("- `guidelines://{}` - {}", doc.stem, doc.stem.replace('-', " ")));
        }
        info.push("- `guidelines://list` - List all available resources".to_string());

        info.push(String::new());
        info.push("### Templates".to_string());
        for doc in self.library.templates() {
            info.push(format!("- `templates://{}` - {} template", doc.stem, doc.stem));
        }

        info.push(String::new());
        info.push("### Tools".to_string());
        for tool in self.definitions() {
            info.push(format!("- `{}` - {}", tool.name, tool.description.unwrap_or_default()));
        }

        info.join("\n")
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, arguments: Value) -> Result<T, ProviderError> {
    serde_json::from_value(arguments)
        .map_err(|e| ProviderError::InvalidArguments { tool: tool.to_string(), reason: e.to_string() })
}

/// Use the configured diff budget when the caller leaves it out.
#[cfg(feature = "git")]
fn fill_defaults(arguments: Value, max_diff_lines: usize) -> Value {
    let mut map = match arguments {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.entry("max_diff_lines").or_insert_with(|| json!(max_diff_lines));
    Value::Object(map)
}
