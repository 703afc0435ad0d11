//! Configuration management for mcpilot.
//!
//! Handles loading configuration from TOML files.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reasoning engine settings
    pub llm: LlmConfig,

    /// Dispatch loop settings
    pub agent: AgentConfig,

    /// Capability providers to connect to
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Settings for the built-in reference provider (`mcpilot serve`)
    pub serve: ServeConfig,
}

/// Reasoning engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Engine kind: "ollama" or "openai"
    pub provider: String,

    /// Model name (engine default when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Base URL override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Name of the environment variable holding the API key
    pub api_key_env: String,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: None,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: None,
        }
    }
}

/// Dispatch loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum number of invocation batches per user turn
    pub max_cycles: usize,

    /// Deadline for a single reasoning-engine call, in seconds
    pub engine_timeout_secs: u64,

    /// Deadline for a single operation invocation, in seconds
    pub invoke_timeout_secs: u64,

    /// Optional system prompt placed before the first user turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_cycles: 8, engine_timeout_secs: 300, invoke_timeout_secs: 120, system_prompt: None }
    }
}

/// Configuration for a single capability provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name (unique identifier)
    pub name: String,

    /// Command to run the provider
    pub command: String,

    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables (values may reference `${VAR}`)
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Handshake deadline, in seconds
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Per-request deadline, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_startup_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    120
}

impl ProviderConfig {
    /// Create a new provider entry.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            startup_timeout_secs: default_startup_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }

    /// Add arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add environment variables.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Settings for the reference provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Name reported in the handshake
    pub name: String,

    /// Directory of guideline documents (`*.md`)
    pub guidelines_dir: PathBuf,

    /// Directory of PR templates (`*.md`)
    pub templates_dir: PathBuf,

    /// Repository analysed by `analyze_file_changes`
    pub repo_path: PathBuf,

    /// Default line budget for diffs
    pub max_diff_lines: usize,

    /// Extra change-type -> template filename entries
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub type_mapping: BTreeMap<String, String>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            name: "mcpilot-resources".to_string(),
            guidelines_dir: PathBuf::from("guidelines"),
            templates_dir: PathBuf::from("templates"),
            repo_path: PathBuf::from("."),
            max_diff_lines: 500,
            type_mapping: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `mcpilot.toml` in current directory
    /// 2. `.mcpilot.toml` in current directory
    /// 3. `~/.config/mcpilot/config.toml`
    /// 4. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        for local in ["mcpilot.toml", ".mcpilot.toml"] {
            let local_config = PathBuf::from(local);
            if local_config.exists() {
                return Self::load_from_file(&local_config);
            }
        }

        if let Some(global_config) = Self::global_path() {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("mcpilot"))
    }

    /// Path of the global config file.
    pub fn global_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }

    /// Look up a provider by name.
    pub fn find_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}
