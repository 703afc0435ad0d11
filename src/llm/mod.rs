//! Reasoning engines.
//!
//! HTTP clients for LLMs with function calling:
//! - Ollama (local, default)
//! - OpenAI and compatible `/chat/completions` endpoints

mod ollama;
mod openai;

pub use ollama::OllamaEngine;
pub use openai::OpenAiEngine;

use serde_json::{Map, Value};

use crate::agent::ReasoningEngine;
use crate::core::LlmConfig;

/// Build the engine selected by `[llm]`.
pub fn engine_from_config(config: &LlmConfig) -> anyhow::Result<Box<dyn ReasoningEngine>> {
    match config.provider.to_ascii_lowercase().as_str() {
        "ollama" => {
            let mut engine = OllamaEngine::new();
            if let Some(ref url) = config.base_url {
                engine = engine.with_base_url(url);
            }
            if let Some(ref model) = config.model {
                engine = engine.with_model(model);
            }
            if let Some(temperature) = config.temperature {
                engine = engine.with_temperature(temperature);
            }
            Ok(Box::new(engine))
        }
        "openai" => {
            let mut engine = OpenAiEngine::from_env(&config.api_key_env)?;
            if let Some(ref url) = config.base_url {
                engine = engine.with_base_url(url);
            }
            if let Some(ref model) = config.model {
                engine = engine.with_model(model);
            }
            if let Some(temperature) = config.temperature {
                engine = engine.with_temperature(temperature);
            }
            Ok(Box::new(engine))
        }
        other => anyhow::bail!("Unknown LLM provider '{}' (expected ollama or openai)", other),
    }
}

/// Coerce tool-call arguments into an object.
///
/// Engines send either an object or a JSON-encoded string. Anything else
/// becomes an empty object and a warning.
pub(crate) fn arguments_object(operation: &str, raw: Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        Value::String(s) if s.trim().is_empty() => Map::new(),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => map,
            _ => {
                tracing::warn!(operation, arguments = %s, "Unparseable tool-call arguments");
                Map::new()
            }
        },
        other => {
            tracing::warn!(operation, arguments = %other, "Tool-call arguments are not an object");
            Map::new()
        }
    }
}
