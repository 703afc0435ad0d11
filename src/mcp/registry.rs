//! Capability registry.
//!
//! Caches what a provider advertised at session start: its operations
//! (name, description, parameter schema) and its named content. Listings are
//! validated entry by entry, so one bad descriptor costs one capability and
//! never the whole discovery.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use super::protocol::MCPResource;

/// One provider-declared operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityDescriptor {
    /// Operation name, unique within a session
    pub name: String,
    /// Human readable description (empty when the provider gave none)
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameter_schema: Value,
}

impl CapabilityDescriptor {
    /// Names of the required parameters, as declared by the schema.
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameter_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// A descriptor that cannot be registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("descriptor #{index} has no usable name")]
    MissingName { index: usize },

    #[error("operation '{name}' has no object inputSchema")]
    MissingSchema { name: String },

    #[error("operation '{name}' has a non-string description")]
    InvalidDescription { name: String },

    #[error("operation '{name}' is declared more than once")]
    DuplicateName { name: String },
}

/// Validate one raw `tools/list` entry.
pub fn parse_descriptor(index: usize, raw: &Value) -> Result<CapabilityDescriptor, ConfigurationError> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or(ConfigurationError::MissingName { index })?;

    let parameter_schema = raw
        .get("inputSchema")
        .filter(|s| s.is_object())
        .cloned()
        .ok_or_else(|| ConfigurationError::MissingSchema { name: name.to_string() })?;

    let description = match raw.get("description") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(ConfigurationError::InvalidDescription { name: name.to_string() }),
    };

    Ok(CapabilityDescriptor { name: name.to_string(), description, parameter_schema })
}

/// Validate a full listing, logging and skipping every rejected entry.
///
/// Provider order is kept; for duplicate names the first declaration wins.
pub fn parse_descriptors(provider: &str, entries: &[Value]) -> Vec<CapabilityDescriptor> {
    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(entries.len());

    for (index, raw) in entries.iter().enumerate() {
        let result = parse_descriptor(index, raw).and_then(|descriptor| {
            if seen.contains(&descriptor.name) {
                Err(ConfigurationError::DuplicateName { name: descriptor.name })
            } else {
                Ok(descriptor)
            }
        });

        match result {
            Ok(descriptor) => {
                seen.insert(descriptor.name.clone());
                descriptors.push(descriptor);
            }
            Err(e) => {
                tracing::warn!(provider, error = %e, "Skipping malformed capability descriptor");
            }
        }
    }

    descriptors
}

/// Name-indexed, order-preserving cache of one provider's capabilities.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    descriptors: Vec<CapabilityDescriptor>,
    index: HashMap<String, usize>,
    resources: Vec<MCPResource>,
}

impl CapabilityRegistry {
    /// Build the registry in one step from a complete discovery.
    pub fn new(descriptors: Vec<CapabilityDescriptor>, resources: Vec<MCPResource>) -> Self {
        let mut kept = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if index.contains_key(&descriptor.name) {
                continue;
            }
            index.insert(descriptor.name.clone(), kept.len());
            kept.push(descriptor);
        }

        Self { descriptors: kept, index, resources }
    }

    /// Get a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Check if an operation is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors in provider order.
    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    /// Operation names in provider order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.name.as_str())
    }

    /// Named content advertised by the provider.
    pub fn resources(&self) -> &[MCPResource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Format descriptors for display.
pub fn format_capabilities(descriptors: &[CapabilityDescriptor]) -> String {
    let mut output = String::new();

    for descriptor in descriptors {
        output.push_str(&format!("  {}", descriptor.name));
        if !descriptor.description.is_empty() {
            output.push_str(&format!(" - {}", descriptor.description));
        }
        output.push('\n');

        let required = descriptor.required_parameters();
        if !required.is_empty() {
            output.push_str(&format!("    Required: {}\n", required.join(", ")));
        }
    }

    output
}

/// Format resources for display.
pub fn format_resources(resources: &[MCPResource]) -> String {
    let mut output = String::new();

    for resource in resources {
        output.push_str(&format!("  {} ({})", resource.uri, resource.name));
        if let Some(ref desc) = resource.description {
            output.push_str(&format!(" - {}", desc));
        }
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> Value {
        json!({
            "name": name,
            "description": format!("{} tool", name),
            "inputSchema": {"type": "object", "properties": {}}
        })
    }

    #[test]
    fn test_parse_descriptor() {
        let descriptor = parse_descriptor(0, &tool("search")).unwrap();
        assert_eq!(descriptor.name, "search");
        assert_eq!(descriptor.description, "search tool");
        assert_eq!(descriptor.parameter_schema["type"], "object");
    }

    #[test]
    fn test_missing_description_is_tolerated() {
        let raw = json!({"name": "bare", "inputSchema": {"type": "object"}});
        assert_eq!(parse_descriptor(0, &raw).unwrap().description, "");
    }

    #[test]
    fn test_malformed_descriptors() {
        let no_name = json!({"inputSchema": {"type": "object"}});
        assert_eq!(parse_descriptor(3, &no_name), Err(ConfigurationError::MissingName { index: 3 }));

        let empty_name = json!({"name": "", "inputSchema": {"type": "object"}});
        assert!(matches!(
            parse_descriptor(0, &empty_name),
            Err(ConfigurationError::MissingName { .. })
        ));

        let no_schema = json!({"name": "x"});
        assert!(matches!(
            parse_descriptor(0, &no_schema),
            Err(ConfigurationError::MissingSchema { .. })
        ));

        let bad_schema = json!({"name": "x", "inputSchema": "object"});
        assert!(matches!(
            parse_descriptor(0, &bad_schema),
            Err(ConfigurationError::MissingSchema { .. })
        ));

        let bad_description = json!({"name": "x", "description": 7, "inputSchema": {}});
        assert!(matches!(
            parse_descriptor(0, &bad_description),
            Err(ConfigurationError::InvalidDescription { .. })
        ));
    }

    #[test]
    fn test_one_bad_entry_among_five() {
        let entries = vec![
            tool("a"),
            tool("b"),
            json!({"description": "nameless", "inputSchema": {"type": "object"}}),
            tool("c"),
            tool("d"),
        ];
        let descriptors = parse_descriptors("test", &entries);
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let mut second = tool("a");
        second["description"] = json!("shadowed");
        let descriptors = parse_descriptors("test", &[tool("a"), second, tool("b")]);
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].description, "a tool");
    }

    #[test]
    fn test_registry_lookup_and_order() {
        let descriptors = parse_descriptors("test", &[tool("z"), tool("a"), tool("m")]);
        let registry = CapabilityRegistry::new(descriptors, Vec::new());

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert!(registry.contains("a"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.get("m").unwrap().name, "m");
    }

    #[test]
    fn test_format_capabilities() {
        let raw = json!({
            "name": "suggest",
            "description": "Suggest a template",
            "inputSchema": {"type": "object", "required": ["change_type"]}
        });
        let output = format_capabilities(&[parse_descriptor(0, &raw).unwrap()]);
        assert!(output.contains("suggest - Suggest a template"));
        assert!(output.contains("Required: change_type"));
    }
}
