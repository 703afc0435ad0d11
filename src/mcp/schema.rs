//! Schema adapter.
//!
//! Turns provider capability descriptors into the function declarations
//! reasoning engines accept for function calling. The mapping is one to one:
//! no renaming, no filtering.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::{CapabilityDescriptor, CapabilityRegistry};

/// `{"type": "function", "function": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

/// Name, description and parameter schema of one declared function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl FunctionDeclaration {
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

impl From<&CapabilityDescriptor> for FunctionDeclaration {
    fn from(descriptor: &CapabilityDescriptor) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionSpec {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                parameters: descriptor.parameter_schema.clone(),
            },
        }
    }
}

/// Adapt every descriptor, keeping registry order.
pub fn adapt(descriptors: &[CapabilityDescriptor]) -> Vec<FunctionDeclaration> {
    descriptors.iter().map(FunctionDeclaration::from).collect()
}

/// Adapt a whole registry.
pub fn adapt_registry(registry: &CapabilityRegistry) -> Vec<FunctionDeclaration> {
    adapt(registry.descriptors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::parse_descriptors;
    use serde_json::json;

    #[test]
    fn test_declaration_shape() {
        let descriptors = parse_descriptors(
            "test",
            &[json!({
                "name": "search_guidelines",
                "description": "Search guideline documents",
                "inputSchema": {
                    "type": "object",
                    "properties": {"keyword": {"type": "string"}},
                    "required": ["keyword"]
                }
            })],
        );

        let declarations = adapt(&descriptors);
        assert_eq!(
            serde_json::to_value(&declarations[0]).unwrap(),
            json!({
                "type": "function",
                "function": {
                    "name": "search_guidelines",
                    "description": "Search guideline documents",
                    "parameters": {
                        "type": "object",
                        "properties": {"keyword": {"type": "string"}},
                        "required": ["keyword"]
                    }
                }
            })
        );
    }

    #[test]
    fn test_names_match_registry() {
        let raw: Vec<_> = ["c", "a", "b"]
            .iter()
            .map(|n| json!({"name": n, "inputSchema": {"type": "object"}}))
            .collect();
        let registry = CapabilityRegistry::new(parse_descriptors("test", &raw), Vec::new());

        let adapted: Vec<String> =
            adapt_registry(&registry).iter().map(|d| d.name().to_string()).collect();
        let registered: Vec<String> = registry.names().map(str::to_string).collect();
        assert_eq!(adapted, registered);
    }
}
