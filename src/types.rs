// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core types shared with the agent execution engine.
//!
//! The agent engine sees every tool, built-in or externally discovered,
//! through [`ToolDefinition`]. Keeping this shape independent of the
//! capability-server protocol is what lets the engine call both kinds the
//! same way.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Tool Types
// ============================================================================

/// JSON Schema for tool input parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String, // Always "object"
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl InputSchema {
    /// Create a new input schema with object type.
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: None,
        }
    }

    /// Add a property to the schema.
    pub fn with_property(mut self, name: impl Into<String>, schema: serde_json::Value) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Mark properties as required.
    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = Some(required);
        self
    }

    /// Build an input schema from an arbitrary JSON Schema document.
    ///
    /// Only `properties` and `required` are carried over; anything else the
    /// remote schema declares is dropped.
    pub fn from_json_schema(schema: &serde_json::Value) -> Self {
        let mut input_schema = Self::new();

        if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
            for (key, value) in props {
                input_schema.properties.insert(key.clone(), value.clone());
            }
        }

        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            let required_fields: Vec<String> = required
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
            if !required_fields.is_empty() {
                input_schema.required = Some(required_fields);
            }
        }

        input_schema
    }
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Definition of a tool that can be called by the agent engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: InputSchema::new(),
        }
    }

    /// Set the input schema for this tool.
    pub fn with_schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = schema;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_schema_from_json_schema() {
        let schema = InputSchema::from_json_schema(&json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer" }
            },
            "required": ["query"],
            "additionalProperties": false
        }));

        assert_eq!(schema.schema_type, "object");
        assert_eq!(schema.properties.len(), 2);
        assert_eq!(schema.required, Some(vec!["query".to_string()]));
    }

    #[test]
    fn test_input_schema_from_empty_schema() {
        let schema = InputSchema::from_json_schema(&json!({}));
        assert!(schema.properties.is_empty());
        assert!(schema.required.is_none());
    }

    #[test]
    fn test_tool_definition_serialization() {
        let def = ToolDefinition::new("github:search_repositories", "Search repositories")
            .with_schema(InputSchema::new().with_property("query", json!({"type": "string"})));

        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["name"], "github:search_repositories");
        assert_eq!(value["input_schema"]["type"], "object");
        assert!(value["input_schema"].get("required").is_none());
    }
}
