// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of the integrations file, supporting JSON and YAML
//! formats.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;
use crate::mcp::{McpError, ServerConfig, ServerRegistry};

/// Contents of an integrations file.
///
/// ```json
/// {
///   "servers": [
///     {"id": "notion", "name": "Notion", "command": "npx",
///      "args": ["-y", "@notionhq/notion-mcp-server"],
///      "env": {"NOTION_API_TOKEN": "${NOTION_API_TOKEN}"}}
///   ],
///   "credentials": {"internal-kb": ["KB_TOKEN"]}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationsConfig {
    /// Server definitions. An entry whose id matches a built-in server
    /// replaces it.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    /// Extra credential requirements: server id to environment variable names.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub credentials: HashMap<String, Vec<String>>,

    /// Whether to seed the registry with the well-known servers (disabled).
    #[serde(default = "default_include_builtin")]
    pub include_builtin: bool,
}

fn default_include_builtin() -> bool {
    true
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            credentials: HashMap::new(),
            include_builtin: default_include_builtin(),
        }
    }
}

impl IntegrationsConfig {
    /// Check for duplicate ids and invalid server entries.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, server) in self.servers.iter().enumerate() {
            if !seen.insert(server.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("servers[{}].id", index),
                    message: format!("duplicate server id '{}'", server.id),
                });
            }
            server.validate().map_err(|e| ConfigError::InvalidValue {
                field: format!("servers[{}]", index),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Build a server registry from this configuration.
    pub fn into_registry(self) -> Result<ServerRegistry, McpError> {
        let mut registry = if self.include_builtin {
            ServerRegistry::with_builtin_servers()
        } else {
            ServerRegistry::with_builtin_requirements()
        };

        for server in self.servers {
            // Configured entries override the seeded ones
            registry.remove_server(&server.id);
            registry.add_server(server)?;
        }

        for (server, variables) in self.credentials {
            for variable in variables {
                registry.require_credential(server.clone(), variable);
            }
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::TransportKind;

    #[test]
    fn test_parse_full_config() {
        let config: IntegrationsConfig = serde_json::from_str(
            r#"{
                "servers": [
                    {"id": "kb", "name": "Knowledge Base", "transport": "sse",
                     "endpoint": "https://kb.example.com/sse",
                     "bearer_token": "${KB_TOKEN}", "category": "data"}
                ],
                "credentials": {"kb": ["KB_TOKEN"]},
                "includeBuiltin": false
            }"#,
        )
        .unwrap();

        assert!(!config.include_builtin);
        assert_eq!(config.servers[0].transport, TransportKind::Sse);
        assert!(config.validate().is_ok());

        let registry = config.into_registry().unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.required_credentials("kb"), ["KB_TOKEN".to_string()]);
        // Built-in requirements are always known
        assert!(!registry.required_credentials("github").is_empty());
    }

    #[test]
    fn test_configured_server_overrides_builtin() {
        let config: IntegrationsConfig = serde_json::from_str(
            r#"{"servers": [{"id": "github", "name": "GitHub", "command": "github-mcp", "enabled": true}]}"#,
        )
        .unwrap();

        let registry = config.into_registry().unwrap();
        let github = registry.get_server("github").unwrap();
        assert_eq!(github.command.as_deref(), Some("github-mcp"));
        assert!(github.enabled);
        // The other built-ins stay, disabled
        assert!(registry.get_server("notion").is_some_and(|s| !s.enabled));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let config: IntegrationsConfig = serde_json::from_str(
            r#"{"servers": [
                {"id": "a", "name": "A", "command": "a"},
                {"id": "a", "name": "A again", "command": "a"}
            ]}"#,
        )
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_invalid_server_rejected() {
        let config: IntegrationsConfig =
            serde_json::from_str(r#"{"servers": [{"id": "bad:id", "name": "Bad", "command": "x"}]}"#)
                .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
