// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Descriptor, content and status types for capability servers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator between server id and capability name in namespaced ids.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Build a namespaced id (`server:name`).
pub fn namespaced_id(server: &str, name: &str) -> String {
    format!("{}{}{}", server, NAMESPACE_SEPARATOR, name)
}

/// Split a namespaced id into `(server, name)` at the first separator.
///
/// Server ids never contain the separator, capability names may.
pub fn split_namespaced_id(id: &str) -> Option<(&str, &str)> {
    let (server, name) = id.split_once(NAMESPACE_SEPARATOR)?;
    if server.is_empty() || name.is_empty() {
        return None;
    }
    Some((server, name))
}

/// A tool discovered on a capability server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolInfo {
    /// Tool name as the server knows it.
    pub name: String,

    /// Namespaced id (`server:name`).
    pub id: String,

    pub description: Option<String>,

    /// JSON Schema for tool input.
    pub input_schema: Value,

    /// Owning server id.
    pub server: String,

    /// Whether the tool is read-only (safe to auto-approve).
    #[serde(default)]
    pub read_only: bool,

    /// Whether the tool is destructive (writes, deletes, sends).
    #[serde(default)]
    pub destructive: bool,

    /// Whether the tool is idempotent (safe to retry).
    #[serde(default)]
    pub idempotent: bool,
}

impl McpToolInfo {
    /// Parse a tool entry from a `tools/list` response.
    pub fn from_wire(server: &str, tool: &Value) -> Option<Self> {
        let name = tool.get("name")?.as_str()?.to_string();
        let hint = |key: &str| {
            tool.get("annotations")
                .and_then(|a| a.get(key))
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        };

        Some(Self {
            id: namespaced_id(server, &name),
            description: tool
                .get("description")
                .and_then(|d| d.as_str())
                .map(String::from),
            input_schema: tool
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({"type": "object"})),
            server: server.to_string(),
            read_only: hint("readOnlyHint"),
            destructive: hint("destructiveHint"),
            idempotent: hint("idempotentHint"),
            name,
        })
    }
}

/// An addressable content unit exposed by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,

    /// Namespaced id (`server:uri`).
    pub id: String,

    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub server: String,
}

impl ResourceDescriptor {
    /// Parse a resource entry from a `resources/list` response.
    pub fn from_wire(server: &str, resource: &Value) -> Option<Self> {
        let uri = resource.get("uri")?.as_str()?.to_string();
        let name = resource
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or(&uri)
            .to_string();

        Some(Self {
            id: namespaced_id(server, &uri),
            name,
            description: resource
                .get("description")
                .and_then(|d| d.as_str())
                .map(String::from),
            mime_type: resource
                .get("mimeType")
                .and_then(|m| m.as_str())
                .map(String::from),
            server: server.to_string(),
            uri,
        })
    }
}

/// A parameter of a prompt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// A parameterized prompt template exposed by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDescriptor {
    pub name: String,

    /// Namespaced id (`server:name`).
    pub id: String,

    pub description: Option<String>,
    pub arguments: Vec<PromptArgument>,
    pub server: String,
}

impl PromptDescriptor {
    /// Parse a prompt entry from a `prompts/list` response.
    pub fn from_wire(server: &str, prompt: &Value) -> Option<Self> {
        let name = prompt.get("name")?.as_str()?.to_string();
        let arguments = prompt
            .get("arguments")
            .and_then(|a| a.as_array())
            .map(|args| {
                args.iter()
                    .filter_map(|arg| {
                        Some(PromptArgument {
                            name: arg.get("name")?.as_str()?.to_string(),
                            description: arg
                                .get("description")
                                .and_then(|d| d.as_str())
                                .map(String::from),
                            required: arg
                                .get("required")
                                .and_then(|r| r.as_bool())
                                .unwrap_or(false),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id: namespaced_id(server, &name),
            description: prompt
                .get("description")
                .and_then(|d| d.as_str())
                .map(String::from),
            arguments,
            server: server.to_string(),
            name,
        })
    }
}

/// Content items that can be returned by capability servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    Text {
        text: String,
    },

    Image {
        /// Base64-encoded image data.
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    Resource {
        uri: String,
        #[serde(rename = "mimeType")]
        mime_type: Option<String>,
        text: Option<String>,
    },
}

impl McpContent {
    /// Parse one content item. Unknown item types are kept as raw JSON by the
    /// caller.
    pub fn from_wire(item: &Value) -> Option<Self> {
        match item.get("type")?.as_str()? {
            "text" => Some(Self::Text {
                text: item.get("text")?.as_str()?.to_string(),
            }),
            "image" => Some(Self::Image {
                data: item.get("data")?.as_str()?.to_string(),
                mime_type: item.get("mimeType")?.as_str()?.to_string(),
            }),
            "resource" => {
                let resource = item.get("resource")?;
                Some(Self::Resource {
                    uri: resource.get("uri")?.as_str()?.to_string(),
                    mime_type: resource
                        .get("mimeType")
                        .and_then(|m| m.as_str())
                        .map(String::from),
                    text: resource
                        .get("text")
                        .and_then(|t| t.as_str())
                        .map(String::from),
                })
            }
            _ => None,
        }
    }
}

/// Server capabilities advertised during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub resources: bool,
    #[serde(default)]
    pub prompts: bool,
}

impl ServerCapabilities {
    /// Read the `capabilities` object of an `initialize` result.
    ///
    /// Servers that send no capabilities object at all are assumed to offer
    /// everything; discovery then tolerates "method not found".
    pub fn from_wire(capabilities: Option<&Value>) -> Self {
        match capabilities {
            Some(caps) => Self {
                tools: caps.get("tools").is_some(),
                resources: caps.get("resources").is_some(),
                prompts: caps.get("prompts").is_some(),
            },
            None => Self {
                tools: true,
                resources: true,
                prompts: true,
            },
        }
    }
}

/// Server identity reported during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default)]
    pub protocol_version: Option<String>,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            version: "0.0.0".to_string(),
            capabilities: ServerCapabilities::default(),
            protocol_version: None,
        }
    }
}

/// Connection status of a server as seen by the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Connected,
    #[default]
    Disconnected,
    /// Disconnected after a failure; the last diagnostic is retained.
    Error,
    NotFound,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
            Self::NotFound => write!(f, "not_found"),
        }
    }
}

/// Normalized outcome of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub success: bool,

    /// Normalized payload: single value, list, or parsed structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub server: String,
    pub tool: String,
}

impl InvocationResult {
    /// Successful result.
    pub fn ok(server: impl Into<String>, tool: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            server: server.into(),
            tool: tool.into(),
        }
    }

    /// Failed result.
    pub fn failed(
        server: impl Into<String>,
        tool: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            server: server.into(),
            tool: tool.into(),
        }
    }
}
