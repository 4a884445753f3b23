// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Protocol client for one capability server.
//!
//! Wraps a [`Transport`] with the handshake and the typed discovery and
//! invocation calls.

use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};

use super::config::ServerConfig;
use super::error::McpError;
use super::transport::{ClosedSignal, Transport};
use super::types::{McpToolInfo, PromptDescriptor, ResourceDescriptor, ServerCapabilities, ServerInfo};

/// Protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on pages fetched from one paginated list call.
const MAX_LIST_PAGES: usize = 100;

/// An initialized session with a capability server.
pub struct McpClient {
    server: String,
    transport: Box<dyn Transport>,
    info: ServerInfo,
    startup_timeout: Duration,
    tool_timeout: Duration,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server", &self.server)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Perform the handshake over an established transport.
    ///
    /// The whole exchange is bounded by the server's startup timeout. On
    /// failure the transport is closed before returning.
    pub async fn initialize(
        config: &ServerConfig,
        transport: Box<dyn Transport>,
    ) -> Result<Self, McpError> {
        let startup_timeout = Duration::from_secs(config.startup_timeout_sec);

        let handshake = async {
            let result = transport
                .request(
                    "initialize",
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {},
                        "clientInfo": {
                            "name": "omnix-mcp",
                            "version": env!("CARGO_PKG_VERSION")
                        }
                    }),
                )
                .await?;
            transport
                .notify("notifications/initialized", Value::Null)
                .await?;
            Ok::<Value, McpError>(result)
        };

        let outcome = match tokio::time::timeout(startup_timeout, handshake).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(handshake_error(&config.id, e)),
            Err(_) => Err(McpError::ConnectionTimeout {
                server: config.id.clone(),
                timeout_secs: config.startup_timeout_sec,
            }),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                transport.close().await;
                return Err(e);
            }
        };

        let info = parse_server_info(&result);
        tracing::debug!(
            server = %config.id,
            name = %info.name,
            version = %info.version,
            "Handshake complete"
        );

        Ok(Self {
            server: config.id.clone(),
            transport,
            info,
            startup_timeout,
            tool_timeout: Duration::from_secs(config.tool_timeout_sec),
        })
    }

    /// Server id this client is connected to.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Identity and capabilities reported by the server.
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.info.capabilities
    }

    /// Termination signal of the underlying transport.
    pub fn closed(&self) -> ClosedSignal {
        self.transport.closed()
    }

    pub fn is_closed(&self) -> bool {
        self.transport.closed().borrow().is_some()
    }

    /// Fetch every tool, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let server = self.server.clone();
        self.list_paginated("tools/list", "tools", |item| {
            McpToolInfo::from_wire(&server, item)
        })
        .await
    }

    /// Fetch every resource. Fails with [`McpError::CapabilityUnsupported`]
    /// when the server did not advertise resources.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, McpError> {
        if !self.info.capabilities.resources {
            return Err(self.unsupported("resources"));
        }
        let server = self.server.clone();
        self.list_paginated("resources/list", "resources", |item| {
            ResourceDescriptor::from_wire(&server, item)
        })
        .await
    }

    /// Fetch every prompt. Fails with [`McpError::CapabilityUnsupported`]
    /// when the server did not advertise prompts.
    pub async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>, McpError> {
        if !self.info.capabilities.prompts {
            return Err(self.unsupported("prompts"));
        }
        let server = self.server.clone();
        self.list_paginated("prompts/list", "prompts", |item| {
            PromptDescriptor::from_wire(&server, item)
        })
        .await
    }

    /// Call a tool and return the raw `tools/call` result.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let call = self.transport.request(
            "tools/call",
            json!({"name": name, "arguments": arguments}),
        );

        match tokio::time::timeout(self.tool_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(McpError::ToolCallTimeout {
                tool: name.to_string(),
                timeout_secs: self.tool_timeout.as_secs(),
            }),
        }
    }

    /// Read a resource and return the raw `resources/read` result.
    pub async fn read_resource(&self, uri: &str) -> Result<Value, McpError> {
        self.bounded(
            self.tool_timeout,
            uri,
            self.transport.request("resources/read", json!({"uri": uri})),
        )
        .await
    }

    /// Render a prompt and return the raw `prompts/get` result.
    pub async fn get_prompt(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let params = if arguments.is_null() {
            json!({"name": name})
        } else {
            json!({"name": name, "arguments": arguments})
        };
        self.bounded(
            self.tool_timeout,
            name,
            self.transport.request("prompts/get", params),
        )
        .await
    }

    /// Close the transport.
    pub async fn close(&self) {
        self.transport.close().await;
    }

    async fn list_paginated<T>(
        &self,
        method: &str,
        key: &str,
        parse: impl Fn(&Value) -> Option<T>,
    ) -> Result<Vec<T>, McpError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(cursor) => json!({"cursor": cursor}),
                None => json!({}),
            };
            let page = self
                .bounded(self.startup_timeout, method, self.transport.request(method, params))
                .await?;

            let entries = page
                .get(key)
                .and_then(|v| v.as_array())
                .ok_or_else(|| {
                    McpError::InvalidResponse(format!("{} response missing '{}'", method, key))
                })?;

            for entry in entries {
                match parse(entry) {
                    Some(item) => items.push(item),
                    None => {
                        tracing::debug!(server = %self.server, method, "Skipping malformed entry");
                    }
                }
            }

            cursor = page
                .get("nextCursor")
                .and_then(|c| c.as_str())
                .filter(|c| !c.is_empty())
                .map(String::from);
            if cursor.is_none() {
                return Ok(items);
            }
        }

        tracing::warn!(server = %self.server, method, "Pagination limit reached; list truncated");
        Ok(items)
    }

    async fn bounded(
        &self,
        limit: Duration,
        what: &str,
        call: impl Future<Output = Result<Value, McpError>>,
    ) -> Result<Value, McpError> {
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(McpError::ToolCallTimeout {
                tool: what.to_string(),
                timeout_secs: limit.as_secs(),
            }),
        }
    }

    fn unsupported(&self, capability: &str) -> McpError {
        McpError::CapabilityUnsupported {
            server: self.server.clone(),
            capability: capability.to_string(),
        }
    }
}

fn parse_server_info(result: &Value) -> ServerInfo {
    let server_info = result.get("serverInfo");
    let field = |name: &str| {
        server_info
            .and_then(|info| info.get(name))
            .and_then(|v| v.as_str())
            .map(String::from)
    };

    let defaults = ServerInfo::default();
    ServerInfo {
        name: field("name").unwrap_or(defaults.name),
        version: field("version").unwrap_or(defaults.version),
        capabilities: ServerCapabilities::from_wire(result.get("capabilities")),
        protocol_version: result
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .map(String::from),
    }
}

/// Map a failure during the handshake to a handshake error.
fn handshake_error(server: &str, error: McpError) -> McpError {
    match error {
        McpError::ConnectionClosed { message, .. } => McpError::handshake_failed(
            server,
            format!(
                "{}\nThe server exited before completing the handshake. This usually means it \
                 failed to launch, is missing a dependency, or lacks permissions.",
                message
            ),
        ),
        McpError::Protocol { code, message } => McpError::handshake_failed(
            server,
            format!("initialize rejected (code {}): {}", code, message),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::MemoryServer;

    fn config() -> ServerConfig {
        ServerConfig::stdio("notes", "unused").with_timeouts(5, 5)
    }

    async fn client(server: MemoryServer) -> McpClient {
        McpClient::initialize(&config(), Box::new(server.into_transport()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_reads_server_info() {
        let client = client(MemoryServer::new("notes-server")).await;
        assert_eq!(client.info().name, "notes-server");
        assert_eq!(client.info().protocol_version.as_deref(), Some(PROTOCOL_VERSION));
        assert!(client.capabilities().tools);
        assert!(!client.capabilities().resources);
    }

    #[tokio::test]
    async fn test_list_tools_namespaces_ids() {
        let server = MemoryServer::new("notes")
            .text_tool("search", "Search notes", |_| Ok("[]".to_string()))
            .text_tool("read", "Read a note", |_| Ok("".to_string()));
        let client = client(server).await;

        let tools = client.list_tools().await.unwrap();
        let ids: Vec<_> = tools.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["notes:search", "notes:read"]);
    }

    #[tokio::test]
    async fn test_unadvertised_capabilities_are_unsupported() {
        let client = client(MemoryServer::new("notes")).await;
        assert!(client.list_resources().await.unwrap_err().is_unsupported());
        assert!(client.list_prompts().await.unwrap_err().is_unsupported());
    }

    #[tokio::test]
    async fn test_resources_and_prompts() {
        let server = MemoryServer::new("notes")
            .resource("note://1", "first", "hello")
            .prompt("summarize", "Summarize notes", "Summarize these notes");
        let client = client(server).await;

        let resources = client.list_resources().await.unwrap();
        assert_eq!(resources[0].id, "notes:note://1");

        let contents = client.read_resource("note://1").await.unwrap();
        assert_eq!(contents["contents"][0]["text"], "hello");

        let prompts = client.list_prompts().await.unwrap();
        assert_eq!(prompts[0].name, "summarize");
        let prompt = client.get_prompt("summarize", Value::Null).await.unwrap();
        assert!(prompt["messages"].is_array());
    }

    #[tokio::test]
    async fn test_handshake_on_closed_transport_fails() {
        let transport = MemoryServer::new("dead").into_transport();
        transport.kill_switch().kill("process exited (exit status: 1)");

        let err = McpClient::initialize(&config(), Box::new(transport))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::HandshakeFailed { .. }));
        let message = err.to_string();
        assert!(message.contains("exit status: 1"));
        assert!(message.contains("missing a dependency"));
    }

    #[test]
    fn test_parse_server_info_defaults() {
        let info = parse_server_info(&json!({}));
        assert_eq!(info.name, "unknown");
        assert!(info.capabilities.resources);
    }
}
