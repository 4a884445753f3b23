// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process capability servers.
//!
//! A [`MemoryServer`] answers the same JSON-RPC methods a real server does,
//! backed by Rust closures. [`MemoryConnector`] hands them out by server id,
//! which lets the connection layer be driven without spawning processes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

use super::{mark_closed, ClosedSignal, Connector, Transport};
use crate::mcp::config::{ServerConfig, TransportKind};
use crate::mcp::error::{McpError, METHOD_NOT_FOUND};

/// Handler for an in-process tool. Returns the `tools/call` result body.
pub type MemoryToolFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

const INVALID_PARAMS: i32 = -32602;

#[derive(Clone)]
struct MemoryTool {
    definition: Value,
    handler: MemoryToolFn,
}

/// Definition of an in-process server.
#[derive(Clone, Default)]
pub struct MemoryServer {
    name: String,
    tools: Vec<MemoryTool>,
    resources: Vec<(Value, Value)>,
    prompts: Vec<(Value, Value)>,
    serve_resources: bool,
    serve_prompts: bool,
}

impl MemoryServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a tool whose handler builds the full result body.
    pub fn tool(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: impl Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.tools.push(MemoryTool {
            definition: json!({
                "name": name.into(),
                "description": description.into(),
                "inputSchema": input_schema,
            }),
            handler: Arc::new(handler),
        });
        self
    }

    /// Add a tool that replies with a single text item. A handler error
    /// becomes an `isError` result.
    pub fn text_tool(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl Fn(Value) -> Result<String, String> + Send + Sync + 'static,
    ) -> Self {
        self.tool(
            name,
            description,
            json!({"type": "object", "properties": {}}),
            move |args| {
                Ok(match handler(args) {
                    Ok(text) => json!({"content": [{"type": "text", "text": text}]}),
                    Err(text) => {
                        json!({"isError": true, "content": [{"type": "text", "text": text}]})
                    }
                })
            },
        )
    }

    /// Serve a text resource. Enables the resources capability.
    pub fn resource(mut self, uri: impl Into<String>, name: impl Into<String>, text: impl Into<String>) -> Self {
        let uri = uri.into();
        self.serve_resources = true;
        self.resources.push((
            json!({"uri": uri, "name": name.into(), "mimeType": "text/plain"}),
            json!({"contents": [{"uri": uri, "mimeType": "text/plain", "text": text.into()}]}),
        ));
        self
    }

    /// Serve a prompt with a fixed message. Enables the prompts capability.
    pub fn prompt(mut self, name: impl Into<String>, description: impl Into<String>, text: impl Into<String>) -> Self {
        self.serve_prompts = true;
        self.prompts.push((
            json!({"name": name.into(), "description": description.into(), "arguments": []}),
            json!({"messages": [{"role": "user", "content": {"type": "text", "text": text.into()}}]}),
        ));
        self
    }

    /// Open a transport to this server.
    pub fn into_transport(self) -> MemoryTransport {
        MemoryTransport::new(Arc::new(self))
    }

    fn handle(&self, method: &str, params: Value) -> Result<Value, McpError> {
        match method {
            "initialize" => {
                let mut capabilities = json!({"tools": {}});
                if self.serve_resources {
                    capabilities["resources"] = json!({});
                }
                if self.serve_prompts {
                    capabilities["prompts"] = json!({});
                }
                Ok(json!({
                    "protocolVersion": "2024-11-05",
                    "serverInfo": {"name": self.name, "version": env!("CARGO_PKG_VERSION")},
                    "capabilities": capabilities,
                }))
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({
                "tools": self.tools.iter().map(|t| t.definition.clone()).collect::<Vec<_>>()
            })),
            "tools/call" => {
                let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
                let tool = self
                    .tools
                    .iter()
                    .find(|t| t.definition["name"] == name)
                    .ok_or_else(|| McpError::protocol(INVALID_PARAMS, format!("Unknown tool: {}", name)))?;
                let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                (tool.handler)(arguments).map_err(|message| McpError::protocol(-32603, message))
            }
            "resources/list" if self.serve_resources => Ok(json!({
                "resources": self.resources.iter().map(|(d, _)| d.clone()).collect::<Vec<_>>()
            })),
            "resources/read" if self.serve_resources => {
                let uri = params.get("uri").and_then(|u| u.as_str()).unwrap_or("");
                self.resources
                    .iter()
                    .find(|(d, _)| d["uri"] == uri)
                    .map(|(_, contents)| contents.clone())
                    .ok_or_else(|| McpError::protocol(INVALID_PARAMS, format!("Unknown resource: {}", uri)))
            }
            "prompts/list" if self.serve_prompts => Ok(json!({
                "prompts": self.prompts.iter().map(|(d, _)| d.clone()).collect::<Vec<_>>()
            })),
            "prompts/get" if self.serve_prompts => {
                let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
                self.prompts
                    .iter()
                    .find(|(d, _)| d["name"] == name)
                    .map(|(_, body)| body.clone())
                    .ok_or_else(|| McpError::protocol(INVALID_PARAMS, format!("Unknown prompt: {}", name)))
            }
            other => Err(McpError::protocol(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        }
    }
}

/// Transport to a [`MemoryServer`].
pub struct MemoryTransport {
    server: Arc<MemoryServer>,
    closed_tx: Arc<watch::Sender<Option<String>>>,
    closed_rx: watch::Receiver<Option<String>>,
}

impl MemoryTransport {
    fn new(server: Arc<MemoryServer>) -> Self {
        let (closed_tx, closed_rx) = watch::channel(None);
        Self {
            server,
            closed_tx: Arc::new(closed_tx),
            closed_rx,
        }
    }

    /// Handle that can terminate this transport from outside.
    pub fn kill_switch(&self) -> KillSwitch {
        KillSwitch(Arc::clone(&self.closed_tx))
    }

    fn is_closed(&self) -> bool {
        self.closed_rx.borrow().is_some()
    }

    fn closed_error(&self) -> McpError {
        McpError::closed(
            self.server.name.clone(),
            self.closed_rx
                .borrow()
                .clone()
                .unwrap_or_else(|| "connection closed".to_string()),
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        self.server.handle(method, params)
    }

    async fn notify(&self, _method: &str, _params: Value) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn closed(&self) -> ClosedSignal {
        self.closed_rx.clone()
    }

    async fn close(&self) {
        mark_closed(&self.closed_tx, "connection closed by client");
    }
}

/// Terminates a [`MemoryTransport`] as if the server died.
#[derive(Clone)]
pub struct KillSwitch(Arc<watch::Sender<Option<String>>>);

impl KillSwitch {
    pub fn kill(&self, reason: impl Into<String>) {
        mark_closed(&self.0, reason);
    }
}

/// Connector serving [`MemoryServer`]s by server id.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    servers: Arc<Mutex<HashMap<String, MemoryServer>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    live: Arc<Mutex<HashMap<String, KillSwitch>>>,
    attempts: Arc<Mutex<HashMap<String, usize>>>,
    total_attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `server` under `id`.
    pub fn with_server(self, id: impl Into<String>, server: MemoryServer) -> Self {
        lock(&self.servers).insert(id.into(), server);
        self
    }

    /// Make connects to `id` fail (or succeed again).
    pub fn set_failing(&self, id: &str, failing: bool) {
        let mut set = lock(&self.failing);
        if failing {
            set.insert(id.to_string());
        } else {
            set.remove(id);
        }
    }

    /// Terminate the most recent transport for `id`.
    pub fn kill(&self, id: &str, reason: &str) -> bool {
        match lock(&self.live).get(id) {
            Some(switch) => {
                switch.kill(reason);
                true
            }
            None => false,
        }
    }

    /// Connect attempts made for `id`.
    pub fn attempts(&self, id: &str) -> usize {
        lock(&self.attempts).get(id).copied().unwrap_or(0)
    }

    /// Connect attempts across all servers.
    pub fn total_attempts(&self) -> usize {
        self.total_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Box<dyn Transport>, McpError> {
        *lock(&self.attempts).entry(config.id.clone()).or_insert(0) += 1;
        self.total_attempts.fetch_add(1, Ordering::SeqCst);

        if lock(&self.failing).contains(&config.id) {
            return Err(McpError::launch_failed(&config.id, "server unavailable"));
        }

        let server = lock(&self.servers)
            .get(&config.id)
            .cloned()
            .ok_or_else(|| McpError::launch_failed(&config.id, "no in-process server registered"))?;

        let transport = server.into_transport();
        lock(&self.live).insert(config.id.clone(), transport.kill_switch());
        Ok(Box::new(transport))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> MemoryServer {
        MemoryServer::new("notes")
            .text_tool("echo", "Echo the input", |args| Ok(args.to_string()))
            .resource("note://1", "first", "hello")
    }

    #[tokio::test]
    async fn test_initialize_advertises_served_capabilities() {
        let transport = server().into_transport();
        let result = transport.request("initialize", json!({})).await.unwrap();
        assert!(result["capabilities"].get("resources").is_some());
        assert!(result["capabilities"].get("prompts").is_none());
    }

    #[tokio::test]
    async fn test_unserved_capability_is_method_not_found() {
        let transport = server().into_transport();
        let err = transport.request("prompts/list", Value::Null).await.unwrap_err();
        assert!(err.is_unsupported());
    }

    #[tokio::test]
    async fn test_tool_call() {
        let transport = server().into_transport();
        let result = transport
            .request("tools/call", json!({"name": "echo", "arguments": {"a": 1}}))
            .await
            .unwrap();
        assert_eq!(result["content"][0]["text"], "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_kill_switch_closes_transport() {
        let transport = server().into_transport();
        transport.kill_switch().kill("crashed");
        assert_eq!(transport.closed().borrow().as_deref(), Some("crashed"));
        let err = transport.request("ping", Value::Null).await.unwrap_err();
        assert!(matches!(err, McpError::ConnectionClosed { .. }));
    }

    #[tokio::test]
    async fn test_connector_counts_and_fails() {
        let connector = MemoryConnector::new().with_server("notes", server());
        let config = ServerConfig::stdio("notes", "unused");

        assert!(connector.connect(&config).await.is_ok());
        connector.set_failing("notes", true);
        assert!(connector.connect(&config).await.is_err());
        assert_eq!(connector.attempts("notes"), 2);

        let missing = ServerConfig::stdio("other", "unused");
        assert!(connector.connect(&missing).await.is_err());
        assert_eq!(connector.total_attempts(), 3);
    }
}
