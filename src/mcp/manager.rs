// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Connection lifecycle for capability servers.
//!
//! The [`ConnectionManager`] owns at most one live connection per server id,
//! keeps the aggregated tool/resource/prompt maps in step with those
//! connections, and reconnects once, transparently, when a call finds the
//! server disconnected.
//!
//! Each connection gets a watcher task holding a weak reference back to the
//! manager state. When the transport terminates on its own, the watcher
//! removes the connection and its descriptors and records the reason.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::client::McpClient;
use super::config::ServerConfig;
use super::error::McpError;
use super::normalize::{normalize_resource_contents, normalize_tool_result};
use super::registry::ServerRegistry;
use super::transport::{Connector, DefaultConnector};
use super::types::{
    split_namespaced_id, McpToolInfo, PromptDescriptor, ResourceDescriptor, ServerInfo,
    ServerStatus,
};

#[cfg(feature = "telemetry")]
use crate::telemetry::GLOBAL_METRICS;

/// Registry shared between the manager and its owner.
pub type SharedRegistry = Arc<RwLock<ServerRegistry>>;

/// A live, initialized session with one server.
#[derive(Debug)]
pub struct Connection {
    server_id: String,
    client: McpClient,
    tools: Vec<McpToolInfo>,
    resources: Vec<ResourceDescriptor>,
    prompts: Vec<PromptDescriptor>,
    connected_at: DateTime<Utc>,
    generation: u64,
}

impl Connection {
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn server_info(&self) -> &ServerInfo {
        self.client.info()
    }

    pub fn tools(&self) -> &[McpToolInfo] {
        &self.tools
    }

    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    pub fn prompts(&self) -> &[PromptDescriptor] {
        &self.prompts
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }
}

/// Connections plus the descriptors they contributed, updated together.
#[derive(Default)]
struct Inner {
    connections: HashMap<String, Arc<Connection>>,
    tools: HashMap<String, McpToolInfo>,
    resources: HashMap<String, ResourceDescriptor>,
    prompts: HashMap<String, PromptDescriptor>,
    last_errors: HashMap<String, String>,
}

impl Inner {
    fn insert(&mut self, connection: Arc<Connection>) {
        for tool in &connection.tools {
            self.tools.insert(tool.id.clone(), tool.clone());
        }
        for resource in &connection.resources {
            self.resources.insert(resource.id.clone(), resource.clone());
        }
        for prompt in &connection.prompts {
            self.prompts.insert(prompt.id.clone(), prompt.clone());
        }
        self.last_errors.remove(&connection.server_id);
        self.connections
            .insert(connection.server_id.clone(), connection);
    }

    fn remove(&mut self, server_id: &str) -> Option<Arc<Connection>> {
        let connection = self.connections.remove(server_id)?;
        self.tools.retain(|_, t| t.server != server_id);
        self.resources.retain(|_, r| r.server != server_id);
        self.prompts.retain(|_, p| p.server != server_id);
        Some(connection)
    }
}

struct ManagerState {
    registry: SharedRegistry,
    connector: Arc<dyn Connector>,
    inner: RwLock<Inner>,
    connect_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    generation: AtomicU64,
}

/// Owns live connections to capability servers.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectionManager {
    state: Arc<ManagerState>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager").finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager that builds transports with `connector`.
    pub fn new(registry: SharedRegistry, connector: Arc<dyn Connector>) -> Self {
        Self {
            state: Arc::new(ManagerState {
                registry,
                connector,
                inner: RwLock::new(Inner::default()),
                connect_locks: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(1),
            }),
        }
    }

    /// Create a manager that spawns processes and opens event streams.
    pub fn with_default_connector(registry: SharedRegistry) -> Self {
        Self::new(registry, Arc::new(DefaultConnector))
    }

    /// The registry this manager resolves server ids against.
    pub fn registry(&self) -> &SharedRegistry {
        &self.state.registry
    }

    /// Connect to a server. No-op when already connected.
    #[instrument(skip(self))]
    pub async fn connect(&self, server_id: &str) -> Result<(), McpError> {
        if self.live_connection(server_id).await.is_some() {
            return Ok(());
        }
        if !self.state.registry.read().await.contains(server_id) {
            return Err(McpError::ServerNotFound(server_id.to_string()));
        }

        let lock = self.connect_lock(server_id).await;
        let _serialized = lock.lock().await;

        // Another caller may have connected while we waited
        if self.live_connection(server_id).await.is_some() {
            return Ok(());
        }

        let config = self
            .state
            .registry
            .read()
            .await
            .get_server(server_id)
            .cloned()
            .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;

        let start = Instant::now();
        match self.establish(&config).await {
            Ok(connection) => {
                let connection = Arc::new(connection);
                info!(
                    server = %server_id,
                    tools = connection.tools.len(),
                    resources = connection.resources.len(),
                    prompts = connection.prompts.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Connected to capability server"
                );

                self.state.inner.write().await.insert(Arc::clone(&connection));
                self.watch(&connection);

                #[cfg(feature = "telemetry")]
                {
                    GLOBAL_METRICS.record_connect();
                    GLOBAL_METRICS.record_operation("connect", start.elapsed());
                }
                Ok(())
            }
            Err(e) => {
                warn!(server = %server_id, error = %e, "Failed to connect");
                self.state
                    .inner
                    .write()
                    .await
                    .last_errors
                    .insert(server_id.to_string(), e.to_string());
                Err(e)
            }
        }
    }

    async fn establish(&self, config: &ServerConfig) -> Result<Connection, McpError> {
        config.validate()?;

        let transport = self.state.connector.connect(config).await?;
        let client = McpClient::initialize(config, transport).await?;

        let (tools, resources, prompts) = tokio::join!(
            client.list_tools(),
            client.list_resources(),
            client.list_prompts()
        );

        let tools = match tools {
            Ok(tools) => tools,
            Err(e) => {
                client.close().await;
                return Err(e);
            }
        };
        let tools = tools
            .into_iter()
            .filter(|t| config.is_tool_enabled(&t.name))
            .collect();

        Ok(Connection {
            server_id: config.id.clone(),
            tools,
            resources: optional_listing(&config.id, "resources", resources),
            prompts: optional_listing(&config.id, "prompts", prompts),
            client,
            connected_at: Utc::now(),
            generation: self.state.generation.fetch_add(1, Ordering::SeqCst),
        })
    }

    /// Spawn the task that notices unexpected transport termination.
    fn watch(&self, connection: &Arc<Connection>) {
        let state: Weak<ManagerState> = Arc::downgrade(&self.state);
        let mut closed = connection.client.closed();
        let server_id = connection.server_id.clone();
        let generation = connection.generation;

        tokio::spawn(async move {
            while closed.borrow().is_none() {
                if closed.changed().await.is_err() {
                    break;
                }
            }
            let reason = closed
                .borrow()
                .clone()
                .unwrap_or_else(|| "transport dropped".to_string());

            if let Some(state) = state.upgrade() {
                ConnectionManager { state }
                    .handle_transport_closed(&server_id, generation, reason)
                    .await;
            }
        });
    }

    async fn handle_transport_closed(&self, server_id: &str, generation: u64, reason: String) {
        let mut inner = self.state.inner.write().await;
        let current = inner
            .connections
            .get(server_id)
            .is_some_and(|c| c.generation == generation);
        if !current {
            // Explicit disconnect or already replaced
            return;
        }

        inner.remove(server_id);
        inner.last_errors.insert(server_id.to_string(), reason.clone());
        drop(inner);

        warn!(server = %server_id, reason = %reason, "Capability server connection lost");
        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_disconnect();
    }

    /// A connection whose transport is still alive. A dead one found here
    /// is dropped on the spot.
    async fn live_connection(&self, server_id: &str) -> Option<Arc<Connection>> {
        let connection = self
            .state
            .inner
            .read()
            .await
            .connections
            .get(server_id)
            .cloned()?;

        if !connection.client.is_closed() {
            return Some(connection);
        }

        let reason = connection
            .client
            .closed()
            .borrow()
            .clone()
            .unwrap_or_else(|| "connection closed".to_string());
        self.handle_transport_closed(server_id, connection.generation, reason)
            .await;
        None
    }

    async fn connect_lock(&self, server_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.state.connect_locks.lock().await;
        Arc::clone(
            locks
                .entry(server_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Drop the connect lock of a server nobody is connecting to.
    async fn prune_connect_lock(&self, server_id: &str) {
        let mut locks = self.state.connect_locks.lock().await;
        // Only the map holds it: no connect is running or waiting
        if locks.get(server_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(server_id);
        }
    }

    #[cfg(test)]
    async fn connect_lock_count(&self) -> usize {
        self.state.connect_locks.lock().await.len()
    }

    /// Live connection, reconnecting once if there is none.
    async fn ensure_connected(&self, server_id: &str) -> Result<Arc<Connection>, McpError> {
        if let Some(connection) = self.live_connection(server_id).await {
            return Ok(connection);
        }

        {
            let registry = self.state.registry.read().await;
            let config = registry
                .get_server(server_id)
                .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;
            if !config.enabled {
                return Err(McpError::NotConnected {
                    server: server_id.to_string(),
                    message: "server is disabled".to_string(),
                });
            }
            // Same gate as enabling: no transport without credentials
            registry.validate_credentials(server_id)?;
        }

        info!(server = %server_id, "Not connected; attempting reconnect");
        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_reconnect_attempt();

        self.connect(server_id)
            .await
            .map_err(|e| McpError::NotConnected {
                server: server_id.to_string(),
                message: format!("reconnect failed: {}", e),
            })?;

        self.live_connection(server_id)
            .await
            .ok_or_else(|| McpError::NotConnected {
                server: server_id.to_string(),
                message: "connection lost immediately after reconnect".to_string(),
            })
    }

    /// Invoke a tool on a server and return its normalized result.
    #[instrument(skip(self, arguments))]
    pub async fn invoke(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<Value, McpError> {
        let arguments = match arguments {
            Value::Null => json!({}),
            Value::Object(_) => arguments,
            other => {
                return Err(McpError::InvalidArguments {
                    tool: tool_name.to_string(),
                    message: format!("arguments must be a JSON object, got {}", json_kind(&other)),
                })
            }
        };

        let connection = self.ensure_connected(server_id).await?;
        if !connection.has_tool(tool_name) {
            return Err(McpError::UnknownTool {
                server: server_id.to_string(),
                tool: tool_name.to_string(),
            });
        }

        let start = Instant::now();
        let outcome = match connection.client.call_tool(tool_name, arguments).await {
            Ok(raw) => normalize_tool_result(tool_name, &raw),
            Err(e) => {
                self.drop_if_broken(&connection, &e).await;
                Err(e)
            }
        };

        debug!(
            server = %server_id,
            tool = %tool_name,
            success = outcome.is_ok(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool invocation finished"
        );
        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_tool(
            &crate::mcp::types::namespaced_id(server_id, tool_name),
            start.elapsed(),
            outcome.is_ok(),
        );

        outcome
    }

    /// Invoke a tool by its namespaced id (`server:tool`).
    pub async fn invoke_namespaced(
        &self,
        namespaced_id: &str,
        arguments: Value,
    ) -> Result<Value, McpError> {
        let (server_id, tool_name) = split_namespaced_id(namespaced_id).ok_or_else(|| {
            McpError::UnknownTool {
                server: String::new(),
                tool: namespaced_id.to_string(),
            }
        })?;
        self.invoke(server_id, tool_name, arguments).await
    }

    /// Read a resource and return its normalized contents.
    #[instrument(skip(self))]
    pub async fn read_resource(&self, server_id: &str, uri: &str) -> Result<Value, McpError> {
        let connection = self.ensure_connected(server_id).await?;
        match connection.client.read_resource(uri).await {
            Ok(raw) => Ok(normalize_resource_contents(&raw)),
            Err(e) => {
                self.drop_if_broken(&connection, &e).await;
                Err(e)
            }
        }
    }

    /// Render a prompt and return its messages.
    #[instrument(skip(self, arguments))]
    pub async fn get_prompt(
        &self,
        server_id: &str,
        name: &str,
        arguments: Value,
    ) -> Result<Value, McpError> {
        if !(arguments.is_null() || arguments.is_object()) {
            return Err(McpError::InvalidArguments {
                tool: name.to_string(),
                message: format!("arguments must be a JSON object, got {}", json_kind(&arguments)),
            });
        }

        let connection = self.ensure_connected(server_id).await?;
        match connection.client.get_prompt(name, arguments).await {
            Ok(raw) => Ok(raw.get("messages").cloned().unwrap_or(raw)),
            Err(e) => {
                self.drop_if_broken(&connection, &e).await;
                Err(e)
            }
        }
    }

    /// A transport-level failure drops the connection; the next call
    /// reconnects.
    async fn drop_if_broken(&self, connection: &Arc<Connection>, error: &McpError) {
        if !matches!(error, McpError::ConnectionClosed { .. }) {
            return;
        }
        let removed = {
            let mut inner = self.state.inner.write().await;
            let current = inner
                .connections
                .get(&connection.server_id)
                .is_some_and(|c| c.generation == connection.generation);
            if current {
                inner.remove(&connection.server_id);
                inner
                    .last_errors
                    .insert(connection.server_id.clone(), error.to_string());
            }
            current
        };
        if removed {
            connection.client.close().await;
            #[cfg(feature = "telemetry")]
            GLOBAL_METRICS.record_disconnect();
        }
    }

    /// Close a server's connection and drop its descriptors. No-op when not
    /// connected.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, server_id: &str) {
        let removed = {
            let mut inner = self.state.inner.write().await;
            inner.last_errors.remove(server_id);
            inner.remove(server_id)
        };

        if let Some(connection) = removed {
            connection.client.close().await;
            info!(server = %server_id, "Disconnected from capability server");
            #[cfg(feature = "telemetry")]
            GLOBAL_METRICS.record_disconnect();
        }
        self.prune_connect_lock(server_id).await;
    }

    /// Disconnect every server.
    pub async fn cleanup(&self) {
        let ids = self.connected_servers().await;
        let mut tasks = JoinSet::new();
        for id in ids {
            let manager = self.clone();
            tasks.spawn(async move { manager.disconnect(&id).await });
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Disconnect task failed");
            }
        }
    }

    /// Ids of servers with a live connection, sorted.
    pub async fn connected_servers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state
            .inner
            .read()
            .await
            .connections
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub async fn is_connected(&self, server_id: &str) -> bool {
        self.live_connection(server_id).await.is_some()
    }

    /// The live connection for a server, if any.
    pub async fn connection(&self, server_id: &str) -> Option<Arc<Connection>> {
        self.live_connection(server_id).await
    }

    /// Last failure recorded for a server.
    pub async fn last_error(&self, server_id: &str) -> Option<String> {
        self.state
            .inner
            .read()
            .await
            .last_errors
            .get(server_id)
            .cloned()
    }

    /// Connection status of a server.
    pub async fn status(&self, server_id: &str) -> ServerStatus {
        if !self.state.registry.read().await.contains(server_id) {
            return ServerStatus::NotFound;
        }
        let inner = self.state.inner.read().await;
        if inner.connections.contains_key(server_id) {
            ServerStatus::Connected
        } else if inner.last_errors.contains_key(server_id) {
            ServerStatus::Error
        } else {
            ServerStatus::Disconnected
        }
    }

    pub(crate) async fn tools(&self) -> Vec<McpToolInfo> {
        self.state.inner.read().await.tools.values().cloned().collect()
    }

    pub(crate) async fn resources(&self) -> Vec<ResourceDescriptor> {
        self.state
            .inner
            .read()
            .await
            .resources
            .values()
            .cloned()
            .collect()
    }

    pub(crate) async fn prompts(&self) -> Vec<PromptDescriptor> {
        self.state
            .inner
            .read()
            .await
            .prompts
            .values()
            .cloned()
            .collect()
    }

    pub(crate) async fn tool(&self, namespaced_id: &str) -> Option<McpToolInfo> {
        self.state
            .inner
            .read()
            .await
            .tools
            .get(namespaced_id)
            .cloned()
    }
}

/// Resources and prompts are optional: an unsupported capability yields an
/// empty set, and other failures are logged rather than failing the connect.
fn optional_listing<T>(server: &str, capability: &str, listing: Result<Vec<T>, McpError>) -> Vec<T> {
    match listing {
        Ok(items) => items,
        Err(e) if e.is_unsupported() => Vec::new(),
        Err(e) => {
            warn!(server = %server, capability, error = %e, "Discovery failed; continuing without it");
            Vec::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::{MemoryConnector, MemoryServer, MockConnector};
    use std::time::Duration;

    fn notes_server() -> MemoryServer {
        MemoryServer::new("notes")
            .text_tool("search", "Search notes", |args| {
                Ok(format!(
                    "{{\"query\": {}, \"hits\": 2}}",
                    args.get("query").cloned().unwrap_or(Value::Null)
                ))
            })
            .text_tool("fail", "Always fails", |_| Err("backend unavailable".to_string()))
            .resource("note://1", "first", "hello")
    }

    fn manager_with(connector: MemoryConnector, configs: Vec<ServerConfig>) -> ConnectionManager {
        let mut registry = ServerRegistry::new();
        for config in configs {
            registry.add_server(config).unwrap();
        }
        ConnectionManager::new(Arc::new(RwLock::new(registry)), Arc::new(connector))
    }

    fn notes_manager() -> (ConnectionManager, MemoryConnector) {
        let connector = MemoryConnector::new().with_server("notes", notes_server());
        let manager = manager_with(
            connector.clone(),
            vec![ServerConfig::stdio("notes", "notes-server")],
        );
        (manager, connector)
    }

    async fn wait_until_disconnected(manager: &ConnectionManager, id: &str) {
        for _ in 0..100 {
            if manager.connected_servers().await.iter().all(|s| s != id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never disconnected", id);
    }

    #[tokio::test]
    async fn test_connect_populates_catalog() {
        let (manager, _) = notes_manager();
        manager.connect("notes").await.unwrap();

        assert_eq!(manager.status("notes").await, ServerStatus::Connected);
        let mut ids: Vec<_> = manager.tools().await.into_iter().map(|t| t.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["notes:fail", "notes:search"]);
        assert_eq!(manager.resources().await.len(), 1);
        assert!(manager.prompts().await.is_empty());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (manager, connector) = notes_manager();
        manager.connect("notes").await.unwrap();
        manager.connect("notes").await.unwrap();
        assert_eq!(connector.attempts("notes"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_connects_make_one_connection() {
        let (manager, connector) = notes_manager();
        let (a, b) = tokio::join!(manager.connect("notes"), manager.connect("notes"));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(connector.attempts("notes"), 1);
        assert_eq!(manager.connected_servers().await, vec!["notes"]);
    }

    #[tokio::test]
    async fn test_connect_unknown_server() {
        let (manager, _) = notes_manager();
        let err = manager.connect("missing").await.unwrap_err();
        assert!(matches!(err, McpError::ServerNotFound(_)));
        assert_eq!(manager.status("missing").await, ServerStatus::NotFound);
    }

    #[tokio::test]
    async fn test_failed_connect_records_error() {
        let (manager, connector) = notes_manager();
        connector.set_failing("notes", true);

        let err = manager.connect("notes").await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(manager.status("notes").await, ServerStatus::Error);
        assert!(manager.last_error("notes").await.is_some());
        assert!(manager.tools().await.is_empty());
    }

    #[tokio::test]
    async fn test_invoke_normalizes_json_text() {
        let (manager, _) = notes_manager();
        manager.connect("notes").await.unwrap();

        let result = manager
            .invoke("notes", "search", json!({"query": "rust"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"query": "rust", "hits": 2}));
    }

    #[tokio::test]
    async fn test_invoke_errors() {
        let (manager, _) = notes_manager();
        manager.connect("notes").await.unwrap();

        let err = manager.invoke("notes", "nope", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));

        let err = manager.invoke("notes", "search", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments { .. }));

        let err = manager.invoke("notes", "fail", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Remote { .. }));
        assert!(err.to_string().contains("backend unavailable"));

        // Invocation errors leave the connection alone
        assert!(manager.is_connected("notes").await);
    }

    #[tokio::test]
    async fn test_invoke_reconnects_exactly_once() {
        let (manager, connector) = notes_manager();

        let result = manager
            .invoke("notes", "search", json!({"query": "a"}))
            .await
            .unwrap();
        assert_eq!(result["hits"], 2);
        assert_eq!(connector.attempts("notes"), 1);

        manager.disconnect("notes").await;
        connector.set_failing("notes", true);
        let err = manager.invoke("notes", "search", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::NotConnected { .. }));
        assert_eq!(connector.attempts("notes"), 2);
    }

    #[tokio::test]
    async fn test_invoke_namespaced() {
        let (manager, _) = notes_manager();
        let result = manager
            .invoke_namespaced("notes:search", json!({"query": "x"}))
            .await
            .unwrap();
        assert_eq!(result["query"], "x");

        let err = manager.invoke_namespaced("no-separator", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn test_disabled_server_is_not_reconnected() {
        let connector = MemoryConnector::new().with_server("notes", notes_server());
        let manager = manager_with(
            connector.clone(),
            vec![ServerConfig::stdio("notes", "notes-server").with_enabled(false)],
        );

        let err = manager.invoke("notes", "search", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::NotConnected { .. }));
        assert_eq!(connector.total_attempts(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_requires_credentials() {
        let connector = MemoryConnector::new().with_server("notes", notes_server());
        let mut registry = ServerRegistry::new();
        registry
            .add_server(ServerConfig::stdio("notes", "notes-server"))
            .unwrap();
        registry.require_credential("notes", "OMNIX_NOTES_TOKEN_NEVER_SET");
        let manager =
            ConnectionManager::new(Arc::new(RwLock::new(registry)), Arc::new(connector.clone()));

        let err = manager.invoke("notes", "search", json!({})).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("OMNIX_NOTES_TOKEN_NEVER_SET"));
        assert!(manager.read_resource("notes", "note://1").await.is_err());
        assert_eq!(connector.total_attempts(), 0);
        assert!(!manager.is_connected("notes").await);
    }

    #[tokio::test]
    async fn test_connect_locks_are_not_leaked() {
        let (manager, _) = notes_manager();

        let _ = manager.connect("missing").await;
        assert_eq!(manager.connect_lock_count().await, 0);

        manager.connect("notes").await.unwrap();
        assert_eq!(manager.connect_lock_count().await, 1);
        manager.disconnect("notes").await;
        assert_eq!(manager.connect_lock_count().await, 0);
    }

    #[tokio::test]
    async fn test_unexpected_termination_removes_connection() {
        let (manager, connector) = notes_manager();
        manager.connect("notes").await.unwrap();

        assert!(connector.kill("notes", "server process exited (exit status: 1)"));
        wait_until_disconnected(&manager, "notes").await;

        assert_eq!(manager.status("notes").await, ServerStatus::Error);
        assert!(manager.tools().await.is_empty());
        assert!(manager
            .last_error("notes")
            .await
            .is_some_and(|e| e.contains("exit status: 1")));

        // The next call reconnects
        manager.invoke("notes", "search", json!({})).await.unwrap();
        assert_eq!(connector.attempts("notes"), 2);
    }

    #[tokio::test]
    async fn test_disconnect_and_cleanup() {
        let connector = MemoryConnector::new()
            .with_server("a", notes_server())
            .with_server("b", notes_server());
        let manager = manager_with(
            connector,
            vec![
                ServerConfig::stdio("a", "server-a"),
                ServerConfig::stdio("b", "server-b"),
            ],
        );
        manager.connect("a").await.unwrap();
        manager.connect("b").await.unwrap();

        manager.disconnect("a").await;
        assert_eq!(manager.status("a").await, ServerStatus::Disconnected);
        assert!(manager.tools().await.iter().all(|t| t.server == "b"));

        // Disconnecting again is a no-op
        manager.disconnect("a").await;

        manager.cleanup().await;
        assert!(manager.connected_servers().await.is_empty());
        assert!(manager.tools().await.is_empty());
        assert!(manager.resources().await.is_empty());
    }

    #[tokio::test]
    async fn test_tool_filters_apply() {
        let connector = MemoryConnector::new().with_server("notes", notes_server());
        let manager = manager_with(
            connector,
            vec![ServerConfig::stdio("notes", "notes-server").with_disabled_tools(["fail"])],
        );
        manager.connect("notes").await.unwrap();

        let ids: Vec<_> = manager.tools().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["notes:search"]);
    }

    #[tokio::test]
    async fn test_read_resource_and_prompt() {
        let connector = MemoryConnector::new().with_server(
            "notes",
            notes_server().prompt("summarize", "Summarize", "Summarize the notes"),
        );
        let manager = manager_with(connector, vec![ServerConfig::stdio("notes", "notes-server")]);

        let contents = manager.read_resource("notes", "note://1").await.unwrap();
        assert_eq!(contents, json!("hello"));

        let messages = manager
            .get_prompt("notes", "summarize", Value::Null)
            .await
            .unwrap();
        assert_eq!(messages[0]["role"], "user");
    }

    #[tokio::test]
    async fn test_connector_errors_propagate_through_mock() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|config| Err(McpError::launch_failed(&config.id, "command 'npx' not found")));

        let mut registry = ServerRegistry::new();
        registry
            .add_server(ServerConfig::stdio("github", "npx"))
            .unwrap();
        let manager = ConnectionManager::new(Arc::new(RwLock::new(registry)), Arc::new(connector));

        let err = manager.connect("github").await.unwrap_err();
        assert!(matches!(err, McpError::LaunchFailed { .. }));
        assert!(manager
            .last_error("github")
            .await
            .is_some_and(|e| e.contains("npx")));
    }
}
