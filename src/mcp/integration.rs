// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Top-level facade over registry, connections and tool publication.
//!
//! The [`IntegrationManager`] is the single writer of the server registry:
//! enable, disable, add, update and remove all pass through one lock, so the
//! invariant "a disabled server has no open connection" holds between
//! operations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use super::adapter::{publish_server_tools, unpublish_server_tools};
use super::catalog::CapabilityCatalog;
use super::config::{ServerCategory, ServerConfig, ServerConfigPatch};
use super::error::McpError;
use super::manager::{ConnectionManager, SharedRegistry};
use super::registry::ServerRegistry;
use super::transport::{Connector, DefaultConnector};
use super::types::ServerStatus;
use crate::tools::SharedToolRegistry;

/// Outcome of connecting one server during [`IntegrationManager::initialize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOutcome {
    pub server_id: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One server's line in the status summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub status: ServerStatus,
    pub tools: usize,
    pub resources: usize,
    pub prompts: usize,
    pub category: ServerCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate status across every registered server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total_servers: usize,
    pub connected_servers: usize,
    pub total_tools: usize,
    pub total_resources: usize,
    pub total_prompts: usize,
    pub servers: Vec<ServerSummary>,
}

/// Result of a diagnostic tool test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Raw error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Arguments used by [`IntegrationManager::test_tool`] when none are given.
///
/// Keyed by well-known tool names; anything else gets an empty object.
pub fn default_test_args(tool_name: &str) -> Value {
    match tool_name {
        "API-post-search" | "search" | "brave_web_search" => json!({"query": "test"}),
        "list_directory" => json!({"path": "."}),
        "search_repositories" => json!({"query": "rust"}),
        // Includes API-get-users
        _ => json!({}),
    }
}

/// Coordinates the server registry, live connections and published tools.
pub struct IntegrationManager {
    registry: SharedRegistry,
    connections: ConnectionManager,
    tool_registry: Option<SharedToolRegistry>,
    admin: Mutex<()>,
}

impl IntegrationManager {
    /// Create a manager that builds transports with `connector`.
    pub fn new(registry: ServerRegistry, connector: Arc<dyn Connector>) -> Self {
        let registry = Arc::new(RwLock::new(registry));
        Self {
            connections: ConnectionManager::new(Arc::clone(&registry), connector),
            registry,
            tool_registry: None,
            admin: Mutex::new(()),
        }
    }

    /// Create a manager that spawns processes and opens event streams.
    pub fn with_default_connector(registry: ServerRegistry) -> Self {
        Self::new(registry, Arc::new(DefaultConnector))
    }

    /// Publish connected servers' tools into `tools`.
    pub fn with_tool_registry(mut self, tools: SharedToolRegistry) -> Self {
        self.tool_registry = Some(tools);
        self
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn catalog(&self) -> CapabilityCatalog {
        CapabilityCatalog::new(self.connections.clone())
    }

    pub fn tool_registry(&self) -> Option<&SharedToolRegistry> {
        self.tool_registry.as_ref()
    }

    /// Connect every enabled server.
    ///
    /// Servers connect concurrently; one server failing never affects the
    /// others. Returns an outcome per server, sorted by id.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Vec<ServerOutcome> {
        let _admin = self.admin.lock().await;

        let ids: Vec<String> = {
            let registry = self.registry.read().await;
            registry
                .get_enabled_servers()
                .into_iter()
                .map(|s| s.id.clone())
                .collect()
        };

        let mut tasks = JoinSet::new();
        for id in ids {
            let registry = Arc::clone(&self.registry);
            let connections = self.connections.clone();
            tasks.spawn(async move {
                let outcome = async {
                    registry.read().await.validate_credentials(&id)?;
                    connections.connect(&id).await
                }
                .await;
                (id, outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (server_id, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Connect task failed");
                    continue;
                }
            };

            match outcome {
                Ok(()) => {
                    self.publish(&server_id).await;
                    outcomes.push(ServerOutcome {
                        server_id,
                        connected: true,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(server = %server_id, error = %e, "Server failed to initialize");
                    outcomes.push(ServerOutcome {
                        server_id,
                        connected: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        outcomes.sort_by(|a, b| a.server_id.cmp(&b.server_id));
        info!(
            connected = outcomes.iter().filter(|o| o.connected).count(),
            total = outcomes.len(),
            "Integration initialization finished"
        );
        outcomes
    }

    /// Validate credentials, connect, mark enabled and publish tools.
    ///
    /// A credential failure creates no transport and leaves the registry
    /// untouched; a connect failure leaves the server disabled.
    #[instrument(skip(self))]
    pub async fn enable_server(&self, server_id: &str) -> Result<(), McpError> {
        let _admin = self.admin.lock().await;
        self.enable_locked(server_id).await
    }

    async fn enable_locked(&self, server_id: &str) -> Result<(), McpError> {
        self.registry.read().await.validate_credentials(server_id)?;
        self.connections.connect(server_id).await?;

        if let Err(e) = self.registry.write().await.set_enabled(server_id, true) {
            // Removed concurrently by a direct registry writer
            self.connections.disconnect(server_id).await;
            return Err(e);
        }
        self.publish(server_id).await;

        info!(server = %server_id, "Server enabled");
        Ok(())
    }

    /// Unpublish tools, disconnect and mark disabled.
    #[instrument(skip(self))]
    pub async fn disable_server(&self, server_id: &str) -> Result<(), McpError> {
        let _admin = self.admin.lock().await;
        self.disable_locked(server_id).await
    }

    async fn disable_locked(&self, server_id: &str) -> Result<(), McpError> {
        if !self.registry.read().await.contains(server_id) {
            return Err(McpError::ServerNotFound(server_id.to_string()));
        }

        self.unpublish(server_id).await;
        self.connections.disconnect(server_id).await;
        self.registry.write().await.set_enabled(server_id, false)?;

        info!(server = %server_id, "Server disabled");
        Ok(())
    }

    /// Register a new server. It is connected only once enabled.
    pub async fn add_server(&self, config: ServerConfig) -> Result<(), McpError> {
        let _admin = self.admin.lock().await;
        let enabled = config.enabled;
        let id = config.id.clone();

        // Registered disabled; enabling goes through the credential check
        self.registry
            .write()
            .await
            .add_server(config.with_enabled(false))?;

        if enabled {
            if let Err(e) = self.enable_locked(&id).await {
                warn!(server = %id, error = %e, "Added server could not be enabled");
            }
        }
        Ok(())
    }

    /// Apply a partial update. A change to `enabled` runs the full enable or
    /// disable sequence; other changes take effect on the next connect.
    pub async fn update_server(&self, server_id: &str, mut patch: ServerConfigPatch) -> Result<(), McpError> {
        let _admin = self.admin.lock().await;
        let enabled = patch.enabled.take();

        self.registry.write().await.update_server(server_id, patch)?;

        match enabled {
            Some(true) => self.enable_locked(server_id).await,
            Some(false) => self.disable_locked(server_id).await,
            None => Ok(()),
        }
    }

    /// Disconnect and forget a server.
    pub async fn remove_server(&self, server_id: &str) -> Result<ServerConfig, McpError> {
        let _admin = self.admin.lock().await;
        self.unpublish(server_id).await;
        self.connections.disconnect(server_id).await;
        self.registry
            .write()
            .await
            .remove_server(server_id)
            .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))
    }

    /// Snapshot of every registered server, sorted by id.
    pub async fn servers(&self) -> Vec<ServerConfig> {
        self.registry
            .read()
            .await
            .get_all_servers()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Aggregate status of every registered server.
    pub async fn get_status_summary(&self) -> StatusSummary {
        let catalog = self.catalog();
        let servers = self.servers().await;

        let mut summaries = Vec::with_capacity(servers.len());
        for server in servers {
            let status = catalog.server_status(&server.id).await;
            let error = match status {
                ServerStatus::Error => self.connections.last_error(&server.id).await,
                _ => None,
            };
            summaries.push(ServerSummary {
                tools: catalog.get_server_tools(&server.id).await.len(),
                resources: catalog.get_server_resources(&server.id).await.len(),
                prompts: catalog.get_server_prompts(&server.id).await.len(),
                category: server.effective_category(),
                enabled: server.enabled,
                name: if server.name.is_empty() {
                    server.id.clone()
                } else {
                    server.name.clone()
                },
                id: server.id,
                status,
                error,
            });
        }

        StatusSummary {
            total_servers: summaries.len(),
            connected_servers: summaries
                .iter()
                .filter(|s| s.status == ServerStatus::Connected)
                .count(),
            total_tools: summaries.iter().map(|s| s.tools).sum(),
            total_resources: summaries.iter().map(|s| s.resources).sum(),
            total_prompts: summaries.iter().map(|s| s.prompts).sum(),
            servers: summaries,
        }
    }

    /// Invoke a tool for diagnostics, filling in default arguments when
    /// none are given.
    #[instrument(skip(self, args))]
    pub async fn test_tool(&self, server_id: &str, tool_name: &str, args: Option<Value>) -> TestToolResult {
        let args = args.unwrap_or_else(|| default_test_args(tool_name));

        match self.connections.invoke(server_id, tool_name, args).await {
            Ok(result) => TestToolResult {
                success: true,
                result: Some(result),
                error: None,
            },
            Err(e) => TestToolResult {
                success: false,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Unpublish every tool and disconnect every server.
    pub async fn cleanup(&self) {
        let _admin = self.admin.lock().await;
        for id in self.connections.connected_servers().await {
            self.unpublish(&id).await;
        }
        self.connections.cleanup().await;
    }

    async fn publish(&self, server_id: &str) {
        if let Some(tools) = &self.tool_registry {
            publish_server_tools(tools, &self.connections, server_id).await;
        }
    }

    async fn unpublish(&self, server_id: &str) {
        if let Some(tools) = &self.tool_registry {
            unpublish_server_tools(tools, server_id).await;
        }
    }
}
