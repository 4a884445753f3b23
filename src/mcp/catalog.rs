// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read-only view of everything connected servers expose.

use super::manager::ConnectionManager;
use super::types::{McpToolInfo, PromptDescriptor, ResourceDescriptor, ServerStatus};

/// Queries over the aggregated descriptors of live connections.
///
/// Results are sorted by namespaced id. A descriptor is present exactly while
/// its server is connected.
#[derive(Debug, Clone)]
pub struct CapabilityCatalog {
    manager: ConnectionManager,
}

impl CapabilityCatalog {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub async fn get_all_tools(&self) -> Vec<McpToolInfo> {
        let mut tools = self.manager.tools().await;
        tools.sort_by(|a, b| a.id.cmp(&b.id));
        tools
    }

    pub async fn get_server_tools(&self, server_id: &str) -> Vec<McpToolInfo> {
        let mut tools = self.get_all_tools().await;
        tools.retain(|t| t.server == server_id);
        tools
    }

    /// Look up a tool by namespaced id.
    pub async fn get_tool(&self, namespaced_id: &str) -> Option<McpToolInfo> {
        self.manager.tool(namespaced_id).await
    }

    pub async fn get_all_resources(&self) -> Vec<ResourceDescriptor> {
        let mut resources = self.manager.resources().await;
        resources.sort_by(|a, b| a.id.cmp(&b.id));
        resources
    }

    pub async fn get_server_resources(&self, server_id: &str) -> Vec<ResourceDescriptor> {
        let mut resources = self.get_all_resources().await;
        resources.retain(|r| r.server == server_id);
        resources
    }

    pub async fn get_all_prompts(&self) -> Vec<PromptDescriptor> {
        let mut prompts = self.manager.prompts().await;
        prompts.sort_by(|a, b| a.id.cmp(&b.id));
        prompts
    }

    pub async fn get_server_prompts(&self, server_id: &str) -> Vec<PromptDescriptor> {
        let mut prompts = self.get_all_prompts().await;
        prompts.retain(|p| p.server == server_id);
        prompts
    }

    /// Connection status of a server.
    pub async fn server_status(&self, server_id: &str) -> ServerStatus {
        self.manager.status(server_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::config::ServerConfig;
    use crate::mcp::registry::ServerRegistry;
    use crate::mcp::transport::{MemoryConnector, MemoryServer};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    async fn catalog() -> CapabilityCatalog {
        // Both servers expose a tool called "search"
        let connector = MemoryConnector::new()
            .with_server(
                "web",
                MemoryServer::new("web").text_tool("search", "Web search", |_| Ok("[]".into())),
            )
            .with_server(
                "docs",
                MemoryServer::new("docs")
                    .text_tool("search", "Doc search", |_| Ok("[]".into()))
                    .text_tool("fetch", "Fetch a doc", |_| Ok("".into()))
                    .resource("doc://readme", "README", "# readme")
                    .prompt("explain", "Explain a doc", "Explain this"),
            );

        let mut registry = ServerRegistry::new();
        registry.add_server(ServerConfig::stdio("web", "web")).unwrap();
        registry.add_server(ServerConfig::stdio("docs", "docs")).unwrap();
        registry.add_server(ServerConfig::stdio("idle", "idle")).unwrap();

        let manager = ConnectionManager::new(Arc::new(RwLock::new(registry)), Arc::new(connector));
        manager.connect("web").await.unwrap();
        manager.connect("docs").await.unwrap();
        CapabilityCatalog::new(manager)
    }

    #[tokio::test]
    async fn test_same_tool_name_on_two_servers_stays_distinct() {
        let catalog = catalog().await;
        let ids: Vec<_> = catalog.get_all_tools().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["docs:fetch", "docs:search", "web:search"]);

        let web = catalog.get_tool("web:search").await.unwrap();
        assert_eq!(web.description.as_deref(), Some("Web search"));
    }

    #[tokio::test]
    async fn test_per_server_queries() {
        let catalog = catalog().await;
        assert_eq!(catalog.get_server_tools("web").await.len(), 1);
        assert_eq!(catalog.get_server_resources("docs").await.len(), 1);
        assert!(catalog.get_server_resources("web").await.is_empty());
        assert_eq!(catalog.get_all_prompts().await[0].id, "docs:explain");
        assert!(catalog.get_server_prompts("web").await.is_empty());
    }

    #[tokio::test]
    async fn test_server_status() {
        let catalog = catalog().await;
        assert_eq!(catalog.server_status("docs").await, ServerStatus::Connected);
        assert_eq!(catalog.server_status("idle").await, ServerStatus::Disconnected);
        assert_eq!(catalog.server_status("nope").await, ServerStatus::NotFound);
    }

    #[tokio::test]
    async fn test_disconnect_removes_descriptors() {
        let catalog = catalog().await;
        catalog.manager.disconnect("docs").await;

        let ids: Vec<_> = catalog.get_all_tools().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["web:search"]);
        assert!(catalog.get_all_resources().await.is_empty());
        assert!(catalog.get_all_prompts().await.is_empty());
    }
}
