// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Declarative catalog of known capability servers.
//!
//! The registry owns configuration only. It knows nothing about live
//! connections; enabling and disabling goes through
//! [`IntegrationManager`](super::integration::IntegrationManager), which keeps
//! the registry and the connection state in step.

use std::collections::{BTreeMap, HashMap};

use super::config::{ServerCategory, ServerConfig, ServerConfigPatch};
use super::error::McpError;

/// Credentials required by well-known server kinds.
const BUILTIN_REQUIREMENTS: &[(&str, &[&str])] = &[
    ("github", &["GITHUB_PERSONAL_ACCESS_TOKEN"]),
    ("notion", &["NOTION_API_TOKEN"]),
    ("brave-search", &["BRAVE_API_KEY"]),
    ("slack", &["SLACK_BOT_TOKEN", "SLACK_TEAM_ID"]),
    ("firecrawl", &["FIRECRAWL_API_KEY"]),
];

/// Catalog of server configurations keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: BTreeMap<String, ServerConfig>,
    requirements: HashMap<String, Vec<String>>,
}

impl ServerRegistry {
    /// Create an empty registry with no credential requirements.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that knows the credential requirements of the
    /// well-known server kinds.
    pub fn with_builtin_requirements() -> Self {
        let mut registry = Self::new();
        for (server, vars) in BUILTIN_REQUIREMENTS {
            for var in *vars {
                registry.require_credential(*server, *var);
            }
        }
        registry
    }

    /// Registry seeded with disabled entries for the well-known servers.
    pub fn with_builtin_servers() -> Self {
        let mut registry = Self::with_builtin_requirements();
        for config in builtin_servers() {
            // Ids in the builtin table are unique
            let _ = registry.add_server(config);
        }
        registry
    }

    /// Declare that `server_id` needs `variable` before it can be enabled.
    pub fn require_credential(&mut self, server_id: impl Into<String>, variable: impl Into<String>) {
        let vars = self.requirements.entry(server_id.into()).or_default();
        let variable = variable.into();
        if !vars.contains(&variable) {
            vars.push(variable);
        }
    }

    /// Credentials required by a server.
    pub fn required_credentials(&self, server_id: &str) -> &[String] {
        self.requirements
            .get(server_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Register a server. Fails on duplicate id or unusable transport settings.
    pub fn add_server(&mut self, config: ServerConfig) -> Result<(), McpError> {
        config.validate()?;
        if self.servers.contains_key(&config.id) {
            return Err(McpError::DuplicateServer(config.id));
        }
        self.servers.insert(config.id.clone(), config);
        Ok(())
    }

    /// Merge `patch` into an existing server and return the result.
    ///
    /// The patched configuration is validated before it replaces the stored
    /// one, so a failed update leaves the registry unchanged.
    pub fn update_server(
        &mut self,
        id: &str,
        patch: ServerConfigPatch,
    ) -> Result<&ServerConfig, McpError> {
        let current = self
            .servers
            .get(id)
            .ok_or_else(|| McpError::ServerNotFound(id.to_string()))?;

        let mut updated = current.clone();
        patch.apply(&mut updated);
        updated.validate()?;

        let slot = self
            .servers
            .get_mut(id)
            .ok_or_else(|| McpError::ServerNotFound(id.to_string()))?;
        *slot = updated;
        Ok(slot)
    }

    /// Remove a server configuration.
    pub fn remove_server(&mut self, id: &str) -> Option<ServerConfig> {
        self.servers.remove(id)
    }

    /// Flip the enabled flag.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), McpError> {
        let config = self
            .servers
            .get_mut(id)
            .ok_or_else(|| McpError::ServerNotFound(id.to_string()))?;
        config.enabled = enabled;
        Ok(())
    }

    /// Look up a server.
    pub fn get_server(&self, id: &str) -> Option<&ServerConfig> {
        self.servers.get(id)
    }

    /// Whether a server id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.servers.contains_key(id)
    }

    /// All servers, ordered by id.
    pub fn get_all_servers(&self) -> Vec<&ServerConfig> {
        self.servers.values().collect()
    }

    /// Servers in a category, ordered by id.
    pub fn get_servers_by_category(&self, category: ServerCategory) -> Vec<&ServerConfig> {
        self.servers
            .values()
            .filter(|c| c.effective_category() == category)
            .collect()
    }

    /// Enabled servers, ordered by id.
    pub fn get_enabled_servers(&self) -> Vec<&ServerConfig> {
        self.servers.values().filter(|c| c.enabled).collect()
    }

    /// Number of registered servers.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Check that every required credential of a server is present.
    ///
    /// A credential counts as present when it is non-empty in the server's
    /// environment overlay (after `${VAR}` expansion) or in the process
    /// environment.
    pub fn validate_credentials(&self, id: &str) -> Result<(), McpError> {
        let config = self
            .servers
            .get(id)
            .ok_or_else(|| McpError::ServerNotFound(id.to_string()))?;

        let overlay = config.expanded_env();
        for variable in self.required_credentials(id) {
            let in_overlay = overlay.get(variable).is_some_and(|v| !v.trim().is_empty());
            let in_process = std::env::var(variable).is_ok_and(|v| !v.trim().is_empty());
            if !in_overlay && !in_process {
                return Err(McpError::missing_credential(id, variable));
            }
        }

        Ok(())
    }
}

/// Disabled entries for the well-known servers.
fn builtin_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig::stdio("filesystem", "npx")
            .with_name("Filesystem")
            .with_description("Read and write files in an allowed directory")
            .with_args(["-y", "@modelcontextprotocol/server-filesystem", "."])
            .with_category(ServerCategory::Files)
            .with_enabled(false),
        ServerConfig::stdio("github", "npx")
            .with_name("GitHub")
            .with_description("Repositories, issues and pull requests")
            .with_args(["-y", "@modelcontextprotocol/server-github"])
            .with_env([("GITHUB_PERSONAL_ACCESS_TOKEN", "${GITHUB_PERSONAL_ACCESS_TOKEN}")])
            .with_category(ServerCategory::Development)
            .with_enabled(false),
        ServerConfig::stdio("notion", "npx")
            .with_name("Notion")
            .with_description("Search and read Notion workspace pages")
            .with_args(["-y", "@notionhq/notion-mcp-server"])
            .with_env([("NOTION_API_TOKEN", "${NOTION_API_TOKEN}")])
            .with_category(ServerCategory::Productivity)
            .with_enabled(false),
        ServerConfig::stdio("brave-search", "npx")
            .with_name("Brave Search")
            .with_description("Web and local search")
            .with_args(["-y", "@modelcontextprotocol/server-brave-search"])
            .with_env([("BRAVE_API_KEY", "${BRAVE_API_KEY}")])
            .with_category(ServerCategory::Search)
            .with_enabled(false),
        ServerConfig::stdio("slack", "npx")
            .with_name("Slack")
            .with_description("Channels, messages and users")
            .with_args(["-y", "@modelcontextprotocol/server-slack"])
            .with_env([
                ("SLACK_BOT_TOKEN", "${SLACK_BOT_TOKEN}"),
                ("SLACK_TEAM_ID", "${SLACK_TEAM_ID}"),
            ])
            .with_category(ServerCategory::Communication)
            .with_enabled(false),
        ServerConfig::stdio("firecrawl", "npx")
            .with_name("Firecrawl")
            .with_description("Web scraping and crawling")
            .with_args(["-y", "firecrawl-mcp"])
            .with_env([("FIRECRAWL_API_KEY", "${FIRECRAWL_API_KEY}")])
            .with_category(ServerCategory::Search)
            .with_enabled(false),
    ]
}
