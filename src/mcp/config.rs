// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Capability-server configuration.
//!
//! # Example
//!
//! ```json
//! {
//!   "id": "notion",
//!   "name": "Notion",
//!   "transport": "stdio",
//!   "command": "npx",
//!   "args": ["-y", "@notionhq/notion-mcp-server"],
//!   "env": { "NOTION_API_TOKEN": "${NOTION_API_TOKEN}" },
//!   "enabled": true,
//!   "category": "productivity"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::adapter::infer_category;
use super::error::McpError;

/// Configuration for a single capability server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique server id. Used as the namespace prefix of every capability.
    pub id: String,

    /// Display name.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Transport kind.
    #[serde(default)]
    pub transport: TransportKind,

    /// Command for stdio transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments for stdio transport.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overlay for stdio transport (supports ${ENV_VAR} expansion).
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory for stdio transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Endpoint URL for the persistent-stream transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Bearer token for the persistent-stream transport (supports ${ENV_VAR} expansion).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// Whether this server should be connected.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Explicit category. When absent a heuristic on the id is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ServerCategory>,

    /// Handshake timeout in seconds.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_sec: u64,

    /// Tool call timeout in seconds.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_sec: u64,

    /// List of enabled tools (if empty, all tools are enabled).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_tools: Vec<String>,

    /// List of disabled tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_tools: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_startup_timeout() -> u64 {
    30
}

fn default_tool_timeout() -> u64 {
    300
}

impl ServerConfig {
    fn base(id: String, transport: TransportKind) -> Self {
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            transport,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            endpoint: None,
            bearer_token: None,
            enabled: true,
            category: None,
            startup_timeout_sec: default_startup_timeout(),
            tool_timeout_sec: default_tool_timeout(),
            enabled_tools: Vec::new(),
            disabled_tools: Vec::new(),
        }
    }

    /// Create a spawned-process configuration.
    pub fn stdio(id: impl Into<String>, command: impl Into<String>) -> Self {
        let mut config = Self::base(id.into(), TransportKind::Stdio);
        config.command = Some(command.into());
        config
    }

    /// Create a persistent-stream configuration.
    pub fn sse(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let mut config = Self::base(id.into(), TransportKind::Sse);
        config.endpoint = Some(endpoint.into());
        config
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add command arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Set environment variables.
    pub fn with_env(
        mut self,
        env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.env = env
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Set working directory.
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set an explicit category.
    pub fn with_category(mut self, category: ServerCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Set both timeouts.
    pub fn with_timeouts(mut self, startup_secs: u64, tool_secs: u64) -> Self {
        self.startup_timeout_sec = startup_secs;
        self.tool_timeout_sec = tool_secs;
        self
    }

    /// Set enabled tools.
    pub fn with_enabled_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.enabled_tools = tools.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Set disabled tools.
    pub fn with_disabled_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.disabled_tools = tools.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Check if a tool is enabled.
    pub fn is_tool_enabled(&self, tool_name: &str) -> bool {
        if self.disabled_tools.iter().any(|t| t == tool_name) {
            return false;
        }

        // Empty allow-list means everything not explicitly disabled
        self.enabled_tools.is_empty() || self.enabled_tools.iter().any(|t| t == tool_name)
    }

    /// Category used for grouping: the explicit one, or the inferred one.
    pub fn effective_category(&self) -> ServerCategory {
        self.category.unwrap_or_else(|| infer_category(&self.id))
    }

    /// Environment overlay with `${VAR}` references expanded.
    pub fn expanded_env(&self) -> HashMap<String, String> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_vars(v)))
            .collect()
    }

    /// Bearer token with `${VAR}` references expanded.
    pub fn expanded_bearer_token(&self) -> Option<String> {
        self.bearer_token.as_deref().map(expand_env_vars)
    }

    /// Check that the transport parameters are usable.
    pub fn validate(&self) -> Result<(), McpError> {
        if self.id.trim().is_empty() {
            return Err(McpError::Configuration("server id must not be empty".to_string()));
        }
        if self.id.contains(':') {
            return Err(McpError::Configuration(format!(
                "server id '{}' must not contain ':'",
                self.id
            )));
        }

        match self.transport {
            TransportKind::Stdio => {
                if self.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                    return Err(McpError::Configuration(format!(
                        "server '{}': stdio transport requires 'command'",
                        self.id
                    )));
                }
            }
            TransportKind::Sse => {
                let endpoint = self.endpoint.as_deref().unwrap_or("");
                if reqwest::Url::parse(endpoint).is_err() {
                    return Err(McpError::Configuration(format!(
                        "server '{}': sse transport requires a valid 'endpoint' URL, got '{}'",
                        self.id, endpoint
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Partial update for a [`ServerConfig`]. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub transport: Option<TransportKind>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    /// Merged key by key into the existing overlay.
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub category: Option<ServerCategory>,
    #[serde(default)]
    pub startup_timeout_sec: Option<u64>,
    #[serde(default)]
    pub tool_timeout_sec: Option<u64>,
}

impl ServerConfigPatch {
    /// Patch that only touches the environment overlay.
    pub fn env(env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        Self {
            env: Some(env.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
            ..Default::default()
        }
    }

    /// Apply this patch to a configuration.
    pub fn apply(self, config: &mut ServerConfig) {
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(description) = self.description {
            config.description = description;
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(command) = self.command {
            config.command = Some(command);
        }
        if let Some(args) = self.args {
            config.args = args;
        }
        if let Some(env) = self.env {
            config.env.extend(env);
        }
        if let Some(cwd) = self.cwd {
            config.cwd = Some(cwd);
        }
        if let Some(endpoint) = self.endpoint {
            config.endpoint = Some(endpoint);
        }
        if let Some(token) = self.bearer_token {
            config.bearer_token = Some(token);
        }
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(category) = self.category {
            config.category = Some(category);
        }
        if let Some(secs) = self.startup_timeout_sec {
            config.startup_timeout_sec = secs;
        }
        if let Some(secs) = self.tool_timeout_sec {
            config.tool_timeout_sec = secs;
        }
    }
}

/// Transport kind for a capability server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Spawned local process speaking line-delimited JSON-RPC on stdio.
    #[default]
    Stdio,

    /// Persistent server-sent event stream with a companion POST channel.
    Sse,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Sse => write!(f, "sse"),
        }
    }
}

/// Coarse UI grouping for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerCategory {
    Development,
    Productivity,
    Search,
    Communication,
    Data,
    Files,
    Other,
}

impl std::fmt::Display for ServerCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Development => "development",
            Self::Productivity => "productivity",
            Self::Search => "search",
            Self::Communication => "communication",
            Self::Data => "data",
            Self::Files => "files",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Expand `${VAR}` references from the process environment.
///
/// Unset variables expand to the empty string; an unterminated `${` is kept
/// literally.
pub fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var_name = &after[..end];
                result.push_str(&std::env::var(var_name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}
