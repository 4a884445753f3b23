// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bridge from capability-server tools to the application's tool shape.
//!
//! Each discovered tool is wrapped in a [`McpToolWrapper`] implementing
//! [`ToolHandler`], so external tools dispatch through the same
//! [`ToolRegistry`](crate::tools::ToolRegistry) as local ones. Failures come
//! back as structured, unsuccessful output; they never surface as `Err`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::catalog::CapabilityCatalog;
use super::config::ServerCategory;
use super::manager::ConnectionManager;
use super::types::{namespaced_id, split_namespaced_id, InvocationResult, McpToolInfo};
use crate::error::ToolError;
use crate::tools::{SharedToolRegistry, ToolHandler, ToolOutput};
use crate::types::{InputSchema, ToolDefinition};

/// Value of the `source` field on every external tool result.
pub const EXTERNAL_SOURCE: &str = "external";

/// Result shape handed back to the agent for an external tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub source: String,
    pub server: String,
    pub tool: String,
}

impl From<InvocationResult> for ExternalToolResult {
    fn from(result: InvocationResult) -> Self {
        Self {
            success: result.success,
            data: result.data,
            error: result.error,
            source: EXTERNAL_SOURCE.to_string(),
            server: result.server,
            tool: result.tool,
        }
    }
}

impl ExternalToolResult {
    /// Text for the agent: the payload rendered as JSON, or the error.
    pub fn content(&self) -> String {
        match (&self.data, &self.error) {
            (_, Some(error)) => error.clone(),
            (Some(Value::String(text)), None) => text.clone(),
            (Some(data), None) => {
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
            }
            (None, None) => String::new(),
        }
    }
}

/// Invoke an external tool by namespaced id (`server:tool`).
///
/// Never fails: errors are reported in the result with `success: false`.
pub async fn invoke_external(
    manager: &ConnectionManager,
    namespaced: &str,
    params: Value,
) -> ExternalToolResult {
    let Some((server, tool)) = split_namespaced_id(namespaced) else {
        return InvocationResult::failed(
            "",
            namespaced,
            format!("Invalid tool id '{}': expected server:tool", namespaced),
        )
        .into();
    };

    let result = match manager.invoke(server, tool, params).await {
        Ok(data) => InvocationResult::ok(server, tool, data),
        Err(e) => InvocationResult::failed(server, tool, e.to_string()),
    };
    result.into()
}

/// A capability-server tool exposed as a [`ToolHandler`].
pub struct McpToolWrapper {
    tool: McpToolInfo,
    manager: ConnectionManager,
}

impl McpToolWrapper {
    pub fn new(tool: McpToolInfo, manager: ConnectionManager) -> Self {
        Self { tool, manager }
    }

    pub fn tool(&self) -> &McpToolInfo {
        &self.tool
    }
}

#[async_trait]
impl ToolHandler for McpToolWrapper {
    fn definition(&self) -> ToolDefinition {
        let description = match &self.tool.description {
            Some(description) => format!("[{}] {}", self.tool.server, description),
            None => format!("[{}] {}", self.tool.server, self.tool.name),
        };
        ToolDefinition::new(&self.tool.id, description)
            .with_schema(InputSchema::from_json_schema(&self.tool.input_schema))
    }

    fn is_mutating(&self) -> bool {
        !self.tool.read_only
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let result = invoke_external(&self.manager, &self.tool.id, input).await;
        let metadata = serde_json::to_value(&result)
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to encode result: {}", e)))?;
        Ok(ToolOutput::structured(result.content(), result.success, metadata))
    }
}

/// Register every tool of a connected server into `registry`. Returns the
/// namespaced ids that were published.
pub async fn publish_server_tools(
    registry: &SharedToolRegistry,
    manager: &ConnectionManager,
    server_id: &str,
) -> Vec<String> {
    let tools = CapabilityCatalog::new(manager.clone())
        .get_server_tools(server_id)
        .await;

    let mut registry = registry.write().await;
    // Drop anything stale from an earlier connection first
    registry.unregister_where(|name| is_server_tool(name, server_id));

    let mut published = Vec::with_capacity(tools.len());
    for tool in tools {
        published.push(tool.id.clone());
        registry.register(Arc::new(McpToolWrapper::new(tool, manager.clone())));
    }

    tracing::debug!(server = %server_id, count = published.len(), "Published external tools");
    published
}

/// Remove every tool of a server from `registry`. Returns how many were
/// removed.
pub async fn unpublish_server_tools(registry: &SharedToolRegistry, server_id: &str) -> usize {
    let removed = registry
        .write()
        .await
        .unregister_where(|name| is_server_tool(name, server_id));
    tracing::debug!(server = %server_id, removed, "Unpublished external tools");
    removed
}

fn is_server_tool(name: &str, server_id: &str) -> bool {
    name.starts_with(&namespaced_id(server_id, ""))
}

/// Keyword table for [`infer_category`]; first match wins.
const CATEGORY_KEYWORDS: &[(ServerCategory, &[&str])] = &[
    (
        ServerCategory::Development,
        &["github", "gitlab", "git", "sentry", "docker", "linear", "jira", "npm"],
    ),
    (
        ServerCategory::Productivity,
        &["notion", "calendar", "todoist", "gdrive", "drive", "airtable", "trello", "asana"],
    ),
    (
        ServerCategory::Search,
        &["search", "brave", "firecrawl", "tavily", "exa", "fetch", "crawl"],
    ),
    (
        ServerCategory::Communication,
        &["slack", "discord", "email", "gmail", "telegram", "teams", "twilio"],
    ),
    (
        ServerCategory::Data,
        &["postgres", "sqlite", "mysql", "database", "redis", "mongo", "bigquery", "sql"],
    ),
    (
        ServerCategory::Files,
        &["filesystem", "file", "storage", "s3", "dropbox"],
    ),
];

/// Guess a server's category from its id.
///
/// A substring heuristic; an explicit category on the server config takes
/// precedence (see [`ServerConfig::effective_category`]).
///
/// [`ServerConfig::effective_category`]: super::config::ServerConfig::effective_category
pub fn infer_category(server_id: &str) -> ServerCategory {
    let id = server_id.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| id.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(ServerCategory::Other)
}
