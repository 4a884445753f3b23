// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool registry and handler trait.
//!
//! This module defines the application's generic tool shape:
//! - [`ToolHandler`] trait that every invocable tool implements
//! - [`ToolRegistry`] for registering, removing and dispatching tools
//! - [`ToolOutput`] for returning results from tool execution
//!
//! External capability-server tools are published here through
//! [`crate::mcp::adapter`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "telemetry")]
use tracing::{debug, info_span, Instrument};

use super::truncate_text;
use crate::error::ToolError;
use crate::types::ToolDefinition;

/// Registry shared between the integration layer and its consumers.
pub type SharedToolRegistry = Arc<tokio::sync::RwLock<ToolRegistry>>;

/// Output from executing a tool.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// Simple text content result
    Text {
        content: String,
        success: bool,
    },
    /// Structured result with optional metadata
    Structured {
        content: String,
        success: bool,
        metadata: Option<serde_json::Value>,
    },
}

impl ToolOutput {
    /// Create a successful text output.
    pub fn success(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            success: true,
        }
    }

    /// Create an error text output.
    pub fn error(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            success: false,
        }
    }

    /// Create a structured output with metadata.
    pub fn structured(content: impl Into<String>, success: bool, metadata: serde_json::Value) -> Self {
        Self::Structured {
            content: content.into(),
            success,
            metadata: Some(metadata),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Text { content, .. } | Self::Structured { content, .. } => content,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Self::Text { success, .. } | Self::Structured { success, .. } => *success,
        }
    }

    /// Structured metadata, when present.
    pub fn metadata(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured { metadata, .. } => metadata.as_ref(),
            Self::Text { .. } => None,
        }
    }

    /// Get a preview suitable for logging (truncated on a char boundary).
    pub fn log_preview(&self, max_bytes: usize) -> String {
        truncate_text(self.content(), max_bytes)
    }
}

impl From<ToolError> for ToolOutput {
    fn from(err: ToolError) -> Self {
        Self::error(err.to_string())
    }
}

/// Trait that every invocable tool implements.
///
/// # Example
///
/// ```rust,ignore
/// use omnix_mcp::tools::{ToolHandler, ToolOutput};
/// use omnix_mcp::types::ToolDefinition;
///
/// struct Clock;
///
/// #[async_trait]
/// impl ToolHandler for Clock {
///     fn definition(&self) -> ToolDefinition {
///         ToolDefinition::new("clock", "Current time")
///     }
///
///     async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
///         Ok(ToolOutput::success(chrono::Utc::now().to_rfc3339()))
///     }
/// }
/// ```
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the tool definition (name, description, input schema).
    fn definition(&self) -> ToolDefinition;

    /// Returns true if this tool may change state outside the process.
    ///
    /// Mutating tools may require user confirmation before execution.
    fn is_mutating(&self) -> bool {
        false
    }

    /// Execute the tool with the given input parameters.
    async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError>;
}

/// Registry of available tools, keyed by tool name.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in the shared form.
    pub fn shared(self) -> SharedToolRegistry {
        Arc::new(tokio::sync::RwLock::new(self))
    }

    /// Register a handler under its definition name, replacing any previous
    /// handler of that name.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Option<Arc<dyn ToolHandler>> {
        let name = handler.definition().name;
        self.handlers.insert(name, handler)
    }

    /// Remove a handler by name.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.remove(name)
    }

    /// Remove every handler whose name matches `predicate`. Returns how many
    /// were removed.
    pub fn unregister_where(&mut self, predicate: impl Fn(&str) -> bool) -> usize {
        let before = self.handlers.len();
        self.handlers.retain(|name, _| !predicate(name));
        before - self.handlers.len()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.handlers.values().map(|h| h.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// All tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Dispatch a tool call and return the result.
    ///
    /// Handler errors are folded into an error [`ToolOutput`]; only an
    /// unknown tool name fails the dispatch itself.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        input: serde_json::Value,
    ) -> Result<DispatchResult, ToolError> {
        let handler = self
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        let start = Instant::now();

        #[cfg(feature = "telemetry")]
        let result = handler
            .execute(input)
            .instrument(info_span!("tool_execute", tool = %tool_name))
            .await;

        #[cfg(not(feature = "telemetry"))]
        let result = handler.execute(input).await;

        let duration = start.elapsed();

        let (output, is_error) = match result {
            Ok(output) => {
                let is_error = !output.is_success();
                (output, is_error)
            }
            Err(err) => (ToolOutput::from(err), true),
        };

        #[cfg(feature = "telemetry")]
        debug!(
            tool = %tool_name,
            duration_ms = duration.as_secs_f64() * 1000.0,
            success = !is_error,
            preview = %output.log_preview(super::TELEMETRY_PREVIEW_MAX_BYTES),
            "Tool dispatch finished"
        );

        Ok(DispatchResult {
            tool_name: tool_name.to_string(),
            output,
            duration,
            is_error,
        })
    }
}

/// Result of dispatching a tool call.
#[derive(Debug)]
pub struct DispatchResult {
    pub tool_name: String,
    pub output: ToolOutput,
    pub duration: Duration,
    /// Whether the tool failed, either by error or by reporting failure
    pub is_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticTool {
        name: String,
        fail: bool,
    }

    #[async_trait]
    impl ToolHandler for StaticTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(&self.name, "A fixed-output tool")
        }

        async fn execute(&self, _input: serde_json::Value) -> Result<ToolOutput, ToolError> {
            if self.fail {
                Err(ToolError::ExecutionFailed("boom".to_string()))
            } else {
                Ok(ToolOutput::success("fixed result"))
            }
        }
    }

    fn tool(name: &str, fail: bool) -> Arc<dyn ToolHandler> {
        Arc::new(StaticTool {
            name: name.to_string(),
            fail,
        })
    }

    #[test]
    fn test_tool_output_variants() {
        let output = ToolOutput::success("test");
        assert!(output.is_success());
        assert_eq!(output.content(), "test");
        assert!(output.metadata().is_none());

        let output = ToolOutput::structured("{}", false, serde_json::json!({"k": 1}));
        assert!(!output.is_success());
        assert_eq!(output.metadata().unwrap()["k"], 1);
    }

    #[test]
    fn test_tool_output_log_preview() {
        let output = ToolOutput::success("a".repeat(100));
        let preview = output.log_preview(10);
        assert!(preview.len() < 100);
        assert!(preview.contains("truncated"));
    }

    #[test]
    fn test_register_and_unregister() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(tool("github:get_issue", false)).is_none());
        registry.register(tool("github:search", false));
        registry.register(tool("notion:search", false));
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.tool_names(),
            vec!["github:get_issue", "github:search", "notion:search"]
        );

        assert!(registry.unregister("notion:search").is_some());
        assert!(registry.unregister("notion:search").is_none());

        let removed = registry.unregister_where(|name| name.starts_with("github:"));
        assert_eq!(removed, 2);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("ok", false));
        registry.register(tool("bad", true));

        let result = registry.dispatch("ok", serde_json::json!({})).await.unwrap();
        assert_eq!(result.tool_name, "ok");
        assert!(result.output.is_success());
        assert!(!result.is_error);

        let result = registry.dispatch("bad", serde_json::json!({})).await.unwrap();
        assert!(result.is_error);
        assert!(result.output.content().contains("boom"));
    }

    #[tokio::test]
    async fn test_dispatch_not_found() {
        let registry = ToolRegistry::new();
        let result = registry.dispatch("nonexistent", serde_json::json!({})).await;
        assert!(matches!(result.unwrap_err(), ToolError::NotFound(_)));
    }
}
