// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Omnix MCP - external capability servers for an agent engine.
//!
//! Connects to tool-provider servers over stdio or event-stream transports,
//! discovers the tools, resources and prompts they expose, and publishes the
//! tools into the engine's tool registry under `server:name` ids.
//!
//! # Architecture
//!
//! - [`types`] - Core tool type definitions (ToolDefinition, InputSchema)
//! - [`error`] - Error types and result aliases
//! - [`config`] - Integrations file loading (JSON and YAML)
//! - [`telemetry`] - Tracing and metrics infrastructure
//! - [`tools`] - Tool handler trait and registry
//! - [`mcp`] - Server registry, transports, connections and lifecycle
//!
//! # Example
//!
//! ```rust,ignore
//! use omnix_mcp::config::load_config;
//! use omnix_mcp::mcp::IntegrationManager;
//! use omnix_mcp::tools::ToolRegistry;
//!
//! let config = load_config(".".as_ref(), None)?;
//! let integrations = IntegrationManager::with_default_connector(config.into_registry()?)
//!     .with_tool_registry(ToolRegistry::new().shared());
//!
//! for outcome in integrations.initialize().await {
//!     println!("{}: {}", outcome.server_id, outcome.connected);
//! }
//! ```

pub mod config;
pub mod error;
pub mod mcp;
pub mod telemetry;
pub mod tools;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ConfigError, Result, ToolError};
pub use mcp::{
    CapabilityCatalog, ConnectionManager, IntegrationManager, McpError, ServerConfig,
    ServerRegistry,
};
pub use types::{InputSchema, ToolDefinition};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let registry = ServerRegistry::with_builtin_requirements();
        assert!(registry.is_empty());
        let _def = ToolDefinition::new("sample", "A sample tool");
    }
}
