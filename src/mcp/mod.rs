// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Integration with external capability servers.
//!
//! Capability servers are processes or remote endpoints that expose tools,
//! resources and prompts over JSON-RPC. This module connects to them and
//! makes their tools available to the agent engine.
//!
//! # Architecture
//!
//! - [`ServerRegistry`] - declarative catalog of server configurations
//! - [`transport`] - stdio and event-stream transports behind one trait
//! - [`McpClient`] - handshake and typed calls over a transport
//! - [`ConnectionManager`] - one live connection per server, reconnect once
//! - [`CapabilityCatalog`] - sorted, namespaced view of discovered capabilities
//! - [`adapter`] - external tools as [`ToolHandler`](crate::tools::ToolHandler)s
//! - [`IntegrationManager`] - enable/disable lifecycle and status
//!
//! Every capability is addressed as `server:name`, so two servers exposing
//! a tool of the same name never collide.
//!
//! # Example
//!
//! ```rust,ignore
//! use omnix_mcp::mcp::{IntegrationManager, ServerConfig, ServerRegistry};
//!
//! let mut registry = ServerRegistry::with_builtin_requirements();
//! registry.add_server(
//!     ServerConfig::stdio("filesystem", "npx")
//!         .with_args(["-y", "@modelcontextprotocol/server-filesystem", "."]),
//! )?;
//!
//! let integrations = IntegrationManager::with_default_connector(registry);
//! integrations.initialize().await;
//! let listing = integrations.test_tool("filesystem", "list_directory", None).await;
//! ```

pub mod adapter;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod integration;
pub mod manager;
pub mod normalize;
pub mod registry;
pub mod transport;
pub mod types;

pub use adapter::{
    infer_category, invoke_external, publish_server_tools, unpublish_server_tools,
    ExternalToolResult, McpToolWrapper,
};
pub use catalog::CapabilityCatalog;
pub use client::{McpClient, PROTOCOL_VERSION};
pub use config::{expand_env_vars, ServerCategory, ServerConfig, ServerConfigPatch, TransportKind};
pub use error::McpError;
pub use integration::{
    default_test_args, IntegrationManager, ServerOutcome, ServerSummary, StatusSummary,
    TestToolResult,
};
pub use manager::{Connection, ConnectionManager, SharedRegistry};
pub use registry::ServerRegistry;
pub use transport::{Connector, DefaultConnector, Transport};
pub use types::{
    namespaced_id, split_namespaced_id, InvocationResult, McpContent, McpToolInfo,
    PromptArgument, PromptDescriptor, ResourceDescriptor, ServerCapabilities, ServerInfo,
    ServerStatus,
};
