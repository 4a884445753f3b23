// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for capability-server operations.
//!
//! Variants fall into four families: configuration, connection (launch,
//! handshake, timeout, closed), invocation (unknown tool, bad arguments,
//! remote failure), and unsupported capability. The last one is never
//! surfaced to callers as a failure; discovery turns it into an empty set.

use thiserror::Error;

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i32 = -32601;

/// Errors that can occur during capability-server operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Missing or invalid configuration, including missing credentials.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Server id is not in the registry.
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// Server id is already registered.
    #[error("Server '{0}' is already registered")]
    DuplicateServer(String),

    /// The transport could not be started (spawn failure, refused connection).
    #[error("Failed to launch server '{server}': {message}")]
    LaunchFailed { server: String, message: String },

    /// The transport came up but the identification handshake failed.
    #[error("Handshake with server '{server}' failed: {message}")]
    HandshakeFailed { server: String, message: String },

    /// The handshake did not complete in time.
    #[error("Connection to server '{server}' timed out after {timeout_secs}s")]
    ConnectionTimeout { server: String, timeout_secs: u64 },

    /// The transport terminated while a request was outstanding.
    #[error("Connection to server '{server}' closed: {message}")]
    ConnectionClosed { server: String, message: String },

    /// No live connection and the single reconnect attempt did not help.
    #[error("Server '{server}' is not connected: {message}")]
    NotConnected { server: String, message: String },

    /// Tool is not in the server's discovered set.
    #[error("Tool not found: {server}:{tool}")]
    UnknownTool { server: String, tool: String },

    /// Arguments are not a JSON object.
    #[error("Invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    /// The server executed the call and reported a failure.
    #[error("Tool '{tool}' failed: {message}")]
    Remote { tool: String, message: String },

    /// Tool call exceeded its timeout.
    #[error("Tool call '{tool}' timed out after {timeout_secs}s")]
    ToolCallTimeout { tool: String, timeout_secs: u64 },

    /// The server does not implement a capability (resources, prompts).
    #[error("Server '{server}' does not support {capability}")]
    CapabilityUnsupported { server: String, capability: String },

    /// JSON-RPC error response.
    #[error("Protocol error: code={code}, message={message}")]
    Protocol { code: i32, message: String },

    /// Response did not have the expected shape.
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Create a launch failure error.
    pub fn launch_failed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LaunchFailed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a handshake failure error.
    pub fn handshake_failed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a closed-connection error.
    pub fn closed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a remote execution failure.
    pub fn remote(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(code: i32, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Missing credential for a server.
    pub fn missing_credential(server: &str, variable: &str) -> Self {
        Self::Configuration(format!(
            "{} requires environment variable {}",
            server, variable
        ))
    }

    /// Whether this is a configuration problem.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::ServerNotFound(_) | Self::DuplicateServer(_)
        )
    }

    /// Whether this is a connection problem.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::LaunchFailed { .. }
                | Self::HandshakeFailed { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed { .. }
                | Self::NotConnected { .. }
        )
    }

    /// Whether this is an invocation problem.
    pub fn is_invocation(&self) -> bool {
        matches!(
            self,
            Self::UnknownTool { .. }
                | Self::InvalidArguments { .. }
                | Self::Remote { .. }
                | Self::ToolCallTimeout { .. }
        )
    }

    /// Whether the server simply lacks the requested capability.
    ///
    /// Both an explicit [`McpError::CapabilityUnsupported`] and a JSON-RPC
    /// "method not found" response count.
    pub fn is_unsupported(&self) -> bool {
        match self {
            Self::CapabilityUnsupported { .. } => true,
            Self::Protocol { code, .. } => *code == METHOD_NOT_FOUND,
            _ => false,
        }
    }
}
