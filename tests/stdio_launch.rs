// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Launch failures through the real process connector.

use std::sync::Arc;

use tokio::sync::RwLock;

use omnix_mcp::mcp::{ConnectionManager, McpError, ServerConfig, ServerRegistry, ServerStatus};

fn manager_with(config: ServerConfig) -> ConnectionManager {
    let mut registry = ServerRegistry::new();
    registry.add_server(config).unwrap();
    ConnectionManager::with_default_connector(Arc::new(RwLock::new(registry)))
}

#[tokio::test]
async fn test_missing_command_is_a_launch_failure() {
    let manager = manager_with(ServerConfig::stdio(
        "ghost",
        "omnix-command-that-does-not-exist",
    ));

    let err = manager.connect("ghost").await.unwrap_err();
    assert!(matches!(err, McpError::LaunchFailed { .. }));
    assert!(err.to_string().contains("not found"));

    assert_eq!(manager.status("ghost").await, ServerStatus::Error);
    assert!(manager.last_error("ghost").await.is_some());
    assert!(manager.connected_servers().await.is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_server_exiting_before_handshake_fails_to_connect() {
    let manager = manager_with(
        ServerConfig::stdio("quitter", "sh")
            .with_args(["-c", "echo 'missing dependency' >&2; exit 1"])
            .with_timeouts(5, 5),
    );

    let err = manager.connect("quitter").await.unwrap_err();
    assert!(matches!(err, McpError::HandshakeFailed { .. }));

    // The operator sees both the exit status and what the server printed
    let message = err.to_string();
    assert!(message.contains("exit status: 1"), "{}", message);
    assert!(message.contains("missing dependency"), "{}", message);
    assert!(!manager.is_connected("quitter").await);
}

#[tokio::test]
async fn test_unknown_server_is_not_found() {
    let manager = manager_with(ServerConfig::stdio("known", "true"));
    let err = manager.connect("unknown").await.unwrap_err();
    assert!(matches!(err, McpError::ServerNotFound(_)));
    assert_eq!(manager.status("unknown").await, ServerStatus::NotFound);
}
