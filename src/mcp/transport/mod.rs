// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transports that carry JSON-RPC messages to capability servers.
//!
//! Every transport kind implements [`Transport`]; a [`Connector`] turns a
//! [`ServerConfig`] into a live transport. The variant is chosen from the
//! config's [`TransportKind`], never by inspecting the server.
//!
//! Concurrency per kind:
//!
//! - [`StdioTransport`] serializes requests, one in flight per process.
//!   Many process-based servers are single-threaded and interleave output
//!   when sent concurrent requests.
//! - [`SseTransport`] correlates responses by request id and allows
//!   concurrent requests over the same stream.

pub mod memory;
pub mod sse;
pub mod stdio;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{oneshot, watch};

use super::config::{ServerConfig, TransportKind};
use super::error::{McpError, METHOD_NOT_FOUND};

pub use memory::{MemoryConnector, MemoryServer, MemoryTransport};
pub use sse::SseTransport;
pub use stdio::StdioTransport;

/// Receiver that yields `Some(reason)` once the transport has terminated.
pub type ClosedSignal = watch::Receiver<Option<String>>;

/// A bidirectional JSON-RPC channel to one capability server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which kind of transport this is.
    fn kind(&self) -> TransportKind;

    /// Send a request and wait for its response `result`.
    ///
    /// The caller bounds the wait; dropping the future abandons the request
    /// without affecting the transport.
    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError>;

    /// Send a notification (no response expected).
    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError>;

    /// Termination signal. Observers see `Some(reason)` after the transport
    /// dies, whether through [`Transport::close`] or an unexpected exit.
    fn closed(&self) -> ClosedSignal;

    /// Shut the transport down and release its process or socket.
    async fn close(&self);
}

/// Builds transports from server configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a transport. Handshake is the caller's job.
    async fn connect(&self, config: &ServerConfig) -> Result<Box<dyn Transport>, McpError>;
}

/// Connector that spawns processes and opens event streams.
#[derive(Debug, Clone, Default)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Box<dyn Transport>, McpError> {
        match config.transport {
            TransportKind::Stdio => Ok(Box::new(StdioTransport::spawn(config)?)),
            TransportKind::Sse => Ok(Box::new(SseTransport::connect(config).await?)),
        }
    }
}

/// Outstanding requests awaiting a response, keyed by JSON-RPC id.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    next_id: AtomicU64,
    waiters: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate an id and a waiter. The guard removes the waiter when the
    /// request is abandoned.
    pub(crate) fn register(self: &Arc<Self>) -> (u64, oneshot::Receiver<Value>, PendingGuard) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        let guard = PendingGuard {
            pending: Arc::clone(self),
            id,
        };
        (id, rx, guard)
    }

    /// Hand a response to its waiter. Returns false for unknown ids.
    pub(crate) fn resolve(&self, id: u64, message: Value) -> bool {
        match self.lock().remove(&id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Drop every waiter so their receivers fail.
    pub(crate) fn fail_all(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Value>>> {
        // The map stays consistent even if a holder panicked
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Removes a pending entry on drop.
pub(crate) struct PendingGuard {
    pending: Arc<PendingRequests>,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// What the reader loop should do with an incoming message.
#[derive(Debug, PartialEq)]
pub(crate) enum Incoming {
    /// Response to one of our requests.
    Response(u64, Value),
    /// Request from the server that needs this reply.
    ServerRequest(Value),
    /// Notification or unroutable message.
    Ignored,
}

/// Classify an incoming JSON-RPC message.
pub(crate) fn classify_incoming(message: Value) -> Incoming {
    let method = message.get("method").and_then(|m| m.as_str());
    let id = message.get("id").cloned();

    match (method, id) {
        (Some(method), Some(id)) if !id.is_null() => {
            let reply = if method == "ping" {
                json!({"jsonrpc": "2.0", "id": id, "result": {}})
            } else {
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": METHOD_NOT_FOUND, "message": format!("Method not found: {}", method)}
                })
            };
            Incoming::ServerRequest(reply)
        }
        (Some(method), _) => {
            tracing::trace!(method = %method, "Server notification");
            Incoming::Ignored
        }
        (None, Some(id)) => match id.as_u64() {
            Some(id) => Incoming::Response(id, message),
            None => Incoming::Ignored,
        },
        (None, None) => Incoming::Ignored,
    }
}

/// Build a JSON-RPC request.
pub(crate) fn request_message(id: u64, method: &str, params: Value) -> Value {
    if params.is_null() {
        json!({"jsonrpc": "2.0", "id": id, "method": method})
    } else {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
    }
}

/// Build a JSON-RPC notification.
pub(crate) fn notification_message(method: &str, params: Value) -> Value {
    if params.is_null() {
        json!({"jsonrpc": "2.0", "method": method})
    } else {
        json!({"jsonrpc": "2.0", "method": method, "params": params})
    }
}

/// Extract `result` from a response, turning an `error` member into
/// [`McpError::Protocol`].
pub(crate) fn response_result(response: Value) -> Result<Value, McpError> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(-1) as i32;
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error");
        return Err(McpError::protocol(code, message));
    }

    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}

/// Publish a close reason once; later reasons are ignored.
pub(crate) fn mark_closed(tx: &watch::Sender<Option<String>>, reason: impl Into<String>) {
    let reason = reason.into();
    tx.send_if_modified(|state| {
        if state.is_none() {
            *state = Some(reason);
            true
        } else {
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_resolve_and_guard() {
        let pending = Arc::new(PendingRequests::new());
        let (id, mut rx, guard) = pending.register();
        assert_eq!(id, 1);

        assert!(pending.resolve(id, json!({"id": 1, "result": {}})));
        assert!(rx.try_recv().is_ok());
        drop(guard);

        let (id, _rx, guard) = pending.register();
        assert_eq!(id, 2);
        drop(guard);
        assert!(!pending.resolve(id, json!({})));
    }

    #[test]
    fn test_fail_all_closes_receivers() {
        let pending = Arc::new(PendingRequests::new());
        let (_id, mut rx, _guard) = pending.register();
        pending.fail_all();
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn test_classify_incoming() {
        assert_eq!(
            classify_incoming(json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}})),
            Incoming::Response(7, json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}}))
        );

        match classify_incoming(json!({"jsonrpc": "2.0", "id": "a", "method": "ping"})) {
            Incoming::ServerRequest(reply) => {
                assert_eq!(reply["id"], "a");
                assert_eq!(reply["result"], json!({}));
            }
            other => panic!("unexpected {:?}", other),
        }

        match classify_incoming(json!({"jsonrpc": "2.0", "id": 3, "method": "roots/list"})) {
            Incoming::ServerRequest(reply) => {
                assert_eq!(reply["error"]["code"], METHOD_NOT_FOUND);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            classify_incoming(json!({"jsonrpc": "2.0", "method": "notifications/message"})),
            Incoming::Ignored
        );
    }

    #[test]
    fn test_response_result() {
        assert_eq!(
            response_result(json!({"id": 1, "result": {"tools": []}})).unwrap(),
            json!({"tools": []})
        );

        let err = response_result(json!({"id": 1, "error": {"code": -32601, "message": "nope"}}))
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_messages_omit_null_params() {
        assert!(request_message(1, "tools/list", Value::Null).get("params").is_none());
        assert_eq!(
            notification_message("notifications/initialized", Value::Null)["method"],
            "notifications/initialized"
        );
    }

    #[test]
    fn test_mark_closed_keeps_first_reason() {
        let (tx, rx) = watch::channel(None);
        mark_closed(&tx, "process exited");
        mark_closed(&tx, "stdout closed");
        assert_eq!(rx.borrow().as_deref(), Some("process exited"));
    }
}
