// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persistent-stream transport.
//!
//! The client opens a long-lived `text/event-stream` GET. The server first
//! sends an `endpoint` event naming the URL that requests are POSTed to;
//! responses then arrive as `message` events on the stream and are matched
//! to requests by id.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use reqwest_eventsource::{Error as EventSourceError, Event, EventSource};
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::{
    classify_incoming, mark_closed, notification_message, request_message, response_result,
    ClosedSignal, Incoming, PendingRequests, Transport,
};
use crate::mcp::config::{ServerConfig, TransportKind};
use crate::mcp::error::McpError;

/// Transport over a server-sent event stream plus HTTP POSTs.
pub struct SseTransport {
    server: String,
    client: Client,
    post_url: Url,
    bearer_token: Option<String>,
    pending: Arc<PendingRequests>,
    closed_tx: Arc<watch::Sender<Option<String>>>,
    closed_rx: watch::Receiver<Option<String>>,
    reader: StdMutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// Open the event stream and wait for the server's `endpoint` event.
    pub async fn connect(config: &ServerConfig) -> Result<Self, McpError> {
        let endpoint = config.endpoint.as_deref().ok_or_else(|| {
            McpError::Configuration(format!("{} has no endpoint configured", config.id))
        })?;
        let stream_url = Url::parse(endpoint).map_err(|e| {
            McpError::Configuration(format!("{}: invalid endpoint '{}': {}", config.id, endpoint, e))
        })?;

        let startup = Duration::from_secs(config.startup_timeout_sec);
        let bearer_token = config.expanded_bearer_token();
        let client = Client::new();

        let mut request = client.get(stream_url.clone());
        if let Some(token) = &bearer_token {
            request = request.bearer_auth(token);
        }
        let events = EventSource::new(request).map_err(|e| {
            McpError::Configuration(format!("{}: cannot open event stream: {}", config.id, e))
        })?;

        let pending = Arc::new(PendingRequests::new());
        let (closed_tx, closed_rx) = watch::channel(None);
        let closed_tx = Arc::new(closed_tx);
        let (ready_tx, ready_rx) = oneshot::channel();

        let reader = tokio::spawn(read_events(
            EventContext {
                server: config.id.clone(),
                base_url: stream_url,
                client: client.clone(),
                bearer_token: bearer_token.clone(),
                pending: Arc::clone(&pending),
                closed_tx: Arc::clone(&closed_tx),
            },
            events,
            ready_tx,
        ));

        let post_url = match tokio::time::timeout(startup, ready_rx).await {
            Ok(Ok(Ok(url))) => url,
            Ok(Ok(Err(e))) => {
                reader.abort();
                return Err(e);
            }
            Ok(Err(_)) => {
                reader.abort();
                return Err(McpError::handshake_failed(
                    &config.id,
                    "no endpoint event received: stream ended",
                ));
            }
            Err(_) => {
                reader.abort();
                return Err(McpError::ConnectionTimeout {
                    server: config.id.clone(),
                    timeout_secs: config.startup_timeout_sec,
                });
            }
        };

        tracing::debug!(server = %config.id, post_url = %post_url, "Event stream ready");

        Ok(Self {
            server: config.id.clone(),
            client,
            post_url,
            bearer_token,
            pending,
            closed_tx,
            closed_rx,
            reader: StdMutex::new(Some(reader)),
        })
    }

    fn closed_error(&self) -> McpError {
        let reason = self
            .closed_rx
            .borrow()
            .clone()
            .unwrap_or_else(|| "stream closed".to_string());
        McpError::closed(&self.server, reason)
    }

    async fn post(&self, message: &Value) -> Result<(), McpError> {
        post_message(&self.client, &self.post_url, self.bearer_token.as_deref(), message)
            .await
            .map_err(|failure| failure.into_error(&self.server))
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let (id, rx, _guard) = self.pending.register();
        if self.closed_rx.borrow().is_some() {
            return Err(self.closed_error());
        }

        tracing::trace!(server = %self.server, id, method, "Posting request");
        self.post(&request_message(id, method, params)).await?;

        let response = rx.await.map_err(|_| self.closed_error())?;
        response_result(response)
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        if self.closed_rx.borrow().is_some() {
            return Err(self.closed_error());
        }
        self.post(&notification_message(method, params)).await
    }

    fn closed(&self) -> ClosedSignal {
        self.closed_rx.clone()
    }

    async fn close(&self) {
        let reader = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(reader) = reader {
            reader.abort();
        }
        mark_closed(&self.closed_tx, "connection closed by client");
        self.pending.fail_all();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take() {
            reader.abort();
        }
    }
}

/// State the stream reader needs.
struct EventContext {
    server: String,
    base_url: Url,
    client: Client,
    bearer_token: Option<String>,
    pending: Arc<PendingRequests>,
    closed_tx: Arc<watch::Sender<Option<String>>>,
}

async fn read_events(
    ctx: EventContext,
    mut events: EventSource,
    ready_tx: oneshot::Sender<Result<Url, McpError>>,
) {
    let mut ready_tx = Some(ready_tx);
    let mut post_url: Option<Url> = None;

    let reason = loop {
        let event = match events.next().await {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(startup_failure(&ctx, &e)));
                }
                break stream_failure(&e);
            }
            None => break "connection closed: event stream ended".to_string(),
        };

        let message = match event {
            Event::Open => {
                tracing::debug!(server = %ctx.server, url = %ctx.base_url, "Event stream opened");
                continue;
            }
            Event::Message(message) => message,
        };

        match message.event.as_str() {
            "endpoint" if post_url.is_none() => match ctx.base_url.join(message.data.trim()) {
                Ok(url) => {
                    post_url = Some(url.clone());
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(Ok(url));
                    }
                }
                Err(e) => {
                    tracing::warn!(server = %ctx.server, endpoint = %message.data, error = %e, "Invalid endpoint event");
                }
            },
            "message" => handle_message(&ctx, post_url.as_ref(), &message.data),
            other => {
                tracing::trace!(server = %ctx.server, event = %other, "Ignoring event");
            }
        }
    };

    // The event source reconnects on its own unless closed
    events.close();

    if let Some(tx) = ready_tx.take() {
        let _ = tx.send(Err(McpError::handshake_failed(
            &ctx.server,
            format!("no endpoint event received: {}", reason),
        )));
    }

    tracing::debug!(server = %ctx.server, reason = %reason, "Event stream ended");
    mark_closed(&ctx.closed_tx, reason);
    ctx.pending.fail_all();
}

/// Error for a stream that failed before the `endpoint` event arrived.
fn startup_failure(ctx: &EventContext, error: &EventSourceError) -> McpError {
    match error {
        EventSourceError::InvalidStatusCode(status, _) => {
            McpError::launch_failed(&ctx.server, http_failure(*status))
        }
        EventSourceError::Transport(e) => {
            McpError::launch_failed(&ctx.server, format!("cannot reach {}: {}", ctx.base_url, e))
        }
        EventSourceError::InvalidContentType(content_type, _) => McpError::handshake_failed(
            &ctx.server,
            format!("expected an event stream, got content type {:?}", content_type),
        ),
        EventSourceError::StreamEnded => {
            McpError::handshake_failed(&ctx.server, "no endpoint event received: stream ended")
        }
        other => McpError::handshake_failed(&ctx.server, other.to_string()),
    }
}

fn stream_failure(error: &EventSourceError) -> String {
    match error {
        EventSourceError::StreamEnded => "connection closed: event stream ended".to_string(),
        other => format!("connection closed: event stream failed ({})", other),
    }
}

fn handle_message(ctx: &EventContext, post_url: Option<&Url>, data: &str) {
    let message: Value = match serde_json::from_str(data) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(server = %ctx.server, error = %e, "Skipping malformed message event");
            return;
        }
    };

    match classify_incoming(message) {
        Incoming::Response(id, message) => {
            ctx.pending.resolve(id, message);
        }
        Incoming::ServerRequest(reply) => {
            let Some(url) = post_url.cloned() else {
                return;
            };
            let client = ctx.client.clone();
            let token = ctx.bearer_token.clone();
            let server = ctx.server.clone();
            // Replying inline would stall the stream behind an HTTP round trip
            tokio::spawn(async move {
                if let Err(e) = post_message(&client, &url, token.as_deref(), &reply).await {
                    let error = e.into_error(&server);
                    tracing::debug!(server = %server, error = %error, "Failed to answer server request");
                }
            });
        }
        Incoming::Ignored => {}
    }
}

/// Why a POST did not go through.
#[derive(Debug)]
enum PostFailure {
    /// The request never got a response; the server is unreachable.
    Send(String),
    /// The server answered with a non-success status.
    Status(StatusCode),
}

impl PostFailure {
    /// A refused POST leaves the stream usable, so only send failures
    /// count as a closed connection.
    fn into_error(self, server: &str) -> McpError {
        match self {
            PostFailure::Send(message) => McpError::closed(server, message),
            PostFailure::Status(status) => {
                McpError::protocol(i32::from(status.as_u16()), http_failure(status))
            }
        }
    }
}

async fn post_message(
    client: &Client,
    url: &Url,
    bearer_token: Option<&str>,
    message: &Value,
) -> Result<(), PostFailure> {
    let mut request = client
        .post(url.clone())
        .header(CONTENT_TYPE, "application/json")
        .json(message);
    if let Some(token) = bearer_token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| PostFailure::Send(format!("POST to {} failed: {}", url, e)))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(PostFailure::Status(status))
    }
}

fn http_failure(status: StatusCode) -> String {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => format!(
            "server rejected credentials (HTTP {}); check the configured bearer token",
            status
        ),
        _ => format!("server returned HTTP {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_resolution() {
        let base = Url::parse("https://mcp.example.com/sse").unwrap();
        assert_eq!(
            base.join("/messages?session=abc").unwrap().as_str(),
            "https://mcp.example.com/messages?session=abc"
        );
        assert_eq!(
            base.join("https://other.example.com/rpc").unwrap().as_str(),
            "https://other.example.com/rpc"
        );
    }

    #[test]
    fn test_http_failure_mentions_credentials() {
        assert!(http_failure(StatusCode::UNAUTHORIZED).contains("bearer token"));
        assert!(http_failure(StatusCode::BAD_GATEWAY).contains("502"));
    }

    #[test]
    fn test_refused_post_is_not_a_closed_connection() {
        let err = PostFailure::Status(StatusCode::SERVICE_UNAVAILABLE).into_error("remote");
        assert!(matches!(err, McpError::Protocol { code: 503, .. }));
        assert!(!err.is_connection());

        let err = PostFailure::Send("POST to http://host/rpc failed".to_string()).into_error("remote");
        assert!(matches!(err, McpError::ConnectionClosed { .. }));
    }

    #[test]
    fn test_stream_failure_reason() {
        assert_eq!(
            stream_failure(&EventSourceError::StreamEnded),
            "connection closed: event stream ended"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_launch_failure() {
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let config = ServerConfig::sse("remote", "http://127.0.0.1:9/sse").with_timeouts(5, 5);
        let err = match SseTransport::connect(&config).await {
            Err(e) => e,
            Ok(_) => panic!("connect should fail"),
        };
        assert!(err.is_connection());
    }
}
