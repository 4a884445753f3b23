// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Spawned-process transport.
//!
//! Messages are newline-delimited JSON on the child's stdin/stdout. Stderr
//! is captured into a small ring buffer so that startup failures can be
//! reported with the server's own diagnostics.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch, Mutex};

use super::{
    classify_incoming, mark_closed, notification_message, request_message, response_result,
    ClosedSignal, Incoming, PendingRequests, Transport,
};
use crate::mcp::config::{ServerConfig, TransportKind};
use crate::mcp::error::McpError;

/// Stderr lines retained for diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// How long `close` waits for the process to exit after being killed.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// How long a stdout EOF waits for the exit monitor to report the exit
/// status before closing with a generic reason.
const EXIT_REPORT_GRACE: Duration = Duration::from_millis(500);

/// Transport over a child process's standard streams.
pub struct StdioTransport {
    server: String,
    tx: mpsc::Sender<String>,
    pending: Arc<PendingRequests>,
    /// One request in flight at a time.
    request_lock: Mutex<()>,
    stderr_tail: Arc<StdMutex<VecDeque<String>>>,
    closed_rx: watch::Receiver<Option<String>>,
    kill_tx: StdMutex<Option<oneshot::Sender<()>>>,
}

impl StdioTransport {
    /// Launch the configured command and start the I/O tasks.
    pub fn spawn(config: &ServerConfig) -> Result<Self, McpError> {
        let command = config.command.as_deref().ok_or_else(|| {
            McpError::Configuration(format!("{} has no command configured", config.id))
        })?;

        let mut cmd = Command::new(command);
        cmd.args(&config.args)
            .envs(config.expanded_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::launch_failed(&config.id, spawn_failure(command, &e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::launch_failed(&config.id, "failed to open stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::launch_failed(&config.id, "failed to open stdout"))?;
        let stderr = child.stderr.take();

        tracing::debug!(server = %config.id, command = %command, pid = ?child.id(), "Spawned server process");

        let pending = Arc::new(PendingRequests::new());
        let stderr_tail = Arc::new(StdMutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let (closed_tx, closed_rx) = watch::channel(None);
        let closed_tx = Arc::new(closed_tx);
        let (tx, rx) = mpsc::channel::<String>(100);
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(write_messages(stdin, rx));
        tokio::spawn(read_messages(
            config.id.clone(),
            stdout,
            tx.clone(),
            Arc::clone(&pending),
            Arc::clone(&closed_tx),
        ));
        let stderr_done = stderr.map(|stderr| {
            let (done_tx, done_rx) = oneshot::channel();
            tokio::spawn(read_stderr(
                config.id.clone(),
                stderr,
                Arc::clone(&stderr_tail),
                done_tx,
            ));
            done_rx
        });
        tokio::spawn(monitor_exit(
            config.id.clone(),
            child,
            kill_rx,
            stderr_done,
            Arc::clone(&pending),
            closed_tx,
        ));

        Ok(Self {
            server: config.id.clone(),
            tx,
            pending,
            request_lock: Mutex::new(()),
            stderr_tail,
            closed_rx,
            kill_tx: StdMutex::new(Some(kill_tx)),
        })
    }

    /// The last lines the process wrote to stderr.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn closed_error(&self) -> McpError {
        let reason = self
            .closed_rx
            .borrow()
            .clone()
            .unwrap_or_else(|| "stream closed".to_string());

        let tail = self.stderr_tail();
        let message = if tail.is_empty() {
            reason
        } else {
            format!("{}\nstderr:\n{}", reason, tail.join("\n"))
        };
        McpError::closed(&self.server, message)
    }

    async fn send(&self, message: Value) -> Result<(), McpError> {
        let line = serde_json::to_string(&message)?;
        self.tx
            .send(line)
            .await
            .map_err(|_| self.closed_error())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let _serialized = self.request_lock.lock().await;

        let (id, rx, _guard) = self.pending.register();
        // Registered before the check so a concurrent close fails this waiter
        if self.closed_rx.borrow().is_some() {
            return Err(self.closed_error());
        }

        tracing::trace!(server = %self.server, id, method, "Sending request");
        self.send(request_message(id, method, params)).await?;

        let response = rx.await.map_err(|_| self.closed_error())?;
        response_result(response)
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        if self.closed_rx.borrow().is_some() {
            return Err(self.closed_error());
        }
        self.send(notification_message(method, params)).await
    }

    fn closed(&self) -> ClosedSignal {
        self.closed_rx.clone()
    }

    async fn close(&self) {
        let kill = self
            .kill_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(kill) = kill {
            let _ = kill.send(());
        }

        let mut closed = self.closed_rx.clone();
        let waited = tokio::time::timeout(CLOSE_GRACE, async {
            while closed.borrow().is_none() {
                if closed.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;

        if waited.is_err() {
            tracing::warn!(server = %self.server, "Server process did not exit after kill");
        }
    }
}

/// Describe a spawn failure in terms an operator can act on.
fn spawn_failure(command: &str, error: &std::io::Error) -> String {
    match error.kind() {
        ErrorKind::NotFound => format!(
            "command '{}' not found; check that the dependency is installed and on PATH ({})",
            command, error
        ),
        ErrorKind::PermissionDenied => format!(
            "permission denied launching '{}'; check file permissions ({})",
            command, error
        ),
        _ => format!("failed to launch '{}': {}", command, error),
    }
}

async fn write_messages(mut stdin: tokio::process::ChildStdin, mut rx: mpsc::Receiver<String>) {
    while let Some(line) = rx.recv().await {
        if stdin.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if stdin.write_all(b"\n").await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

async fn read_messages(
    server: String,
    stdout: tokio::process::ChildStdout,
    tx: mpsc::Sender<String>,
    pending: Arc<PendingRequests>,
    closed_tx: Arc<watch::Sender<Option<String>>>,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(server = %server, error = %e, "Error reading server stdout");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(_) => {
                // Some servers print banners on stdout before speaking JSON-RPC
                tracing::debug!(server = %server, line = %line, "Skipping non-JSON stdout line");
                continue;
            }
        };

        match classify_incoming(message) {
            Incoming::Response(id, message) => {
                if !pending.resolve(id, message) {
                    tracing::trace!(server = %server, id, "Response for abandoned request");
                }
            }
            Incoming::ServerRequest(reply) => {
                if let Ok(line) = serde_json::to_string(&reply) {
                    let _ = tx.send(line).await;
                }
            }
            Incoming::Ignored => {}
        }
    }

    // Stdout usually ends just before the process is reaped; prefer the
    // exit monitor's reason since it carries the exit status
    let mut closed = closed_tx.subscribe();
    let _ = tokio::time::timeout(EXIT_REPORT_GRACE, closed.wait_for(|reason| reason.is_some())).await;

    mark_closed(&closed_tx, "connection closed: server stdout ended");
    pending.fail_all();
}

async fn read_stderr(
    server: String,
    stderr: tokio::process::ChildStderr,
    tail: Arc<StdMutex<VecDeque<String>>>,
    done_tx: oneshot::Sender<()>,
) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(server = %server, "stderr: {}", line);
        let mut tail = tail.lock().unwrap_or_else(|e| e.into_inner());
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    let _ = done_tx.send(());
}

async fn monitor_exit(
    server: String,
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    stderr_done: Option<oneshot::Receiver<()>>,
    pending: Arc<PendingRequests>,
    closed_tx: Arc<watch::Sender<Option<String>>>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        // Fires on an explicit close and when the transport is dropped
        _ = &mut kill_rx => None,
    };

    let reason = match exited {
        Some(Ok(status)) => format!("connection closed: server process exited ({})", status),
        Some(Err(e)) => format!("connection closed: failed to wait on server process ({})", e),
        None => {
            if let Err(e) = child.kill().await {
                tracing::debug!(server = %server, error = %e, "Failed to kill server process");
            }
            "connection closed by client".to_string()
        }
    };

    // Let the stderr tail catch up so failed requests can include it
    if let Some(done) = stderr_done {
        let _ = tokio::time::timeout(EXIT_REPORT_GRACE, done).await;
    }

    tracing::debug!(server = %server, reason = %reason, "Server process ended");
    mark_closed(&closed_tx, reason);
    pending.fail_all();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_command_is_launch_failure() {
        let config = ServerConfig::stdio("ghost", "omnix-definitely-not-a-real-binary");
        let err = match StdioTransport::spawn(&config) {
            Err(e) => e,
            Ok(_) => panic!("spawn should fail"),
        };
        assert!(matches!(err, McpError::LaunchFailed { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_request_round_trip_through_shell_echo_server() {
        // Answers one request with a fixed result, mirroring the request id
        let script = r#"read line; id=$(echo "$line" | sed 's/.*"id":\([0-9]*\).*/\1/'); echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"ok\":true}}"; sleep 5"#;
        let config = ServerConfig::stdio("echo", "sh").with_args(["-c", script]);
        let transport = StdioTransport::spawn(&config).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            transport.request("ping", Value::Null),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result, json!({"ok": true}));

        transport.close().await;
        assert!(transport.closed().borrow().is_some());
    }

    #[tokio::test]
    async fn test_early_exit_fails_request_with_stderr() {
        let config = ServerConfig::stdio("crashy", "sh")
            .with_args(["-c", "echo 'missing module foo' >&2; exit 3"]);
        let transport = StdioTransport::spawn(&config).unwrap();

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            transport.request("initialize", json!({})),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(matches!(err, McpError::ConnectionClosed { .. }));
        let message = err.to_string();
        assert!(message.contains("exit status: 3"), "{}", message);
        assert!(message.contains("missing module foo"), "{}", message);

        let mut closed = transport.closed();
        let _ = tokio::time::timeout(Duration::from_secs(5), async {
            while closed.borrow().is_none() {
                if closed.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        assert!(closed.borrow().is_some());
    }
}
