// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metrics collection for capability-server traffic.
//!
//! Lightweight in-process counters: per-tool invocation outcomes, per-server
//! connect latency, and connection lifecycle counters. Nothing is exported;
//! the CLI prints a snapshot on request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    /// Invocation metrics keyed by namespaced tool id.
    tools: RwLock<HashMap<String, ToolMetrics>>,

    /// Operation latency keyed by operation name (e.g. `mcp.connect.github`).
    operations: RwLock<HashMap<String, OperationMetrics>>,

    /// Connection lifecycle counters.
    connections: ConnectionCounters,

    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            operations: RwLock::new(HashMap::new()),
            connections: ConnectionCounters::default(),
            start_time: Instant::now(),
        }
    }

    /// Record a tool invocation.
    pub fn record_tool(&self, name: &str, duration: Duration, success: bool) {
        // A poisoned lock only means another recorder panicked; keep counting.
        let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());
        tools
            .entry(name.to_string())
            .or_insert_with(ToolMetrics::new)
            .record(duration, success);
    }

    /// Record a generic timed operation.
    pub fn record_operation(&self, name: &str, duration: Duration) {
        let mut ops = self.operations.write().unwrap_or_else(|e| e.into_inner());
        ops.entry(name.to_string())
            .or_insert_with(OperationMetrics::new)
            .record(duration);
    }

    /// Count a successful connect.
    pub fn record_connect(&self) {
        self.connections.connects.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a disconnect (explicit or abnormal).
    pub fn record_disconnect(&self) {
        self.connections.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a transparent reconnect attempt made on behalf of an invocation.
    pub fn record_reconnect_attempt(&self) {
        self.connections.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get metrics for a specific tool.
    pub fn tool_metrics(&self, name: &str) -> Option<ToolMetrics> {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Get metrics for a specific operation.
    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        self.operations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let tools = self.tools.read().unwrap_or_else(|e| e.into_inner());
        let operations = self.operations.read().unwrap_or_else(|e| e.into_inner());

        MetricsSnapshot {
            tools: tools.clone(),
            operations: operations.clone(),
            connects: self.connections.connects.load(Ordering::Relaxed),
            disconnects: self.connections.disconnects.load(Ordering::Relaxed),
            reconnect_attempts: self.connections.reconnect_attempts.load(Ordering::Relaxed),
            uptime: self.start_time.elapsed(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.tools.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.operations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.connections.reset();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for a single external tool.
#[derive(Debug, Clone)]
pub struct ToolMetrics {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl ToolMetrics {
    /// Create new empty tool metrics.
    pub fn new() -> Self {
        Self {
            invocations: 0,
            successes: 0,
            failures: 0,
            total_duration: Duration::ZERO,
            max_duration: Duration::ZERO,
        }
    }

    /// Record one invocation.
    pub fn record(&mut self, duration: Duration, success: bool) {
        self.invocations += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);
    }

    /// Calculate average execution time.
    pub fn avg_duration(&self) -> Duration {
        if self.invocations == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.invocations as u32
        }
    }

    /// Calculate success rate (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            1.0
        } else {
            self.successes as f64 / self.invocations as f64
        }
    }
}

impl Default for ToolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency metrics for a named operation.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    pub count: u64,
    pub total_duration: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
}

impl OperationMetrics {
    /// Create new operation metrics.
    pub fn new() -> Self {
        Self {
            count: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
        }
    }

    /// Record an operation.
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
    }

    /// Calculate average duration.
    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct ConnectionCounters {
    connects: AtomicU64,
    disconnects: AtomicU64,
    reconnect_attempts: AtomicU64,
}

impl ConnectionCounters {
    fn reset(&self) {
        self.connects.store(0, Ordering::Relaxed);
        self.disconnects.store(0, Ordering::Relaxed);
        self.reconnect_attempts.store(0, Ordering::Relaxed);
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub tools: HashMap<String, ToolMetrics>,
    pub operations: HashMap<String, OperationMetrics>,
    pub connects: u64,
    pub disconnects: u64,
    pub reconnect_attempts: u64,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Integration Metrics ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n", self.uptime));
        report.push_str(&format!(
            "Connections: {} opened, {} closed, {} reconnect attempts\n\n",
            self.connects, self.disconnects, self.reconnect_attempts
        ));

        if !self.tools.is_empty() {
            let mut names: Vec<_> = self.tools.keys().collect();
            names.sort();
            report.push_str("Tool Metrics:\n");
            for name in names {
                let metrics = &self.tools[name];
                report.push_str(&format!(
                    "  {}: {} calls, {:.1}% success, avg {:.2?}\n",
                    name,
                    metrics.invocations,
                    metrics.success_rate() * 100.0,
                    metrics.avg_duration()
                ));
            }
            report.push('\n');
        }

        if !self.operations.is_empty() {
            let mut names: Vec<_> = self.operations.keys().collect();
            names.sort();
            report.push_str("Operation Metrics:\n");
            for name in names {
                let metrics = &self.operations[name];
                report.push_str(&format!(
                    "  {}: {} ops, avg {:.2?}, max {:.2?}\n",
                    name,
                    metrics.count,
                    metrics.avg_duration(),
                    metrics.max_duration
                ));
            }
        }

        report
    }
}
