// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Generic tool infrastructure.
//!
//! - [`ToolHandler`] trait - Core abstraction for tool implementations
//! - [`ToolRegistry`] - Maps tool names to handlers, dispatches calls
//!
//! # Example
//!
//! ```rust,ignore
//! use omnix_mcp::tools::ToolRegistry;
//!
//! let registry = ToolRegistry::new().shared();
//! // ... publish external tools into it ...
//! let output = registry.read().await.dispatch("github:search_repositories", json!({"query": "rust"})).await?;
//! ```

pub mod registry;

pub use registry::{DispatchResult, SharedToolRegistry, ToolHandler, ToolOutput, ToolRegistry};

/// Telemetry preview limit for log output.
pub const TELEMETRY_PREVIEW_MAX_BYTES: usize = 2 * 1024; // 2 KiB

/// Truncate text to a maximum byte length, respecting UTF-8 boundaries.
pub fn truncate_text(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    // Find the last valid char boundary within max_bytes
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }

    if end == 0 {
        return String::new();
    }

    format!("{}... [truncated]", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_short() {
        let text = "Hello, world!";
        assert_eq!(truncate_text(text, 100), text);
    }

    #[test]
    fn test_truncate_text_long() {
        let truncated = truncate_text("Hello, world!", 5);
        assert!(truncated.starts_with("Hello"));
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_truncate_text_utf8() {
        let text = "こんにちは"; // 5 characters, 15 bytes
        let truncated = truncate_text(text, 6);
        assert!(truncated.starts_with("こん"));
    }
}
