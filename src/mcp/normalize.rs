// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Normalization of heterogeneous server responses.
//!
//! Capability servers answer `tools/call` in several shapes. Callers get one
//! of three things back: a single unwrapped value (exactly one content
//! item), a list (several items), or structured data parsed out of a
//! JSON-looking text payload. Text that fails to parse is returned verbatim.

use serde_json::Value;

use super::error::McpError;
use super::types::McpContent;

/// Normalize the `result` of a `tools/call` response.
///
/// A result flagged `isError` becomes [`McpError::Remote`] carrying the text
/// the server produced.
pub fn normalize_tool_result(tool: &str, result: &Value) -> Result<Value, McpError> {
    let is_error = result
        .get("isError")
        .and_then(|e| e.as_bool())
        .unwrap_or(false);

    let items = result.get("content").and_then(|c| c.as_array());

    if is_error {
        let message = items
            .map(|items| content_text(items))
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "tool reported an error without details".to_string());
        return Err(McpError::remote(tool, message));
    }

    if let Some(structured) = result.get("structuredContent") {
        if !structured.is_null() {
            return Ok(structured.clone());
        }
    }

    match items {
        Some(items) => Ok(normalize_items(items)),
        // Non-conforming server: hand back whatever it sent
        None => Ok(result.clone()),
    }
}

/// Collapse a list of content items: one item unwraps, several stay a list.
pub fn normalize_items(items: &[Value]) -> Value {
    let mut values: Vec<Value> = items.iter().map(normalize_item).collect();
    match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}

/// Normalize one content item.
fn normalize_item(item: &Value) -> Value {
    match McpContent::from_wire(item) {
        Some(McpContent::Text { text }) => parse_json_text(&text),
        Some(McpContent::Resource {
            text: Some(text), ..
        }) => parse_json_text(&text),
        // Images, blob resources and unknown item kinds pass through as-is
        _ => item.clone(),
    }
}

/// Parse text that looks like JSON; otherwise return it as a string.
pub fn parse_json_text(text: &str) -> Value {
    let trimmed = text.trim();
    let looks_like_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));

    if looks_like_json {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return value;
        }
    }

    Value::String(text.to_string())
}

/// Join the text items of a content list.
pub fn content_text(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(|item| match McpContent::from_wire(item) {
            Some(McpContent::Text { text }) => Some(text),
            Some(McpContent::Resource { text, .. }) => text,
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Normalize a `resources/read` result: its `contents` list collapsed the
/// same way tool content is.
pub fn normalize_resource_contents(result: &Value) -> Value {
    let contents = match result.get("contents").and_then(|c| c.as_array()) {
        Some(contents) => contents,
        None => return result.clone(),
    };

    let mut values: Vec<Value> = contents
        .iter()
        .map(|entry| match entry.get("text").and_then(|t| t.as_str()) {
            Some(text) => parse_json_text(text),
            None => entry.clone(),
        })
        .collect();

    match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_item_unwraps() {
        let result = json!({"content": [{"type": "text", "text": "hello"}]});
        assert_eq!(normalize_tool_result("t", &result).unwrap(), json!("hello"));
    }

    #[test]
    fn test_multiple_items_stay_a_list() {
        let result = json!({"content": [
            {"type": "text", "text": "first"},
            {"type": "text", "text": "second"}
        ]});
        assert_eq!(
            normalize_tool_result("t", &result).unwrap(),
            json!(["first", "second"])
        );
    }

    #[test]
    fn test_json_text_is_parsed() {
        let result = json!({"content": [{"type": "text", "text": " {\"results\": [1, 2]} "}]});
        assert_eq!(
            normalize_tool_result("t", &result).unwrap(),
            json!({"results": [1, 2]})
        );
    }

    #[test]
    fn test_non_json_text_is_verbatim() {
        assert_eq!(parse_json_text("plain words"), json!("plain words"));
        assert_eq!(parse_json_text("{not json}"), json!("{not json}"));
        assert_eq!(parse_json_text("[1, 2"), json!("[1, 2"));
        assert_eq!(parse_json_text("42"), json!("42"));
    }

    #[test]
    fn test_image_items_pass_through() {
        let image = json!({"type": "image", "data": "AAAA", "mimeType": "image/png"});
        let result = json!({"content": [image.clone()]});
        assert_eq!(normalize_tool_result("t", &result).unwrap(), image);
    }

    #[test]
    fn test_structured_content_preferred() {
        let result = json!({
            "content": [{"type": "text", "text": "ignored"}],
            "structuredContent": {"temperature": 21}
        });
        assert_eq!(
            normalize_tool_result("t", &result).unwrap(),
            json!({"temperature": 21})
        );
    }

    #[test]
    fn test_empty_content_is_null() {
        let result = json!({"content": []});
        assert_eq!(normalize_tool_result("t", &result).unwrap(), Value::Null);
    }

    #[test]
    fn test_is_error_becomes_remote_error() {
        let result = json!({
            "isError": true,
            "content": [{"type": "text", "text": "page not found"}]
        });
        let err = normalize_tool_result("API-get-page", &result).unwrap_err();
        assert!(err.is_invocation());
        assert!(err.to_string().contains("page not found"));
    }

    #[test]
    fn test_resource_contents() {
        let result = json!({"contents": [{"uri": "file:///a.json", "text": "{\"a\": 1}"}]});
        assert_eq!(normalize_resource_contents(&result), json!({"a": 1}));

        let blob = json!({"uri": "file:///a.bin", "blob": "AAAA"});
        let result = json!({"contents": [blob.clone(), {"uri": "file:///b.txt", "text": "b"}]});
        assert_eq!(normalize_resource_contents(&result), json!([blob, "b"]));
    }
}
