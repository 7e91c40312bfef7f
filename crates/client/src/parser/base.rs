// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared parsing helpers for all vendor adapters.

use crew_core::{ContentBlock, ErrorReason, EventError, ModelUsage, OutputEvent, Usage};
use serde_json::Value;
use std::collections::HashMap;

/// Phrases that mark context-window exhaustion, matched against the
/// lower-cased error message.
pub const EXHAUSTION_PATTERNS: [&str; 6] = [
    "prompt is too long",
    "context window exceeded",
    "context exceeded",
    "context limit",
    "token limit",
    "maximum context length",
];

/// Case-insensitive match of a message against the exhaustion set.
pub fn message_matches_exhaustion(message: &str) -> bool {
    let lower = message.to_lowercase();
    EXHAUSTION_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Extract a string value from a JSON object by key.
pub fn get_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

/// Extract a u64 value from a JSON object by key.
pub fn get_u64(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(|v| v.as_u64())
}

/// Decode the polymorphic vendor `error` field.
///
/// Tries object-first (`{code, message}`), then string-with-embedded
/// JSON (e.g. `"413 {...}"`), then plain string. Single-token strings
/// are treated as a code, anything with whitespace as a message.
pub fn decode_error(value: &Value) -> EventError {
    match value {
        Value::Object(_) => {
            let code = get_str(value, "code")
                .or_else(|| get_str(value, "type"))
                .unwrap_or_default()
                .to_string();
            let kind = get_str(value, "kind")
                .or_else(|| get_str(value, "type"))
                .unwrap_or_default()
                .to_string();
            let message = get_str(value, "message")
                .map(str::to_string)
                .or_else(|| {
                    // Nested error objects ({"error": {"message": ...}}).
                    value.get("error").map(|inner| decode_error(inner).message)
                })
                .unwrap_or_default();
            EventError {
                kind,
                code,
                message,
                reason: None,
            }
        }
        Value::String(s) => decode_error_string(s),
        other => EventError {
            message: other.to_string(),
            ..EventError::default()
        },
    }
}

fn decode_error_string(s: &str) -> EventError {
    // Embedded JSON: "413 {\"type\":\"error\",...}"
    if let Some(start) = s.find('{') {
        if let Ok(inner) = serde_json::from_str::<Value>(&s[start..]) {
            if inner.is_object() {
                let mut error = decode_error(&inner);
                if error.code.is_empty() {
                    error.code = s[..start].trim().to_string();
                }
                return error;
            }
        }
    }
    let trimmed = s.trim();
    if trimmed.contains(char::is_whitespace) {
        EventError {
            message: trimmed.to_string(),
            ..EventError::default()
        }
    } else {
        EventError {
            code: trimmed.to_string(),
            ..EventError::default()
        }
    }
}

/// Promote `error.reason` to `context_exceeded` when the decoded error
/// matches any known exhaustion pattern.
pub fn promote_context_exceeded(event: &mut OutputEvent) {
    let Some(error) = event.error.as_mut() else {
        return;
    };
    if error.reason.is_some() {
        return;
    }
    if message_matches_exhaustion(&error.message) || message_matches_exhaustion(&error.code) {
        error.reason = Some(ErrorReason::ContextExceeded);
    }
}

/// Default exhaustion check used by every adapter.
pub fn is_context_exhausted(event: &OutputEvent) -> bool {
    match &event.error {
        Some(error) => {
            error.reason == Some(ErrorReason::ContextExceeded)
                || message_matches_exhaustion(&error.message)
        }
        None => false,
    }
}

/// Parse a usage block tolerating camelCase and snake_case key spellings.
pub fn parse_usage(value: &Value) -> Usage {
    Usage {
        input_tokens: get_u64(value, "input_tokens")
            .or_else(|| get_u64(value, "inputTokens"))
            .unwrap_or_default(),
        output_tokens: get_u64(value, "output_tokens")
            .or_else(|| get_u64(value, "outputTokens"))
            .unwrap_or_default(),
        cache_read_input_tokens: get_u64(value, "cache_read_input_tokens")
            .or_else(|| get_u64(value, "cacheReadInputTokens"))
            .or_else(|| get_u64(value, "cached_input_tokens"))
            .unwrap_or_default(),
        cache_creation_input_tokens: get_u64(value, "cache_creation_input_tokens")
            .or_else(|| get_u64(value, "cacheCreationInputTokens"))
            .unwrap_or_default(),
    }
}

/// Parse a per-model usage map (`modelUsage` / `model_usage`).
pub fn parse_model_usage(value: &Value) -> HashMap<String, ModelUsage> {
    let Some(map) = value.as_object() else {
        return HashMap::new();
    };
    map.iter()
        .map(|(model, entry)| {
            let usage = parse_usage(entry);
            (
                model.clone(),
                ModelUsage {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    cache_read_input_tokens: usage.cache_read_input_tokens,
                    cache_creation_input_tokens: usage.cache_creation_input_tokens,
                    context_window: get_u64(entry, "contextWindow")
                        .or_else(|| get_u64(entry, "context_window"))
                        .unwrap_or_default(),
                    cost_usd: entry
                        .get("costUSD")
                        .or_else(|| entry.get("cost_usd"))
                        .and_then(|v| v.as_f64())
                        .unwrap_or_default(),
                },
            )
        })
        .collect()
}

/// Parse assistant message content blocks.
pub fn parse_content(value: &Value) -> Vec<ContentBlock> {
    let Some(blocks) = value.as_array() else {
        return Vec::new();
    };
    blocks
        .iter()
        .filter_map(|block| match get_str(block, "type") {
            Some("text") => Some(ContentBlock::Text {
                text: get_str(block, "text").unwrap_or_default().to_string(),
            }),
            Some("tool_use") => Some(ContentBlock::ToolUse {
                id: get_str(block, "id").unwrap_or_default().to_string(),
                name: get_str(block, "name").unwrap_or_default().to_string(),
                input: block.get("input").cloned().unwrap_or(Value::Null),
            }),
            Some("tool_result") => Some(ContentBlock::ToolResult {
                tool_use_id: get_str(block, "tool_use_id").unwrap_or_default().to_string(),
                text: flatten_result_content(block.get("content")),
            }),
            _ => None,
        })
        .collect()
}

/// Tool result content may be a plain string or a list of text blocks.
pub fn flatten_result_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| get_str(b, "text"))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Parse a line into a JSON object, rejecting non-object values.
pub fn parse_object(line: &str) -> Result<Value, super::ParseError> {
    let value: Value = serde_json::from_str(line)?;
    if !value.is_object() {
        return Err(super::ParseError::NotAnObject(truncate(line, 80)));
    }
    Ok(value)
}

/// Truncate a line for inclusion in error messages.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
#[path = "base_tests.rs"]
mod tests;
