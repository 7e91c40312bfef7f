// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude Code adapter.
//!
//! Claude's `--output-format stream-json` dialect is the closest to
//! the canonical shape: `system`/`assistant`/`user`/`result` records,
//! with tool results arriving inside `user` records.

use super::base;
use super::{EventParser, ParseError};
use crew_core::{
    ContentBlock, ErrorReason, EventError, EventMessage, EventType, OutputEvent, ToolInfo,
};

const CONTEXT_WINDOW: u64 = 200_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeParser;

impl EventParser for ClaudeParser {
    fn parse_event(&self, line: &str) -> Result<OutputEvent, ParseError> {
        let value = base::parse_object(line)?;
        let record_type = base::get_str(&value, "type").unwrap_or_default();

        let mut event = OutputEvent {
            subtype: base::get_str(&value, "subtype").unwrap_or_default().to_string(),
            session_id: base::get_str(&value, "session_id")
                .unwrap_or_default()
                .to_string(),
            work_dir: base::get_str(&value, "cwd").unwrap_or_default().to_string(),
            ..OutputEvent::default()
        };

        match record_type {
            "system" => {
                event.event_type = EventType::System;
                // Init records name the main model.
                if event.subtype == "init" {
                    if let Some(model) = base::get_str(&value, "model") {
                        event.message = Some(EventMessage {
                            role: "system".to_string(),
                            model: Some(model.to_string()),
                            content: Vec::new(),
                        });
                    }
                }
            }
            "assistant" => {
                event.event_type = EventType::Assistant;
                if let Some(message) = value.get("message") {
                    event.message = Some(EventMessage {
                        role: base::get_str(message, "role").unwrap_or("assistant").to_string(),
                        model: base::get_str(message, "model").map(str::to_string),
                        content: message
                            .get("content")
                            .map(base::parse_content)
                            .unwrap_or_default(),
                    });
                    if let Some(usage) = message.get("usage") {
                        event.usage = Some(base::parse_usage(usage));
                    }
                }
            }
            "user" => {
                // Tool results come back wrapped in user records.
                event.event_type = EventType::ToolResult;
                if let Some(message) = value.get("message") {
                    let content = message
                        .get("content")
                        .map(base::parse_content)
                        .unwrap_or_default();
                    event.tool = content.iter().find_map(|block| match block {
                        ContentBlock::ToolResult { tool_use_id, text } => Some(ToolInfo {
                            id: tool_use_id.clone(),
                            name: String::new(),
                            output: text.clone(),
                        }),
                        _ => None,
                    });
                }
            }
            "result" => {
                event.event_type = EventType::Result;
                event.is_error_result = value
                    .get("is_error")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
                    || event.subtype.starts_with("error");
                event.result = base::get_str(&value, "result").map(str::to_string);
                event.total_cost_usd =
                    value.get("total_cost_usd").and_then(|v| v.as_f64());
                event.duration_ms = base::get_u64(&value, "duration_ms");
                if let Some(usage) = value.get("usage") {
                    event.usage = Some(base::parse_usage(usage));
                }
                if let Some(model_usage) = value.get("modelUsage") {
                    event.model_usage = base::parse_model_usage(model_usage);
                }
            }
            "error" => {
                event.event_type = EventType::Error;
                event.error = Some(decode_claude_error(&value));
            }
            other => {
                return Err(ParseError::Unrecognized(format!(
                    "claude record type {other:?}"
                )));
            }
        }

        base::promote_context_exceeded(&mut event);
        Ok(event)
    }

    fn context_window(&self) -> u64 {
        CONTEXT_WINDOW
    }
}

/// Decode a top-level Claude error record.
///
/// The `error` field is polymorphic; the human-readable text often
/// lives in `message.content[].text` next to a `stop_reason`. A
/// `stop_sequence` stop combined with an `invalid_request` code is the
/// API's phrasing for a full context window.
fn decode_claude_error(value: &serde_json::Value) -> EventError {
    let mut error = value
        .get("error")
        .map(base::decode_error)
        .unwrap_or_default();

    let mut stop_reason = "";
    if let Some(message) = value.get("message") {
        stop_reason = base::get_str(message, "stop_reason").unwrap_or_default();
        if error.message.is_empty() {
            error.message = message
                .get("content")
                .map(|c| base::flatten_result_content(Some(c)))
                .unwrap_or_default();
        }
    }
    if error.message.is_empty() {
        if let Some(text) = base::get_str(value, "message") {
            error.message = text.to_string();
        }
    }

    if stop_reason == "stop_sequence" && error.code == "invalid_request" {
        error.reason = Some(ErrorReason::ContextExceeded);
    }
    error
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
