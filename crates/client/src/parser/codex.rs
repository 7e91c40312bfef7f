// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codex adapter.
//!
//! `codex exec --json` streams thread/turn/item records; this adapter
//! remaps them onto the canonical enum.

use super::base;
use super::{EventParser, ParseError};
use crew_core::{ContentBlock, EventMessage, EventType, OutputEvent, ToolInfo};

const CONTEXT_WINDOW: u64 = 400_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct CodexParser;

impl EventParser for CodexParser {
    fn parse_event(&self, line: &str) -> Result<OutputEvent, ParseError> {
        let value = base::parse_object(line)?;
        let record_type = base::get_str(&value, "type").unwrap_or_default();

        let mut event = OutputEvent {
            session_id: base::get_str(&value, "thread_id")
                .unwrap_or_default()
                .to_string(),
            ..OutputEvent::default()
        };

        match record_type {
            "thread.started" => {
                event.event_type = EventType::System;
                event.subtype = "init".to_string();
                if let Some(model) = base::get_str(&value, "model") {
                    event.message = Some(EventMessage {
                        role: "system".to_string(),
                        model: Some(model.to_string()),
                        content: Vec::new(),
                    });
                }
            }
            "turn.started" => {
                event.event_type = EventType::System;
                event.subtype = "turn_started".to_string();
            }
            "item.started" | "item.updated" | "item.completed" => {
                map_item(&mut event, &value, record_type)?;
            }
            "turn.completed" => {
                event.event_type = EventType::Result;
                // Codex reports cumulative usage on turn.completed; it
                // omits cache-creation counts entirely, so usage seen
                // on assistant items (when present) is preferred by
                // consumers and tagged with its source.
                // TODO: drop the assistant-side fallback once codex
                // reports cache tokens on turn.completed.
                if let Some(usage) = value.get("usage") {
                    event.usage = Some(base::parse_usage(usage));
                }
            }
            "turn.failed" => {
                event.event_type = EventType::Result;
                event.is_error_result = true;
                event.error = value.get("error").map(base::decode_error);
                event.result = event.error.as_ref().map(|e| e.message.clone());
            }
            "error" => {
                event.event_type = EventType::Error;
                event.error = Some(match value.get("error") {
                    Some(inner) => base::decode_error(inner),
                    None => base::decode_error(&value),
                });
            }
            other => {
                return Err(ParseError::Unrecognized(format!(
                    "codex record type {other:?}"
                )));
            }
        }

        base::promote_context_exceeded(&mut event);
        Ok(event)
    }

    /// Codex only names the thread on `thread.started`; later records
    /// carry it at unpredictable depths, so fall back to scanning the
    /// raw line.
    fn extract_session_ref(&self, event: &OutputEvent, raw: &str) -> String {
        if !event.session_id.is_empty() {
            return event.session_id.clone();
        }
        serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .and_then(|v| find_thread_id(&v))
            .unwrap_or_default()
    }

    fn context_window(&self) -> u64 {
        CONTEXT_WINDOW
    }
}

fn map_item(
    event: &mut OutputEvent,
    value: &serde_json::Value,
    record_type: &str,
) -> Result<(), ParseError> {
    let Some(item) = value.get("item") else {
        return Err(ParseError::Unrecognized("codex item record without item".into()));
    };
    let item_type = base::get_str(item, "type").unwrap_or_default();
    match item_type {
        "agent_message" => {
            event.event_type = EventType::Assistant;
            let text = base::get_str(item, "text").unwrap_or_default().to_string();
            event.message = Some(EventMessage {
                role: "assistant".to_string(),
                model: None,
                content: vec![ContentBlock::Text { text }],
            });
            if let Some(usage) = item.get("usage") {
                event.usage = Some(base::parse_usage(usage));
            }
        }
        "command_execution" | "file_change" | "mcp_tool_call" | "web_search" => {
            if record_type == "item.completed" {
                event.event_type = EventType::ToolResult;
                event.tool = Some(ToolInfo {
                    id: base::get_str(item, "id").unwrap_or_default().to_string(),
                    name: item_type.to_string(),
                    output: base::get_str(item, "aggregated_output")
                        .or_else(|| base::get_str(item, "output"))
                        .unwrap_or_default()
                        .to_string(),
                });
            } else {
                // In-flight tool items map to plain system progress.
                event.event_type = EventType::System;
                event.subtype = item_type.to_string();
            }
        }
        "reasoning" | "todo_list" => {
            event.event_type = EventType::System;
            event.subtype = item_type.to_string();
        }
        "error" => {
            event.event_type = EventType::Error;
            event.error = Some(base::decode_error(item));
        }
        other => {
            return Err(ParseError::Unrecognized(format!(
                "codex item type {other:?}"
            )));
        }
    }
    Ok(())
}

fn find_thread_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(id) = map.get("thread_id").and_then(|v| v.as_str()) {
                return Some(id.to_string());
            }
            map.values().find_map(find_thread_id)
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "codex_tests.rs"]
mod tests;
