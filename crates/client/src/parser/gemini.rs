// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gemini CLI adapter.

use super::base;
use super::{EventParser, ParseError};
use crew_core::{ContentBlock, EventMessage, EventType, OutputEvent, ToolInfo};

const CONTEXT_WINDOW: u64 = 1_048_576;

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiParser;

impl EventParser for GeminiParser {
    fn parse_event(&self, line: &str) -> Result<OutputEvent, ParseError> {
        let value = base::parse_object(line)?;
        let record_type = base::get_str(&value, "type").unwrap_or_default();

        let mut event = OutputEvent {
            session_id: base::get_str(&value, "session_id")
                .or_else(|| base::get_str(&value, "sessionId"))
                .unwrap_or_default()
                .to_string(),
            ..OutputEvent::default()
        };

        match record_type {
            "init" | "session.start" => {
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
            "assistant" | "content" | "message" => {
                event.event_type = EventType::Assistant;
                let text = base::get_str(&value, "text")
                    .or_else(|| base::get_str(&value, "content"))
                    .unwrap_or_default()
                    .to_string();
                event.message = Some(EventMessage {
                    role: "assistant".to_string(),
                    model: base::get_str(&value, "model").map(str::to_string),
                    content: vec![ContentBlock::Text { text }],
                });
            }
            "tool_result" | "tool_call_result" => {
                event.event_type = EventType::ToolResult;
                event.tool = Some(ToolInfo {
                    id: base::get_str(&value, "id").unwrap_or_default().to_string(),
                    name: base::get_str(&value, "name").unwrap_or_default().to_string(),
                    output: base::get_str(&value, "output").unwrap_or_default().to_string(),
                });
            }
            "result" | "turn_complete" => {
                event.event_type = EventType::Result;
                event.is_error_result = value
                    .get("is_error")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                event.result = base::get_str(&value, "result").map(str::to_string);
                if let Some(usage) = value.get("usage").or_else(|| value.get("stats")) {
                    event.usage = Some(base::parse_usage(usage));
                }
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
                    "gemini record type {other:?}"
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

#[cfg(test)]
#[path = "gemini_tests.rs"]
mod tests;
