// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenCode adapter.
//!
//! OpenCode nests everything under `part` records with dotted types;
//! only the subset the runtime consumes is mapped, the rest becomes
//! system progress.

use super::base;
use super::{EventParser, ParseError};
use crew_core::{ContentBlock, EventMessage, EventType, OutputEvent, ToolInfo};

const CONTEXT_WINDOW: u64 = 200_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCodeParser;

impl EventParser for OpenCodeParser {
    fn parse_event(&self, line: &str) -> Result<OutputEvent, ParseError> {
        let value = base::parse_object(line)?;
        let record_type = base::get_str(&value, "type").unwrap_or_default();

        let mut event = OutputEvent {
            session_id: base::get_str(&value, "sessionID")
                .or_else(|| base::get_str(&value, "session_id"))
                .unwrap_or_default()
                .to_string(),
            ..OutputEvent::default()
        };

        match record_type {
            "session.created" | "init" => {
                event.event_type = EventType::System;
                event.subtype = "init".to_string();
                if let Some(model) = base::get_str(&value, "model")
                    .or_else(|| base::get_str(&value, "modelID"))
                {
                    event.message = Some(EventMessage {
                        role: "system".to_string(),
                        model: Some(model.to_string()),
                        content: Vec::new(),
                    });
                }
            }
            "text" | "message.part.updated" => {
                event.event_type = EventType::Assistant;
                let part = value.get("part").unwrap_or(&value);
                let text = base::get_str(part, "text").unwrap_or_default().to_string();
                event.message = Some(EventMessage {
                    role: "assistant".to_string(),
                    model: None,
                    content: vec![ContentBlock::Text { text }],
                });
            }
            "tool" | "tool.completed" => {
                event.event_type = EventType::ToolResult;
                let part = value.get("part").unwrap_or(&value);
                event.tool = Some(ToolInfo {
                    id: base::get_str(part, "id").unwrap_or_default().to_string(),
                    name: base::get_str(part, "tool").unwrap_or_default().to_string(),
                    output: base::get_str(part, "output").unwrap_or_default().to_string(),
                });
            }
            "step.finished" | "session.idle" | "result" => {
                event.event_type = EventType::Result;
                if let Some(usage) = value.get("tokens").or_else(|| value.get("usage")) {
                    event.usage = Some(base::parse_usage(usage));
                }
                event.total_cost_usd = value.get("cost").and_then(|v| v.as_f64());
            }
            "error" | "session.error" => {
                event.event_type = EventType::Error;
                event.error = Some(match value.get("error") {
                    Some(inner) => base::decode_error(inner),
                    None => base::decode_error(&value),
                });
            }
            _ => {
                // Unmapped part kinds are progress noise.
                event.event_type = EventType::System;
                event.subtype = record_type.to_string();
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
#[path = "opencode_tests.rs"]
mod tests;
