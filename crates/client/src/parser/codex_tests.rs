// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crew_core::EventType;

#[test]
fn thread_started_maps_to_init() {
    let line = r#"{"type":"thread.started","thread_id":"th-9","model":"gpt-model"}"#;
    let event = CodexParser.parse_event(line).unwrap();
    assert!(event.is_init());
    assert_eq!(event.session_id, "th-9");
    assert_eq!(event.model(), Some("gpt-model"));
}

#[test]
fn agent_message_maps_to_assistant() {
    let line = r#"{"type":"item.completed","item":{"type":"agent_message","text":"working on it"}}"#;
    let event = CodexParser.parse_event(line).unwrap();
    assert_eq!(event.event_type, EventType::Assistant);
    assert_eq!(event.text_blocks(), vec!["working on it"]);
}

#[test]
fn assistant_usage_is_carried_when_present() {
    let line = r#"{"type":"item.completed","item":{"type":"agent_message","text":"x","usage":{"input_tokens":40,"output_tokens":9,"cached_input_tokens":30}}}"#;
    let event = CodexParser.parse_event(line).unwrap();
    let usage = event.usage.unwrap();
    assert_eq!(usage.input_tokens, 40);
    assert_eq!(usage.cache_read_input_tokens, 30);
}

#[test]
fn completed_command_maps_to_tool_result() {
    let line = r#"{"type":"item.completed","item":{"type":"command_execution","id":"c1","aggregated_output":"ok"}}"#;
    let event = CodexParser.parse_event(line).unwrap();
    assert_eq!(event.event_type, EventType::ToolResult);
    assert_eq!(event.tool.unwrap().output, "ok");
}

#[test]
fn turn_completed_maps_to_result_with_usage() {
    let line = r#"{"type":"turn.completed","usage":{"input_tokens":100,"output_tokens":20}}"#;
    let event = CodexParser.parse_event(line).unwrap();
    assert_eq!(event.event_type, EventType::Result);
    assert_eq!(event.usage.unwrap().input_tokens, 100);
}

#[test]
fn turn_failed_is_an_error_result() {
    let line = r#"{"type":"turn.failed","error":{"message":"boom"}}"#;
    let event = CodexParser.parse_event(line).unwrap();
    assert_eq!(event.event_type, EventType::Result);
    assert!(event.is_error_result);
    assert_eq!(event.error.unwrap().message, "boom");
}

#[test]
fn session_ref_falls_back_to_raw_scan() {
    let line = r#"{"type":"turn.completed","usage":{},"meta":{"thread_id":"th-5"}}"#;
    let event = CodexParser.parse_event(line).unwrap();
    assert!(event.session_id.is_empty());
    assert_eq!(CodexParser.extract_session_ref(&event, line), "th-5");
}

#[test]
fn context_exhaustion_from_error_record() {
    let line = r#"{"type":"error","error":{"message":"context window exceeded"}}"#;
    let event = CodexParser.parse_event(line).unwrap();
    assert!(CodexParser.is_context_exhausted(&event));
}
