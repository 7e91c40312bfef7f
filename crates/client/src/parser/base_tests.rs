// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crew_core::{EventType, OutputEvent};
use yare::parameterized;

#[parameterized(
    prompt_too_long = { "Prompt is too long" },
    window_exceeded = { "Context window exceeded for this request" },
    context_exceeded = { "CONTEXT EXCEEDED" },
    context_limit = { "you hit the context limit" },
    token_limit = { "Token Limit reached" },
    max_context = { "exceeds the maximum context length" },
)]
fn exhaustion_patterns_match_any_casing(message: &str) {
    assert!(message_matches_exhaustion(message));
}

#[test]
fn unrelated_messages_do_not_match() {
    assert!(!message_matches_exhaustion("rate limited, slow down"));
}

#[test]
fn decode_error_object() {
    let value = serde_json::json!({"code": "invalid_request", "message": "bad input"});
    let error = decode_error(&value);
    assert_eq!(error.code, "invalid_request");
    assert_eq!(error.message, "bad input");
}

#[test]
fn decode_error_plain_string_with_spaces_is_message() {
    let value = serde_json::json!("something went wrong");
    let error = decode_error(&value);
    assert_eq!(error.message, "something went wrong");
    assert!(error.code.is_empty());
}

#[test]
fn decode_error_single_token_string_is_code() {
    let value = serde_json::json!("invalid_request");
    let error = decode_error(&value);
    assert_eq!(error.code, "invalid_request");
}

#[test]
fn decode_error_string_with_embedded_json() {
    let value = serde_json::json!(
        "413 {\"type\":\"error\",\"error\":{\"type\":\"request_too_large\",\"message\":\"Prompt is too long\"}}"
    );
    let error = decode_error(&value);
    assert_eq!(error.code, "413");
    assert_eq!(error.message, "Prompt is too long");
}

#[test]
fn promote_sets_reason_from_message() {
    let mut event = OutputEvent {
        event_type: EventType::Error,
        error: Some(crew_core::EventError {
            message: "maximum context length exceeded".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    promote_context_exceeded(&mut event);
    assert_eq!(
        event.error.unwrap().reason,
        Some(crew_core::ErrorReason::ContextExceeded)
    );
}

#[test]
fn is_context_exhausted_without_error_is_false() {
    assert!(!is_context_exhausted(&OutputEvent::default()));
}

#[test]
fn parse_usage_accepts_both_spellings() {
    let snake = serde_json::json!({"input_tokens": 1, "output_tokens": 2, "cache_read_input_tokens": 3});
    let camel = serde_json::json!({"inputTokens": 1, "outputTokens": 2, "cacheReadInputTokens": 3});
    assert_eq!(parse_usage(&snake), parse_usage(&camel));
}

#[test]
fn flatten_result_content_handles_string_and_blocks() {
    assert_eq!(
        flatten_result_content(Some(&serde_json::json!("plain"))),
        "plain"
    );
    assert_eq!(
        flatten_result_content(Some(&serde_json::json!([
            {"type": "text", "text": "a"},
            {"type": "text", "text": "b"},
        ]))),
        "a\nb"
    );
}

#[test]
fn parse_object_rejects_non_objects() {
    assert!(parse_object("[1,2]").is_err());
    assert!(parse_object("not json").is_err());
}

#[test]
fn truncate_respects_char_boundaries() {
    let s = "héllo wörld";
    let out = truncate(s, 6);
    assert!(out.ends_with("..."));
}
