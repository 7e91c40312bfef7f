// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Semantic error taxonomy shared across layers.
//!
//! Worker and coordinator event loops classify incoming vendor errors
//! into this taxonomy and publish a typed event; nothing auto-retries.

use crate::event::{ErrorReason, EventError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cross-layer error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input from the assistant CLI.
    InvalidRequest,
    /// Throttled by the vendor; the caller may retry.
    RateLimited,
    /// The session's context window is full.
    ContextExceeded,
    /// The process deadline fired.
    Timeout,
    /// Binary not found, pipe setup failed, or early exit.
    SpawnFailed,
    /// Event or error dropped for a slow subscriber. Logged only.
    ConsumerFull,
    /// Anything else, carrying the vendor's original message.
    Unknown,
}

impl ErrorKind {
    /// Classify a decoded vendor error.
    pub fn classify(error: &EventError) -> Self {
        if error.reason == Some(ErrorReason::ContextExceeded) {
            return Self::ContextExceeded;
        }
        let code = error.code.to_lowercase();
        let kind = error.kind.to_lowercase();
        if code.contains("rate_limit") || kind.contains("rate_limit") || code == "429" {
            return Self::RateLimited;
        }
        if code.contains("invalid_request") || kind.contains("invalid_request") || code == "400" {
            return Self::InvalidRequest;
        }
        Self::Unknown
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ContextExceeded => "context_exceeded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::SpawnFailed => "spawn_failed",
            ErrorKind::ConsumerFull => "consumer_full",
            ErrorKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A classified failure carried on worker and coordinator events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify and wrap a decoded vendor error.
    pub fn from_event_error(error: &EventError) -> Self {
        let message = if error.message.is_empty() {
            error.code.clone()
        } else {
            error.message.clone()
        };
        Self {
            kind: ErrorKind::classify(error),
            message,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
