// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-vendor event parsers.
//!
//! One adapter per assistant CLI, each converting a line of that
//! vendor's streaming JSON into the canonical `OutputEvent`. The
//! shared [`base`] module handles what every vendor gets wrong the
//! same way: polymorphic error fields and context-window exhaustion
//! phrasing.

pub mod base;
mod claude;
mod codex;
mod gemini;
mod opencode;

pub use claude::ClaudeParser;
pub use codex::CodexParser;
pub use gemini::GeminiParser;
pub use opencode::OpenCodeParser;

use crew_core::OutputEvent;
use thiserror::Error;

/// Errors from parsing a single output line.
///
/// These are per-line failures; the process layer logs and skips them
/// so one bad line never kills the stream.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("expected a json object, got {0}")]
    NotAnObject(String),
    #[error("unrecognized event shape: {0}")]
    Unrecognized(String),
}

/// Contract for one vendor's streaming-JSON dialect.
pub trait EventParser: Send + Sync + 'static {
    /// Convert one stdout line into a canonical event. The returned
    /// event does not yet carry `raw` or `timestamp`; the process
    /// layer stamps both.
    fn parse_event(&self, line: &str) -> Result<OutputEvent, ParseError>;

    /// Extract a session reference, called for every event. Vendors
    /// that emit the session id outside the init event override this.
    fn extract_session_ref(&self, event: &OutputEvent, _raw: &str) -> String {
        event.session_id.clone()
    }

    /// Whether the event indicates the context window is full.
    fn is_context_exhausted(&self, event: &OutputEvent) -> bool {
        base::is_context_exhausted(event)
    }

    /// Context window of the vendor's default model, in tokens.
    fn context_window(&self) -> u64;
}
