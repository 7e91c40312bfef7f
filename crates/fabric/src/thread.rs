// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fabric node types.
//!
//! Everything in the fabric is a [`Thread`]: channels, messages, and
//! artifact references. Edges between threads are [`Dependency`]
//! records; reply chains are always flattened so every reply hangs
//! directly off its root message.

use crew_core::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique identifier for a fabric thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a string slice truncated to at most `n` characters.
    pub fn short(&self, n: usize) -> &str {
        if self.0.len() <= n {
            &self.0
        } else {
            &self.0[..n]
        }
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What a thread node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadType {
    Channel,
    Message,
    Artifact,
}

/// Intent tag on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Info,
    Request,
    Response,
    Completion,
    Error,
}

/// Directed edge between two threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    ChildOf,
    ReplyTo,
    References,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub from: ThreadId,
    pub to: ThreadId,
    pub relation: Relation,
}

/// Stored reference to an on-disk artifact. Only metadata lives in the
/// fabric; the bytes stay at `storage_uri`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub name: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub storage_uri: String,
    pub sha256: String,
}

/// Per-channel notification preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionMode {
    /// Every message in the channel.
    #[default]
    All,
    /// Only when @-mentioned.
    Mentions,
    /// Never, though explicit mentions still notify.
    None,
}

/// A fabric node.
///
/// Invariant: `participants` always contains the creator and every
/// mentioned agent; both sets hold lower-cased agent ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub thread_type: ThreadType,
    pub created_at: u64,
    pub created_by: AgentId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    // Channel-only fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    // Artifact-only metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactMeta>,
    #[serde(default)]
    pub mentions: BTreeSet<String>,
    #[serde(default)]
    pub participants: BTreeSet<String>,
    /// Global fabric sequence number, strictly increasing across all
    /// mutating operations.
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<u64>,
}

impl Thread {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

#[cfg(test)]
#[path = "thread_tests.rs"]
mod tests;
