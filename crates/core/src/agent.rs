// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identifiers.
//!
//! An agent is any participant in the message fabric: the coordinator,
//! the human user, a pool worker, or an observer. Identifiers are
//! case-preserving strings; fabric membership checks (mentions,
//! participants, subscriptions) compare the lower-cased form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a fabric participant.
///
/// Well-known values are `COORDINATOR`, `USER`, and `worker-N`. Workers
/// are also addressable as `worker.N` / `WORKER.N` in message mentions;
/// [`AgentId::worker_ordinal`] accepts all three spellings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The coordinator session.
    pub fn coordinator() -> Self {
        Self("COORDINATOR".to_string())
    }

    /// The human user (messages relayed by the UI).
    pub fn user() -> Self {
        Self("USER".to_string())
    }

    /// Pool worker with the given ordinal, formatted `worker-N`.
    pub fn worker(ordinal: u64) -> Self {
        Self(format!("worker-{ordinal}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used for fabric membership checks.
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }

    /// Case-insensitive identity comparison.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }

    pub fn is_coordinator(&self) -> bool {
        self.matches("COORDINATOR")
    }

    pub fn is_user(&self) -> bool {
        self.matches("USER")
    }

    /// Parse the worker ordinal out of `worker-N`, `worker.N`, or any
    /// casing thereof. Returns `None` for non-worker agents.
    pub fn worker_ordinal(&self) -> Option<u64> {
        let lower = self.normalized();
        let rest = lower.strip_prefix("worker")?;
        let rest = rest.strip_prefix('-').or_else(|| rest.strip_prefix('.'))?;
        rest.parse().ok()
    }

    /// Canonical pool identifier (`worker-N`) for any worker spelling.
    pub fn pool_worker_id(&self) -> Option<String> {
        self.worker_ordinal().map(|n| format!("worker-{n}"))
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for AgentId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for AgentId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::borrow::Borrow<str> for AgentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
