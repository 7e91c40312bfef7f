// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine event types.
//!
//! Serializes with `{"type": "scope:name", ...fields}` format for UI
//! subscribers.

use crate::coordinator::CoordinatorStatus;
use crate::worker::WorkerStatus;
use crew_core::{Failure, TokenMetrics};
use serde::{Deserialize, Serialize};

/// Events published by the worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerEvent {
    #[serde(rename = "worker:spawned")]
    Spawned {
        worker_id: String,
        status: WorkerStatus,
    },

    #[serde(rename = "worker:status")]
    StatusChange {
        worker_id: String,
        status: WorkerStatus,
        phase: String,
    },

    /// A line of worker output (assistant text or a tool-use note).
    #[serde(rename = "worker:output")]
    Output { worker_id: String, text: String },

    #[serde(rename = "worker:token_usage")]
    TokenUsage {
        worker_id: String,
        metrics: TokenMetrics,
    },

    #[serde(rename = "worker:error")]
    Error { worker_id: String, error: Failure },
}

/// Role attached to a coordinator chat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Coordinator,
    System,
}

/// Events published by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoordinatorEvent {
    #[serde(rename = "coordinator:status")]
    StatusChange { status: CoordinatorStatus },

    #[serde(rename = "coordinator:chat")]
    Chat {
        role: ChatRole,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },

    /// The coordinator started processing a message.
    #[serde(rename = "coordinator:working")]
    Working,

    /// The coordinator finished a turn successfully.
    #[serde(rename = "coordinator:ready")]
    Ready,

    #[serde(rename = "coordinator:token_usage")]
    TokenUsage { metrics: TokenMetrics },

    #[serde(rename = "coordinator:error")]
    Error { error: Failure },
}
