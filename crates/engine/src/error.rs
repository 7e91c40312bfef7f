// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine.

use crate::coordinator::CoordinatorStatus;
use crate::worker::WorkerStatus;
use crew_client::SpawnError;
use crew_fabric::FabricError;
use thiserror::Error;

/// Errors from worker pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
    #[error("worker pool at capacity ({0} active workers)")]
    MaxWorkers(usize),
    #[error("worker not found: {0}")]
    WorkerNotFound(String),
    #[error("worker {worker} is {actual}, expected {expected}")]
    InvalidStatus {
        worker: String,
        expected: WorkerStatus,
        actual: WorkerStatus,
    },
    #[error("worker {0} is retired")]
    WorkerRetired(String),
    #[error("spawn failed: {0}")]
    Spawn(#[from] SpawnError),
}

/// Errors from coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator is {0}, expected {1}")]
    InvalidStatus(CoordinatorStatus, CoordinatorStatus),
    #[error("coordinator is not running (status {0})")]
    NotRunning(CoordinatorStatus),
    #[error("message queue is full ({0} pending)")]
    QueueFull(usize),
    #[error("no active process")]
    NoActiveProcess,
    #[error("spawn failed: {0}")]
    Spawn(#[from] SpawnError),
    #[error("mcp config: {0}")]
    McpConfig(#[from] std::io::Error),
}

/// Errors surfaced to assistants from tool calls.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("unknown channel {0:?} (expected tasks, planning, general, system, or observer)")]
    InvalidChannel(String),
    #[error(transparent)]
    Fabric(#[from] FabricError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}
