// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crew-engine: worker pool, coordinator lifecycle, and the tool
//! surface assistants call into.
//!
//! Wiring order: build a [`WorkerPool`] and a `crew_fabric::Fabric`,
//! hand both to a [`Coordinator`], then start a
//! `crew_fabric::NotificationBroker` with an [`EngineSink`] so fabric
//! activity turns into nudges delivered through the pool and
//! coordinator.

pub mod coordinator;
pub mod error;
pub mod events;
pub mod pool;
pub mod sink;
pub mod tools;
pub mod worker;

pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorStatus, QueuedMessage, SendOutcome,
};
pub use error::{CoordinatorError, PoolError, ToolError};
pub use events::{ChatRole, CoordinatorEvent, WorkerEvent};
pub use pool::{WorkerPool, WorkerPoolConfig, WorkerSpawnSpec};
pub use sink::EngineSink;
pub use tools::{ToolResponse, ToolRouter};
pub use worker::{Worker, WorkerSnapshot, WorkerStatus};
