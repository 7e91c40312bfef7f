// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crew-core: shared types for the crew multi-agent runtime
//!
//! Leaf crate of the workspace. Holds the canonical assistant output
//! event model, agent identifiers, token accounting, the error
//! taxonomy, the generic pub/sub broker, and the per-worker output
//! ring buffer. Everything here is runtime-agnostic except the broker,
//! which spawns one reaper task per subscriber.

pub mod agent;
pub mod broker;
pub mod buffer;
pub mod error;
pub mod event;
pub mod metrics;

pub use agent::AgentId;
pub use broker::Broker;
pub use buffer::OutputBuffer;
pub use error::{ErrorKind, Failure};
pub use event::{
    now_millis, ContentBlock, ErrorReason, EventError, EventMessage, EventType, ModelUsage,
    OutputEvent, ToolInfo, Usage,
};
pub use metrics::{TokenMetrics, UsageSource};
