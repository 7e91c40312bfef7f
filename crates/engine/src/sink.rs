// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routes notification-broker nudges into processes.
//!
//! The coordinator gets nudges through its message serialization
//! point (so a busy coordinator queues them); Ready workers get a
//! resumed turn. Nudges for busy or retired workers are dropped;
//! their unread state is still visible in `fabric_inbox` on the next
//! turn.

use crate::coordinator::Coordinator;
use crate::pool::WorkerPool;
use crate::worker::WorkerStatus;
use async_trait::async_trait;
use crew_core::AgentId;
use crew_fabric::{NotificationSink, NotifyError};

pub struct EngineSink {
    coordinator: Coordinator,
    pool: WorkerPool,
}

impl EngineSink {
    pub fn new(coordinator: Coordinator, pool: WorkerPool) -> Self {
        Self { coordinator, pool }
    }
}

#[async_trait]
impl NotificationSink for EngineSink {
    async fn deliver(&self, recipient: AgentId, body: String) -> Result<(), NotifyError> {
        if recipient.is_coordinator() {
            return self
                .coordinator
                .notify(body)
                .await
                .map(|_| ())
                .map_err(|e| NotifyError::Deliver(e.to_string()));
        }

        if let Some(worker_id) = recipient.pool_worker_id() {
            let Some(worker) = self.pool.worker(&worker_id) else {
                tracing::debug!(worker_id = %worker_id, "nudge for unknown worker dropped");
                return Ok(());
            };
            match worker.status() {
                WorkerStatus::Ready => {
                    return self
                        .pool
                        .resume_worker(&worker_id, &body)
                        .await
                        .map_err(|e| NotifyError::Deliver(e.to_string()));
                }
                status => {
                    tracing::debug!(
                        worker_id = %worker_id,
                        status = %status,
                        "nudge dropped, worker will see inbox next turn"
                    );
                    return Ok(());
                }
            }
        }

        // The human user and unknown observers are the UI's concern.
        tracing::debug!(recipient = %recipient, "no process route for recipient");
        Ok(())
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
