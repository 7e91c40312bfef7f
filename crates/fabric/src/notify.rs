// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced notification broker.
//!
//! Subscribes to fabric events and collapses bursts into one "you
//! have mail" nudge per recipient. Dispatch goes through the
//! [`NotificationSink`] seam so the engine decides how a nudge
//! reaches a process.

use crate::event::FabricEvent;
use crate::fabric::Fabric;
use crate::thread::{SubscriptionMode, ThreadId};
use async_trait::async_trait;
use crew_core::AgentId;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Errors from delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("deliver failed: {0}")]
    Deliver(String),
}

/// Delivers a rendered nudge to a recipient's process.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn deliver(&self, recipient: AgentId, body: String) -> Result<(), NotifyError>;
}

/// Broker policy.
#[derive(Debug, Clone)]
pub struct NotifyPolicy {
    /// Quiet window before a recipient's batch is flushed. New events
    /// for the recipient reset the window.
    pub debounce: Duration,
    /// Channel slugs whose messages never notify anyone.
    pub suppressed: HashSet<String>,
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(50),
            suppressed: HashSet::from(["observer".to_string()]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingEntry {
    sender: String,
    channel_slug: String,
    root_id: ThreadId,
}

struct PendingBatch {
    entries: Vec<PendingEntry>,
    deadline: Instant,
}

/// Singleton dispatch task fed by fabric events.
pub struct NotificationBroker {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationBroker {
    /// Subscribe to the fabric and start dispatching.
    pub fn start(
        fabric: Arc<Fabric>,
        sink: Arc<dyn NotificationSink>,
        policy: NotifyPolicy,
    ) -> Self {
        let cancel = CancellationToken::new();
        let rx = fabric.events().subscribe(cancel.child_token());
        let task = tokio::spawn(dispatch_loop(fabric, sink, policy, rx, cancel.clone()));
        Self {
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Stop the broker, flushing all pending batches first.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "notification dispatch task failed");
            }
        }
    }
}

async fn dispatch_loop(
    fabric: Arc<Fabric>,
    sink: Arc<dyn NotificationSink>,
    policy: NotifyPolicy,
    mut rx: tokio::sync::mpsc::Receiver<FabricEvent>,
    cancel: CancellationToken,
) {
    let mut pending: HashMap<String, PendingBatch> = HashMap::new();
    loop {
        let next_deadline = pending.values().map(|b| b.deadline).min();
        let sleep_target = next_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(60));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => enqueue(&fabric, &policy, &mut pending, event),
                None => break,
            },
            _ = tokio::time::sleep_until(sleep_target), if next_deadline.is_some() => {
                flush_due(&sink, &mut pending).await;
            }
        }
    }
    // Drain whatever is still pending on shutdown.
    for (recipient, batch) in pending.drain() {
        deliver(&sink, recipient, batch.entries).await;
    }
}

/// Compute the recipient set for one fabric event and add it to the
/// pending map, resetting each recipient's debounce window.
fn enqueue(
    fabric: &Fabric,
    policy: &NotifyPolicy,
    pending: &mut HashMap<String, PendingBatch>,
    event: FabricEvent,
) {
    let (channel_slug, root_id, sender, mentions, extra) = match event {
        FabricEvent::MessagePosted {
            channel_id,
            channel_slug,
            thread,
            mentions,
            ..
        } => {
            // Message roots notify mentions plus mode=all subscribers.
            let subscribers: BTreeSet<String> = fabric
                .subscribers(&channel_id, SubscriptionMode::All)
                .into_iter()
                .collect();
            (
                channel_slug,
                thread.id.clone(),
                thread.created_by.normalized(),
                mentions,
                subscribers,
            )
        }
        FabricEvent::ReplyPosted {
            channel_slug,
            parent_id,
            thread,
            mentions,
            participants,
            ..
        } => (
            channel_slug,
            parent_id,
            thread.created_by.normalized(),
            mentions,
            participants,
        ),
        _ => return,
    };

    if policy.suppressed.contains(&channel_slug) {
        tracing::debug!(channel = %channel_slug, "notifications suppressed for channel");
        return;
    }

    let mut targets: BTreeSet<String> = mentions;
    targets.extend(extra);
    targets.remove(&sender);

    for target in targets {
        let entry = PendingEntry {
            sender: sender.clone(),
            channel_slug: channel_slug.clone(),
            root_id: root_id.clone(),
        };
        let batch = pending.entry(target).or_insert_with(|| PendingBatch {
            entries: Vec::new(),
            deadline: Instant::now(),
        });
        if !batch.entries.contains(&entry) {
            batch.entries.push(entry);
        }
        batch.deadline = Instant::now() + policy.debounce;
    }
}

async fn flush_due(sink: &Arc<dyn NotificationSink>, pending: &mut HashMap<String, PendingBatch>) {
    let now = Instant::now();
    let due: Vec<String> = pending
        .iter()
        .filter(|(_, batch)| batch.deadline <= now)
        .map(|(recipient, _)| recipient.clone())
        .collect();
    for recipient in due {
        if let Some(batch) = pending.remove(&recipient) {
            deliver(sink, recipient, batch.entries).await;
        }
    }
}

async fn deliver(sink: &Arc<dyn NotificationSink>, recipient: String, entries: Vec<PendingEntry>) {
    if entries.is_empty() {
        return;
    }
    let body = render_body(&entries);
    tracing::debug!(recipient = %recipient, count = entries.len(), "dispatching notification");
    if let Err(e) = sink.deliver(AgentId::new(recipient.clone()), body).await {
        tracing::warn!(recipient = %recipient, error = %e, "notification delivery failed");
    }
}

/// Render the nudge body: distinct senders and channels, plus the
/// tool calls the recipient should make next.
fn render_body(entries: &[PendingEntry]) -> String {
    let mut lines = Vec::with_capacity(entries.len() + 2);
    let noun = if entries.len() == 1 {
        "message"
    } else {
        "messages"
    };
    lines.push(format!("You have {} new {noun}:", entries.len()));
    for entry in entries {
        lines.push(format!(
            "- from {} in #{} (thread {})",
            entry.sender,
            entry.channel_slug,
            entry.root_id.short(8)
        ));
    }
    lines.push(
        "Call fabric_inbox to list unread messages and fabric_read_thread to read a thread."
            .to_string(),
    );
    lines.join("\n")
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
