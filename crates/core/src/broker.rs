// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic in-memory pub/sub broker.
//!
//! Fans typed events out to N ephemeral subscribers. Each subscriber
//! owns a bounded mailbox; when a mailbox is full the event is dropped
//! for that subscriber only, and publishers never block. Publishers
//! here are hot paths (fabric, worker pool, coordinator) and slow UI
//! consumers must not stall them.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default mailbox depth per subscriber.
const DEFAULT_MAILBOX: usize = 256;

struct Subscriber<E> {
    id: u64,
    tx: mpsc::Sender<E>,
    /// Set after the first dropped event so the warn fires once.
    dropped: bool,
}

struct BrokerState<E> {
    subscribers: Vec<Subscriber<E>>,
    next_id: u64,
    closed: bool,
}

/// Bounded multi-subscriber event fan-out.
pub struct Broker<E> {
    state: Arc<Mutex<BrokerState<E>>>,
    mailbox: usize,
}

impl<E> Clone for Broker<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            mailbox: self.mailbox,
        }
    }
}

impl<E> Default for Broker<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Broker<E> {
    pub fn new() -> Self {
        Self::with_mailbox(DEFAULT_MAILBOX)
    }

    /// Broker whose subscribers get mailboxes of the given depth.
    pub fn with_mailbox(mailbox: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                subscribers: Vec::new(),
                next_id: 0,
                closed: false,
            })),
            mailbox: mailbox.max(1),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Idempotent shutdown. Existing mailboxes close; later
    /// `subscribe` calls return an already-closed channel and later
    /// `publish` calls are discarded.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.subscribers.clear();
    }
}

impl<E: Clone + Send + 'static> Broker<E> {
    /// Register an ephemeral subscriber. When `lifetime` is cancelled
    /// the subscriber is removed and its mailbox closed.
    pub fn subscribe(&self, lifetime: CancellationToken) -> mpsc::Receiver<E> {
        let (tx, rx) = mpsc::channel(self.mailbox);
        let id = {
            let mut state = self.state.lock();
            if state.closed {
                // tx drops here; the receiver reads as closed.
                return rx;
            }
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.push(Subscriber {
                id,
                tx,
                dropped: false,
            });
            id
        };

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            lifetime.cancelled().await;
            state.lock().subscribers.retain(|s| s.id != id);
        });

        rx
    }

    /// Post an event to every live subscriber. Full mailboxes drop the
    /// event for that subscriber; closed mailboxes are pruned.
    pub fn publish(&self, event: E) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.subscribers.retain_mut(|sub| {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if !sub.dropped {
                        sub.dropped = true;
                        tracing::warn!(subscriber = sub.id, "slow subscriber, dropping events");
                    }
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
