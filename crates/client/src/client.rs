// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client adapter seam between the engine and the process layer.
//!
//! The engine spawns turns through [`AssistantClient`] so tests can
//! substitute scripted processes for real vendor CLIs.

use crate::config::SpawnConfig;
use crate::process::{Process, ProcessError, ProcessStatus, SpawnError};
use async_trait::async_trait;
use crew_core::OutputEvent;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Spawns one assistant turn.
#[async_trait]
pub trait AssistantClient: Send + Sync + 'static {
    async fn spawn(
        &self,
        ctx: &CancellationToken,
        config: SpawnConfig,
    ) -> Result<Process, SpawnError>;
}

/// Production client: resolves and executes the vendor CLI binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliClient;

#[async_trait]
impl AssistantClient for CliClient {
    async fn spawn(
        &self,
        ctx: &CancellationToken,
        config: SpawnConfig,
    ) -> Result<Process, SpawnError> {
        Process::spawn(ctx, config)
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use scripted::{ScriptHandle, ScriptedClient};

#[cfg(any(test, feature = "test-support"))]
mod scripted {
    use super::*;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    /// Remote control for one scripted process.
    ///
    /// Senders live behind options so `finish` can drop them, closing
    /// the streams in the same order a real exit does.
    #[derive(Clone)]
    pub struct ScriptHandle {
        pub config: SpawnConfig,
        events: Arc<Mutex<Option<mpsc::Sender<OutputEvent>>>>,
        errors: Arc<Mutex<Option<mpsc::Sender<ProcessError>>>>,
        status: Arc<Mutex<ProcessStatus>>,
        session_ref: Arc<Mutex<String>>,
    }

    impl ScriptHandle {
        /// Feed one event into the scripted stream.
        pub async fn emit(&self, event: OutputEvent) {
            let tx = self.events.lock().clone();
            if let Some(tx) = tx {
                let _ = tx.send(event).await;
            }
        }

        /// Feed a terminal error.
        pub async fn fail(&self, error: ProcessError) {
            let tx = self.errors.lock().clone();
            if let Some(tx) = tx {
                let _ = tx.send(error).await;
            }
        }

        /// Set the final status, then close both streams. The status
        /// store happens before the channels close, so consumers that
        /// observe the close always read the final status.
        pub fn finish(&self, status: ProcessStatus) {
            *self.status.lock() = status;
            self.events.lock().take();
            self.errors.lock().take();
        }

        pub fn set_session_ref(&self, session: impl Into<String>) {
            *self.session_ref.lock() = session.into();
        }

        pub fn status(&self) -> ProcessStatus {
            *self.status.lock()
        }
    }

    /// Fake client that hands out scripted processes and records
    /// every spawn config.
    #[derive(Clone, Default)]
    pub struct ScriptedClient {
        handles: Arc<Mutex<Vec<ScriptHandle>>>,
        /// When set, the next spawn fails with this message.
        fail_next: Arc<Mutex<Option<String>>>,
    }

    impl ScriptedClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next spawn return a spawn error.
        pub fn fail_next_spawn(&self, message: impl Into<String>) {
            *self.fail_next.lock() = Some(message.into());
        }

        pub fn spawn_count(&self) -> usize {
            self.handles.lock().len()
        }

        /// Handle for the i-th spawn (0-based).
        pub fn handle(&self, index: usize) -> Option<ScriptHandle> {
            self.handles.lock().get(index).cloned()
        }

        /// Handle for the most recent spawn.
        pub fn last_handle(&self) -> Option<ScriptHandle> {
            self.handles.lock().last().cloned()
        }

        /// Spawn configs observed so far.
        pub fn configs(&self) -> Vec<SpawnConfig> {
            self.handles.lock().iter().map(|h| h.config.clone()).collect()
        }
    }

    #[async_trait]
    impl AssistantClient for ScriptedClient {
        async fn spawn(
            &self,
            ctx: &CancellationToken,
            config: SpawnConfig,
        ) -> Result<Process, SpawnError> {
            if let Some(message) = self.fail_next.lock().take() {
                return Err(SpawnError::Spawn {
                    binary: config.client.binary_name().to_string(),
                    source: std::io::Error::other(message),
                });
            }
            let (process, events_tx, errors_tx, status, session_ref, cancel) =
                Process::scripted();
            let handle = ScriptHandle {
                config,
                events: Arc::new(Mutex::new(Some(events_tx))),
                errors: Arc::new(Mutex::new(Some(errors_tx))),
                status,
                session_ref,
            };
            // Cancelling the process, or the context it was spawned
            // under, closes its streams like a real child being killed.
            let watcher = handle.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = ctx.cancelled() => {}
                }
                watcher.events.lock().take();
                watcher.errors.lock().take();
            });
            self.handles.lock().push(handle.clone());
            Ok(process)
        }
    }
}
