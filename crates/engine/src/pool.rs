// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-capacity pool of persistent workers.
//!
//! The ceiling counts active (non-retired) workers; retired workers
//! stay in the registry for historical lookup. All worker events fan
//! out through one broker.

use crate::error::PoolError;
use crate::events::WorkerEvent;
use crate::worker::{self, Worker, WorkerStatus, DEFAULT_PHASE};
use crew_client::{AssistantClient, ClientKind, SpawnConfig};
use crew_core::Broker;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default ceiling of concurrently active workers.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default output ring depth per worker.
pub const DEFAULT_BUFFER_LINES: usize = 200;

/// Pool-wide configuration, applied to every worker spawn.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub max_workers: usize,
    pub buffer_lines: usize,
    pub client_kind: ClientKind,
    pub work_dir: PathBuf,
    pub model: Option<String>,
    pub append_system_prompt: Option<String>,
    pub mcp_config: Option<PathBuf>,
    pub skip_permissions: bool,
    pub disallowed_tools: Vec<String>,
    pub timeout: Option<Duration>,
}

impl WorkerPoolConfig {
    pub fn new(client_kind: ClientKind, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            buffer_lines: DEFAULT_BUFFER_LINES,
            client_kind,
            work_dir: work_dir.into(),
            model: None,
            append_system_prompt: None,
            mcp_config: None,
            skip_permissions: true,
            disallowed_tools: Vec::new(),
            timeout: None,
        }
    }
}

/// Per-spawn parameters.
#[derive(Debug, Clone)]
pub struct WorkerSpawnSpec {
    /// Initial prompt; the worker starts Working on it immediately.
    pub prompt: String,
    pub task_id: Option<String>,
    pub phase: Option<String>,
}

impl WorkerSpawnSpec {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            task_id: None,
            phase: None,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

struct PoolInner {
    config: WorkerPoolConfig,
    client: Arc<dyn AssistantClient>,
    workers: Mutex<BTreeMap<String, Arc<Worker>>>,
    next_id: Mutex<u64>,
    broker: Broker<WorkerEvent>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    default_context_window: u64,
}

/// Handle to the pool. Cheap to clone.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig, client: Arc<dyn AssistantClient>) -> Self {
        let default_context_window = config.client_kind.parser().context_window();
        Self {
            inner: Arc::new(PoolInner {
                config,
                client,
                workers: Mutex::new(BTreeMap::new()),
                next_id: Mutex::new(1),
                broker: Broker::new(),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                default_context_window,
            }),
        }
    }

    /// Broker carrying [`WorkerEvent`]s.
    pub fn events(&self) -> &Broker<WorkerEvent> {
        &self.inner.broker
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Workers counting against the capacity ceiling.
    pub fn active_count(&self) -> usize {
        self.inner
            .workers
            .lock()
            .values()
            .filter(|w| w.status() != WorkerStatus::Retired)
            .count()
    }

    pub fn worker(&self, worker_id: &str) -> Option<Arc<Worker>> {
        self.inner.workers.lock().get(worker_id).cloned()
    }

    /// All workers, retired included, in id order.
    pub fn workers(&self) -> Vec<Arc<Worker>> {
        self.inner.workers.lock().values().cloned().collect()
    }

    fn require_worker(&self, worker_id: &str) -> Result<Arc<Worker>, PoolError> {
        self.worker(worker_id)
            .ok_or_else(|| PoolError::WorkerNotFound(worker_id.to_string()))
    }

    fn base_config(&self, prompt: String, session_id: Option<String>) -> SpawnConfig {
        let config = &self.inner.config;
        SpawnConfig {
            client: config.client_kind,
            work_dir: config.work_dir.clone(),
            prompt,
            session_id,
            model: config.model.clone(),
            append_system_prompt: config.append_system_prompt.clone(),
            allowed_tools: Vec::new(),
            disallowed_tools: config.disallowed_tools.clone(),
            mcp_config: config.mcp_config.clone(),
            skip_permissions: config.skip_permissions,
            timeout: config.timeout,
            env: Vec::new(),
            extensions: Default::default(),
        }
    }

    /// Launch a worker's event loop behind a panic guard; a panicking
    /// loop retires nothing but itself.
    fn launch_loop(&self, worker: Arc<Worker>, process: Arc<crew_client::Process>) {
        let broker = self.inner.broker.clone();
        let window = self.inner.default_context_window;
        let worker_id = worker.id().to_string();
        let loop_handle = tokio::spawn(worker::run_event_loop(worker, process, broker, window));
        let guard = tokio::spawn(async move {
            if let Err(e) = loop_handle.await {
                if e.is_panic() {
                    tracing::error!(worker_id = %worker_id, panic = %e, "worker event loop panicked");
                }
            }
        });
        self.inner.tasks.lock().push(guard);
    }

    /// Spawn a new worker processing `spec.prompt`.
    pub async fn spawn_worker(&self, spec: WorkerSpawnSpec) -> Result<String, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        if self.active_count() >= self.inner.config.max_workers {
            return Err(PoolError::MaxWorkers(self.inner.config.max_workers));
        }

        let worker_id = {
            let mut next = self.inner.next_id.lock();
            let id = format!("worker-{}", *next);
            *next += 1;
            id
        };

        let phase = spec.phase.unwrap_or_else(|| DEFAULT_PHASE.to_string());
        let worker = Worker::new(worker_id.clone(), self.inner.config.buffer_lines, phase);
        if let Some(task_id) = &spec.task_id {
            let mut state = worker.state.lock();
            state.task_id = Some(task_id.clone());
            state.task_started_at = Some(crew_core::now_millis());
        }
        self.inner
            .workers
            .lock()
            .insert(worker_id.clone(), Arc::clone(&worker));

        let config = self.base_config(spec.prompt, None);
        let process = match self.inner.client.spawn(&self.inner.cancel, config).await {
            Ok(process) => Arc::new(process),
            Err(e) => {
                // Roll back the record; the id stays burned.
                self.inner.workers.lock().remove(&worker_id);
                return Err(PoolError::Spawn(e));
            }
        };
        worker.state.lock().process = Some(Arc::clone(&process));

        tracing::info!(worker_id = %worker_id, "worker spawned");
        self.inner.broker.publish(WorkerEvent::Spawned {
            worker_id: worker_id.clone(),
            status: WorkerStatus::Working,
        });
        self.launch_loop(worker, process);
        Ok(worker_id)
    }

    /// Attach a fresh process to an existing worker, resuming its
    /// session with a follow-up prompt.
    pub async fn resume_worker(&self, worker_id: &str, prompt: &str) -> Result<(), PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        let worker = self.require_worker(worker_id)?;
        let session_id = {
            let state = worker.state.lock();
            if state.status == WorkerStatus::Retired {
                return Err(PoolError::WorkerRetired(worker_id.to_string()));
            }
            (!state.session_id.is_empty()).then(|| state.session_id.clone())
        };

        let config = self.base_config(prompt.to_string(), session_id);
        let process = Arc::new(self.inner.client.spawn(&self.inner.cancel, config).await?);

        let phase = {
            let mut state = worker.state.lock();
            state.status = WorkerStatus::Working;
            state.process = Some(Arc::clone(&process));
            state.phase.clone()
        };
        self.inner.broker.publish(WorkerEvent::StatusChange {
            worker_id: worker_id.to_string(),
            status: WorkerStatus::Working,
            phase,
        });
        self.launch_loop(worker, process);
        Ok(())
    }

    /// Move a Ready worker onto a task.
    pub fn assign_task(&self, worker_id: &str, task_id: &str) -> Result<(), PoolError> {
        let worker = self.require_worker(worker_id)?;
        let phase = {
            let mut state = worker.state.lock();
            if state.status != WorkerStatus::Ready {
                return Err(PoolError::InvalidStatus {
                    worker: worker_id.to_string(),
                    expected: WorkerStatus::Ready,
                    actual: state.status,
                });
            }
            state.status = WorkerStatus::Working;
            state.task_id = Some(task_id.to_string());
            state.task_started_at = Some(crew_core::now_millis());
            state.phase.clone()
        };
        worker.output().clear();
        self.inner.broker.publish(WorkerEvent::StatusChange {
            worker_id: worker_id.to_string(),
            status: WorkerStatus::Working,
            phase,
        });
        Ok(())
    }

    /// Mirror a workflow phase into the pool for observability. Not a
    /// status transition.
    pub fn set_worker_phase(&self, worker_id: &str, phase: &str) -> Result<(), PoolError> {
        let worker = self.require_worker(worker_id)?;
        let status = {
            let mut state = worker.state.lock();
            state.phase = phase.to_lowercase();
            state.status
        };
        self.inner.broker.publish(WorkerEvent::StatusChange {
            worker_id: worker_id.to_string(),
            status,
            phase: phase.to_lowercase(),
        });
        Ok(())
    }

    pub fn set_worker_task_id(&self, worker_id: &str, task_id: Option<String>) -> Result<(), PoolError> {
        let worker = self.require_worker(worker_id)?;
        worker.state.lock().task_id = task_id;
        Ok(())
    }

    /// Retire a worker: cancel its process if alive and mark Retired.
    /// Never reversible.
    pub fn retire_worker(&self, worker_id: &str) -> Result<(), PoolError> {
        let worker = self.require_worker(worker_id)?;
        self.retire(&worker);
        Ok(())
    }

    /// Alias used by the tool surface; cancel and retire are the same
    /// terminal transition.
    pub fn cancel_worker(&self, worker_id: &str) -> Result<(), PoolError> {
        self.retire_worker(worker_id)
    }

    fn retire(&self, worker: &Arc<Worker>) {
        let phase = {
            let mut state = worker.state.lock();
            if state.status == WorkerStatus::Retired {
                return;
            }
            state.status = WorkerStatus::Retired;
            state.task_id = None;
            state.phase.clone()
        };
        worker.cancel_process();
        tracing::info!(worker_id = %worker.id(), "worker retired");
        self.inner.broker.publish(WorkerEvent::StatusChange {
            worker_id: worker.id().to_string(),
            status: WorkerStatus::Retired,
            phase,
        });
    }

    /// Retire everything, cancel the root context, join worker tasks,
    /// close the broker. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let workers = self.workers();
        for worker in &workers {
            self.retire(worker);
        }
        self.inner.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "worker task join failed");
            }
        }
        self.inner.broker.close();
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
