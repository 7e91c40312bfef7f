// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator lifecycle.
//!
//! One long-lived assistant session that talks to the human and
//! delegates to the pool. User messages serialize through a working
//! flag plus a bounded FIFO; new processes spawn lazily from the
//! event task when a successful result is observed, never from the
//! calling thread.

use crate::error::CoordinatorError;
use crate::events::{ChatRole, CoordinatorEvent};
use crate::pool::WorkerPool;
use crate::worker::tool_use_line;
use crew_client::{
    AssistantClient, ClientKind, Process, ProcessError, ProcessStatus, SpawnConfig,
};
use crew_core::{
    Broker, ErrorKind, EventType, Failure, OutputEvent, TokenMetrics, Usage, UsageSource,
};
use crew_fabric::Fabric;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default bound on queued user messages.
pub const DEFAULT_QUEUE_LIMIT: usize = 32;

/// Tools the coordinator process may never call: anything that blocks
/// on the human through the assistant's own UI.
pub const DEFAULT_DISALLOWED_TOOLS: [&str; 2] = ["AskUserQuestion", "EnterPlanMode"];

const DEFAULT_INITIAL_PROMPT: &str =
    "You are the coordinator of a multi-agent crew. Check #system and #tasks with \
     fabric_inbox, then wait for instructions.";

const DEFAULT_REPLACE_PROMPT: &str =
    "Your session was refreshed to reclaim context. Read the hand-off message in \
     #system with fabric_inbox and fabric_read_thread before acting.";

/// Coordinator lifecycle states. Failed is absorbing and reachable
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorStatus {
    Pending,
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
    Failed,
}

impl CoordinatorStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for CoordinatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A user message waiting for the active turn to finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub content: String,
    pub from: String,
}

/// Result of `send_user_message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub queued: bool,
    /// 1-based position when queued, 0 otherwise.
    pub queue_position: usize,
}

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub client_kind: ClientKind,
    pub work_dir: PathBuf,
    pub model: Option<String>,
    /// System prompt text, rendered externally.
    pub system_prompt: Option<String>,
    /// First prompt of the session.
    pub initial_prompt: String,
    /// Prompt for a context-refresh session.
    pub replace_prompt: String,
    pub queue_limit: usize,
    pub timeout: Option<Duration>,
    pub disallowed_tools: Vec<String>,
}

impl CoordinatorConfig {
    pub fn new(client_kind: ClientKind, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            client_kind,
            work_dir: work_dir.into(),
            model: None,
            system_prompt: None,
            initial_prompt: DEFAULT_INITIAL_PROMPT.to_string(),
            replace_prompt: DEFAULT_REPLACE_PROMPT.to_string(),
            queue_limit: DEFAULT_QUEUE_LIMIT,
            timeout: None,
            disallowed_tools: DEFAULT_DISALLOWED_TOOLS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

struct CoordState {
    status: CoordinatorStatus,
    session_id: String,
    working: bool,
    queue: VecDeque<QueuedMessage>,
    process: Option<Arc<Process>>,
    metrics: TokenMetrics,
    /// Usage seen on the latest assistant event, for vendors whose
    /// result events under-report.
    last_assistant_usage: Option<Usage>,
}

struct CoordInner {
    config: CoordinatorConfig,
    client: Arc<dyn AssistantClient>,
    pool: WorkerPool,
    fabric: Arc<Fabric>,
    state: Mutex<CoordState>,
    broker: Broker<CoordinatorEvent>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    default_context_window: u64,
}

/// Handle to the coordinator. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordInner>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        client: Arc<dyn AssistantClient>,
        pool: WorkerPool,
        fabric: Arc<Fabric>,
    ) -> Self {
        let default_context_window = config.client_kind.parser().context_window();
        Self {
            inner: Arc::new(CoordInner {
                config,
                client,
                pool,
                fabric,
                state: Mutex::new(CoordState {
                    status: CoordinatorStatus::Pending,
                    session_id: String::new(),
                    working: false,
                    queue: VecDeque::new(),
                    process: None,
                    metrics: TokenMetrics::default(),
                    last_assistant_usage: None,
                }),
                broker: Broker::new(),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
                default_context_window,
            }),
        }
    }

    pub fn events(&self) -> &Broker<CoordinatorEvent> {
        &self.inner.broker
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    pub fn fabric(&self) -> &Arc<Fabric> {
        &self.inner.fabric
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.inner.state.lock().status
    }

    pub fn session_id(&self) -> String {
        self.inner.state.lock().session_id.clone()
    }

    pub fn working(&self) -> bool {
        self.inner.state.lock().working
    }

    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn metrics(&self) -> TokenMetrics {
        self.inner.state.lock().metrics
    }

    fn set_status(&self, status: CoordinatorStatus) {
        self.inner.state.lock().status = status;
        self.inner
            .broker
            .publish(CoordinatorEvent::StatusChange { status });
    }

    /// Start the coordinator session.
    pub async fn start(&self) -> Result<(), CoordinatorError> {
        {
            let mut state = self.inner.state.lock();
            if state.status != CoordinatorStatus::Pending {
                return Err(CoordinatorError::InvalidStatus(
                    state.status,
                    CoordinatorStatus::Pending,
                ));
            }
            state.status = CoordinatorStatus::Starting;
        }
        self.inner
            .broker
            .publish(CoordinatorEvent::StatusChange {
                status: CoordinatorStatus::Starting,
            });

        let mcp_config = write_mcp_config(&self.inner.config)?;
        let prompt = self.inner.config.initial_prompt.clone();
        if let Err(e) = spawn_turn(&self.inner, prompt, None, Some(mcp_config)).await {
            self.fail(Failure::new(ErrorKind::SpawnFailed, e.to_string()));
            return Err(e);
        }

        {
            let mut state = self.inner.state.lock();
            state.status = CoordinatorStatus::Running;
            state.working = true;
        }
        self.inner
            .broker
            .publish(CoordinatorEvent::StatusChange {
                status: CoordinatorStatus::Running,
            });
        self.inner.broker.publish(CoordinatorEvent::Working);
        Ok(())
    }

    /// Send a user message. Queues when a turn is in flight.
    pub async fn send_user_message(
        &self,
        content: impl Into<String>,
    ) -> Result<SendOutcome, CoordinatorError> {
        self.send_from("USER", content.into()).await
    }

    /// Deliver a system nudge (from the notification broker) through
    /// the same serialization point as user messages.
    pub async fn notify(&self, body: String) -> Result<SendOutcome, CoordinatorError> {
        self.send_from("SYSTEM", body).await
    }

    async fn send_from(
        &self,
        from: &str,
        content: String,
    ) -> Result<SendOutcome, CoordinatorError> {
        let queued_position = {
            let mut state = self.inner.state.lock();
            if state.status != CoordinatorStatus::Running {
                return Err(CoordinatorError::NotRunning(state.status));
            }
            if state.working {
                if state.queue.len() >= self.inner.config.queue_limit {
                    return Err(CoordinatorError::QueueFull(state.queue.len()));
                }
                state.queue.push_back(QueuedMessage {
                    content: content.clone(),
                    from: from.to_string(),
                });
                Some(state.queue.len())
            } else {
                state.working = true;
                None
            }
        };

        if let Some(queue_position) = queued_position {
            return Ok(SendOutcome {
                queued: true,
                queue_position,
            });
        }

        self.inner.broker.publish(CoordinatorEvent::Chat {
            role: role_for(from),
            content: content.clone(),
            raw: None,
        });
        self.inner.broker.publish(CoordinatorEvent::Working);

        let session = self.inner.state.lock().session_id.clone();
        let session = (!session.is_empty()).then_some(session);
        if let Err(e) = spawn_turn(&self.inner, content, session, None).await {
            self.fail(Failure::new(ErrorKind::SpawnFailed, e.to_string()));
            return Err(e);
        }
        Ok(SendOutcome {
            queued: false,
            queue_position: 0,
        })
    }

    pub fn pause(&self) -> Result<(), CoordinatorError> {
        {
            let mut state = self.inner.state.lock();
            if state.status != CoordinatorStatus::Running {
                return Err(CoordinatorError::InvalidStatus(
                    state.status,
                    CoordinatorStatus::Running,
                ));
            }
            state.status = CoordinatorStatus::Paused;
        }
        self.inner.broker.publish(CoordinatorEvent::StatusChange {
            status: CoordinatorStatus::Paused,
        });
        Ok(())
    }

    pub fn resume(&self) -> Result<(), CoordinatorError> {
        {
            let mut state = self.inner.state.lock();
            if state.status != CoordinatorStatus::Paused {
                return Err(CoordinatorError::InvalidStatus(
                    state.status,
                    CoordinatorStatus::Paused,
                ));
            }
            state.status = CoordinatorStatus::Running;
        }
        self.inner.broker.publish(CoordinatorEvent::StatusChange {
            status: CoordinatorStatus::Running,
        });
        Ok(())
    }

    /// Context refresh: cancel the live process and hot-swap to a
    /// fresh session. Worker pool, fabric state, broker subscribers,
    /// and the pending message queue are all preserved; only the
    /// process (and, once init arrives, the session id) change.
    pub async fn replace(&self) -> Result<(), CoordinatorError> {
        let old = {
            let state = self.inner.state.lock();
            if state.status != CoordinatorStatus::Running {
                return Err(CoordinatorError::NotRunning(state.status));
            }
            state
                .process
                .clone()
                .ok_or(CoordinatorError::NoActiveProcess)?
        };
        // The coordinator's root context survives; only the turn dies.
        old.cancel();
        old.wait().await;

        let mcp_config = write_mcp_config(&self.inner.config)?;
        {
            let mut state = self.inner.state.lock();
            state.session_id.clear();
            state.working = true;
        }
        let prompt = self.inner.config.replace_prompt.clone();
        if let Err(e) = spawn_turn(&self.inner, prompt, None, Some(mcp_config)).await {
            self.fail(Failure::new(ErrorKind::SpawnFailed, e.to_string()));
            return Err(e);
        }

        self.inner.broker.publish(CoordinatorEvent::Chat {
            role: ChatRole::System,
            content: "Context refreshed: new session started, workers and fabric preserved."
                .to_string(),
            raw: None,
        });
        self.inner.broker.publish(CoordinatorEvent::Working);
        Ok(())
    }

    /// Stop everything. Idempotent and safe to call from any task.
    pub async fn stop(&self) {
        let process = {
            let mut state = self.inner.state.lock();
            if matches!(
                state.status,
                CoordinatorStatus::Stopping | CoordinatorStatus::Stopped
            ) {
                return;
            }
            state.status = CoordinatorStatus::Stopping;
            state.process.take()
        };
        self.inner.broker.publish(CoordinatorEvent::StatusChange {
            status: CoordinatorStatus::Stopping,
        });

        if let Some(process) = process {
            process.cancel();
            process.wait().await;
        }
        self.inner.cancel.cancel();
        self.inner.pool.close().await;

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "coordinator task join failed");
            }
        }

        self.inner.state.lock().status = CoordinatorStatus::Stopped;
        self.inner.broker.publish(CoordinatorEvent::StatusChange {
            status: CoordinatorStatus::Stopped,
        });
        self.inner.fabric.close();
        self.inner.broker.close();
    }

    fn fail(&self, failure: Failure) {
        {
            let mut state = self.inner.state.lock();
            state.status = CoordinatorStatus::Failed;
            state.working = false;
        }
        self.inner.broker.publish(CoordinatorEvent::StatusChange {
            status: CoordinatorStatus::Failed,
        });
        self.inner
            .broker
            .publish(CoordinatorEvent::Error { error: failure });
    }
}

fn role_for(from: &str) -> ChatRole {
    if from.eq_ignore_ascii_case("user") {
        ChatRole::User
    } else {
        ChatRole::System
    }
}

/// Write the MCP tool config the assistant process is launched with.
/// Claude-flavoured clients read `mcpServers`; codex reads
/// `mcp_servers`.
fn write_mcp_config(config: &CoordinatorConfig) -> Result<PathBuf, std::io::Error> {
    let dir = config.work_dir.join(".crew");
    std::fs::create_dir_all(&dir)?;
    let key = match config.client_kind {
        ClientKind::Codex => "mcp_servers",
        _ => "mcpServers",
    };
    let body = serde_json::json!({
        key: {
            "crew": {
                "command": "crew-mcp",
                "args": [],
            }
        }
    });
    let path = dir.join("mcp.json");
    std::fs::write(&path, body.to_string())?;
    Ok(path)
}

/// Spawn one coordinator turn and start its event task.
async fn spawn_turn(
    inner: &Arc<CoordInner>,
    prompt: String,
    session_id: Option<String>,
    mcp_config: Option<PathBuf>,
) -> Result<(), CoordinatorError> {
    let config = &inner.config;
    let spawn = SpawnConfig {
        client: config.client_kind,
        work_dir: config.work_dir.clone(),
        prompt,
        session_id,
        model: config.model.clone(),
        append_system_prompt: config.system_prompt.clone(),
        allowed_tools: Vec::new(),
        disallowed_tools: config.disallowed_tools.clone(),
        mcp_config: mcp_config.or_else(|| Some(config.work_dir.join(".crew/mcp.json"))),
        skip_permissions: true,
        timeout: config.timeout,
        env: Vec::new(),
        extensions: Default::default(),
    };

    let process = Arc::new(inner.client.spawn(&inner.cancel, spawn).await?);
    inner.state.lock().process = Some(Arc::clone(&process));

    let task_inner = Arc::clone(inner);
    let handle = tokio::spawn(run_event_loop(task_inner, process));
    inner.tasks.lock().push(handle);
    Ok(())
}

fn _check_spawn_turn_send(inner: &Arc<CoordInner>) {
    fn assert_send<T: Send>(_: T) {}
    let fut = spawn_turn(inner, String::new(), None, None);
    assert_send(fut);
}

/// Consume one process's streams on behalf of the coordinator.
async fn run_event_loop(inner: Arc<CoordInner>, process: Arc<Process>) {
    let Some(mut events) = process.take_events() else {
        tracing::error!("coordinator event stream already taken");
        return;
    };
    let mut errors = process.take_errors();
    let mut result_seen = false;

    loop {
        let errors_open = errors.is_some();
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => handle_event(&inner, event, &mut result_seen).await,
                None => break,
            },
            error = async {
                match errors.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => None,
                }
            }, if errors_open => match error {
                Some(error) => publish_process_error(&inner, error),
                None => errors = None,
            },
        }
    }
    if let Some(mut rx) = errors.take() {
        while let Some(error) = rx.recv().await {
            publish_process_error(&inner, error);
        }
    }

    let exit = process.wait().await;
    match exit {
        ProcessStatus::Completed => {
            if !result_seen {
                // Stream ended without a result; do not leave the
                // session wedged.
                inner.state.lock().working = false;
            }
        }
        ProcessStatus::Cancelled => {
            // Stop or replace owns the state transitions.
        }
        _ => {
            inner.broker.publish(CoordinatorEvent::Error {
                error: Failure::new(ErrorKind::Unknown, "assistant process failed"),
            });
            advance_queue(&inner).await;
        }
    }
}

fn publish_process_error(inner: &Arc<CoordInner>, error: ProcessError) {
    let kind = match &error {
        ProcessError::Timeout(_) => ErrorKind::Timeout,
        _ => ErrorKind::Unknown,
    };
    inner.broker.publish(CoordinatorEvent::Error {
        error: Failure::new(kind, error.to_string()),
    });
}

async fn handle_event(inner: &Arc<CoordInner>, event: OutputEvent, result_seen: &mut bool) {
    match event.event_type {
        EventType::System => {
            if event.is_init() && !event.session_id.is_empty() {
                inner.state.lock().session_id = event.session_id.clone();
            }
        }
        EventType::Assistant => {
            if let Some(usage) = event.usage.filter(|u| !u.is_empty()) {
                inner.state.lock().last_assistant_usage = Some(usage);
            }
            for text in event.text_blocks() {
                inner.broker.publish(CoordinatorEvent::Chat {
                    role: ChatRole::Coordinator,
                    content: text.to_string(),
                    raw: Some(event.raw.clone()),
                });
            }
            for (name, input) in event.tool_use_blocks() {
                inner.broker.publish(CoordinatorEvent::Chat {
                    role: ChatRole::Coordinator,
                    content: tool_use_line(name, input),
                    raw: None,
                });
            }
        }
        EventType::ToolResult => {
            tracing::debug!(tool = ?event.tool.as_ref().map(|t| t.name.clone()), "tool result");
        }
        EventType::Result => {
            if event.is_error_result {
                let message = event
                    .result
                    .clone()
                    .or_else(|| event.error.as_ref().map(|e| e.message.clone()))
                    .unwrap_or_else(|| "turn failed".to_string());
                let failure = event
                    .error
                    .as_ref()
                    .map(Failure::from_event_error)
                    .unwrap_or_else(|| Failure::new(ErrorKind::Unknown, message.clone()));
                // Stays working: the human decides what happens next
                // (often a Replace when the kind is ContextExceeded).
                inner.broker.publish(CoordinatorEvent::Chat {
                    role: ChatRole::System,
                    content: format!("⚠ {message}"),
                    raw: Some(event.raw.clone()),
                });
                inner
                    .broker
                    .publish(CoordinatorEvent::Error { error: failure });
                return;
            }

            *result_seen = true;
            let (usage, source) = match event.usage.filter(|u| !u.is_empty()) {
                Some(usage) => (Some(usage), UsageSource::Result),
                None => (
                    inner.state.lock().last_assistant_usage,
                    UsageSource::Assistant,
                ),
            };
            if let Some(usage) = usage {
                let mut turn = TokenMetrics::from_usage(&usage, source);
                turn.context_window = event
                    .context_window()
                    .unwrap_or(inner.default_context_window);
                turn.turn_cost_usd = event.total_cost_usd.unwrap_or_default();
                let metrics = {
                    let mut state = inner.state.lock();
                    state.metrics.record_turn(&turn);
                    state.last_assistant_usage = None;
                    state.metrics
                };
                if metrics.context_tokens() > 0 {
                    inner
                        .broker
                        .publish(CoordinatorEvent::TokenUsage { metrics });
                }
            }
            inner.broker.publish(CoordinatorEvent::Ready);
            advance_queue(inner).await;
        }
        EventType::Error => {
            if let Some(error) = &event.error {
                inner.broker.publish(CoordinatorEvent::Error {
                    error: Failure::from_event_error(error),
                });
            }
        }
    }
}

/// Dequeue one pending message and resume the session with it, or
/// flip `working` off when the queue is drained.
async fn advance_queue(inner: &Arc<CoordInner>) {
    let (message, session_id) = {
        let mut state = inner.state.lock();
        if state.status != CoordinatorStatus::Running {
            state.working = false;
            return;
        }
        match state.queue.pop_front() {
            Some(message) => {
                let session = state.session_id.clone();
                (message, (!session.is_empty()).then_some(session))
            }
            None => {
                state.working = false;
                return;
            }
        }
    };

    inner.broker.publish(CoordinatorEvent::Chat {
        role: role_for(&message.from),
        content: message.content.clone(),
        raw: None,
    });
    inner.broker.publish(CoordinatorEvent::Working);

    if let Err(e) = spawn_turn(inner, message.content, session_id, None).await {
        tracing::error!(error = %e, "failed to resume with queued message");
        {
            let mut state = inner.state.lock();
            state.status = CoordinatorStatus::Failed;
            state.working = false;
        }
        inner.broker.publish(CoordinatorEvent::StatusChange {
            status: CoordinatorStatus::Failed,
        });
        inner.broker.publish(CoordinatorEvent::Error {
            error: Failure::new(ErrorKind::SpawnFailed, e.to_string()),
        });
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
