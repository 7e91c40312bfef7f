// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent pool worker and its event loop.
//!
//! A worker wraps one live `Process` at a time (replaced each turn)
//! and a bounded output ring. Status moves Ready→Working→Ready for
//! normal turns; Retired is absorbing.

use crate::events::WorkerEvent;
use crew_client::{Process, ProcessError, ProcessStatus};
use crew_core::{
    now_millis, Broker, ErrorKind, EventType, Failure, OutputBuffer, OutputEvent, TokenMetrics,
    Usage, UsageSource,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Phase a worker starts in.
pub const DEFAULT_PHASE: &str = "idle";

/// Truncation applied to tool output lines in the ring.
const TOOL_OUTPUT_MAX: usize = 160;

/// Worker lifecycle.
///
/// Valid transitions are Ready→Working, Working→Ready, and any→Retired.
/// Retired is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Ready,
    Working,
    Retired,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Working => "working",
            Self::Retired => "retired",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time view of a worker, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub id: String,
    pub status: WorkerStatus,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    pub spawned_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<Failure>,
    pub metrics: TokenMetrics,
}

pub(crate) struct WorkerState {
    pub status: WorkerStatus,
    pub phase: String,
    pub task_id: Option<String>,
    pub session_id: String,
    pub process: Option<Arc<Process>>,
    pub spawned_at: u64,
    pub task_started_at: Option<u64>,
    pub last_error: Option<Failure>,
    pub metrics: TokenMetrics,
    /// Usage seen on the latest assistant event, for vendors whose
    /// result events under-report.
    pub last_assistant_usage: Option<Usage>,
}

/// A pool worker. Exactly one process is alive per worker.
pub struct Worker {
    id: String,
    output: OutputBuffer,
    pub(crate) state: Mutex<WorkerState>,
}

impl Worker {
    pub(crate) fn new(id: String, buffer_capacity: usize, phase: String) -> Arc<Self> {
        Arc::new(Self {
            id,
            output: OutputBuffer::new(buffer_capacity),
            state: Mutex::new(WorkerState {
                status: WorkerStatus::Working,
                phase,
                task_id: None,
                session_id: String::new(),
                process: None,
                spawned_at: now_millis(),
                task_started_at: None,
                last_error: None,
                metrics: TokenMetrics::default(),
                last_assistant_usage: None,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn status(&self) -> WorkerStatus {
        self.state.lock().status
    }

    pub fn phase(&self) -> String {
        self.state.lock().phase.clone()
    }

    pub fn task_id(&self) -> Option<String> {
        self.state.lock().task_id.clone()
    }

    pub fn session_id(&self) -> String {
        self.state.lock().session_id.clone()
    }

    pub fn last_error(&self) -> Option<Failure> {
        self.state.lock().last_error.clone()
    }

    pub fn metrics(&self) -> TokenMetrics {
        self.state.lock().metrics
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        let state = self.state.lock();
        WorkerSnapshot {
            id: self.id.clone(),
            status: state.status,
            phase: state.phase.clone(),
            task_id: state.task_id.clone(),
            session_id: state.session_id.clone(),
            spawned_at: state.spawned_at,
            task_started_at: state.task_started_at,
            last_error: state.last_error.clone(),
            metrics: state.metrics,
        }
    }

    /// Cancel the live process, if any.
    pub(crate) fn cancel_process(&self) {
        let process = self.state.lock().process.clone();
        if let Some(process) = process {
            process.cancel();
        }
    }
}

/// Render a tool_use block as a one-line note.
pub(crate) fn tool_use_line(name: &str, input: &serde_json::Value) -> String {
    let detail = input
        .get("command")
        .or_else(|| input.get("file_path"))
        .or_else(|| input.get("path"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if detail.is_empty() {
        format!("[tool] {name}")
    } else {
        format!("[tool] {name}: {detail}")
    }
}

fn truncate_line(s: &str, max: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.len() <= max {
        return flat;
    }
    let mut end = max;
    while !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &flat[..end])
}

/// Consume one process's event stream on behalf of a worker, then
/// finalize the worker's status from the process exit.
pub(crate) async fn run_event_loop(
    worker: Arc<Worker>,
    process: Arc<Process>,
    broker: Broker<WorkerEvent>,
    default_context_window: u64,
) {
    let Some(mut events) = process.take_events() else {
        tracing::error!(worker_id = %worker.id(), "event stream already taken");
        return;
    };
    let mut errors = process.take_errors();

    loop {
        let errors_open = errors.is_some();
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => handle_event(&worker, &broker, event, default_context_window),
                None => break,
            },
            error = async {
                match errors.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => None,
                }
            }, if errors_open => match error {
                Some(error) => handle_process_error(&worker, &broker, error),
                None => errors = None,
            },
        }
    }

    // Drain any terminal errors that raced the close.
    if let Some(mut rx) = errors.take() {
        while let Some(error) = rx.recv().await {
            handle_process_error(&worker, &broker, error);
        }
    }

    let exit = process.wait().await;
    let (status, phase) = {
        let mut state = worker.state.lock();
        if state.status != WorkerStatus::Retired {
            // A blown context window retires the worker even when the
            // process itself exits cleanly.
            let context_blown = state
                .last_error
                .as_ref()
                .is_some_and(|e| e.kind == ErrorKind::ContextExceeded);
            match exit {
                ProcessStatus::Completed if !context_blown => {
                    // Task id survives turn completion; the
                    // coordinator drives its lifecycle through phases.
                    state.status = WorkerStatus::Ready;
                    state.task_started_at = None;
                }
                _ => {
                    state.status = WorkerStatus::Retired;
                    state.task_id = None;
                }
            }
        }
        (state.status, state.phase.clone())
    };
    broker.publish(WorkerEvent::StatusChange {
        worker_id: worker.id().to_string(),
        status,
        phase,
    });
}

fn handle_event(
    worker: &Arc<Worker>,
    broker: &Broker<WorkerEvent>,
    event: OutputEvent,
    default_context_window: u64,
) {
    let worker_id = worker.id().to_string();
    match event.event_type {
        EventType::System => {
            if event.is_init() && !event.session_id.is_empty() {
                worker.state.lock().session_id = event.session_id.clone();
            }
        }
        EventType::Assistant => {
            if let Some(usage) = event.usage {
                if !usage.is_empty() {
                    worker.state.lock().last_assistant_usage = Some(usage);
                }
            }
            for text in event.text_blocks() {
                worker.output().write(text);
                broker.publish(WorkerEvent::Output {
                    worker_id: worker_id.clone(),
                    text: text.to_string(),
                });
            }
            for (name, input) in event.tool_use_blocks() {
                let line = tool_use_line(name, input);
                worker.output().write(&line);
                broker.publish(WorkerEvent::Output {
                    worker_id: worker_id.clone(),
                    text: line,
                });
            }
        }
        EventType::ToolResult => {
            if let Some(tool) = &event.tool {
                if !tool.output.is_empty() {
                    worker
                        .output()
                        .write(truncate_line(&tool.output, TOOL_OUTPUT_MAX));
                }
            }
        }
        EventType::Result => {
            if event.is_error_result {
                let message = event
                    .result
                    .clone()
                    .or_else(|| event.error.as_ref().map(|e| e.message.clone()))
                    .unwrap_or_else(|| "turn failed".to_string());
                worker.output().write(format!("⚠ {message}"));
                let failure = event
                    .error
                    .as_ref()
                    .map(Failure::from_event_error)
                    .unwrap_or_else(|| Failure::new(ErrorKind::Unknown, message));
                worker.state.lock().last_error = Some(failure.clone());
                broker.publish(WorkerEvent::Error {
                    worker_id,
                    error: failure,
                });
                return;
            }

            let (usage, source) = match event.usage {
                Some(usage) if !usage.is_empty() => (Some(usage), UsageSource::Result),
                _ => (
                    worker.state.lock().last_assistant_usage,
                    UsageSource::Assistant,
                ),
            };
            if let Some(usage) = usage {
                let mut turn = TokenMetrics::from_usage(&usage, source);
                turn.context_window = event.context_window().unwrap_or(default_context_window);
                turn.turn_cost_usd = event.total_cost_usd.unwrap_or_default();
                let metrics = {
                    let mut state = worker.state.lock();
                    state.metrics.record_turn(&turn);
                    state.last_assistant_usage = None;
                    state.metrics
                };
                if metrics.context_tokens() > 0 {
                    broker.publish(WorkerEvent::TokenUsage { worker_id, metrics });
                }
            }
        }
        EventType::Error => {
            if let Some(error) = &event.error {
                let failure = Failure::from_event_error(error);
                worker.state.lock().last_error = Some(failure.clone());
                broker.publish(WorkerEvent::Error {
                    worker_id,
                    error: failure,
                });
            }
        }
    }
}

fn handle_process_error(worker: &Arc<Worker>, broker: &Broker<WorkerEvent>, error: ProcessError) {
    let kind = match &error {
        ProcessError::Timeout(_) => ErrorKind::Timeout,
        _ => ErrorKind::Unknown,
    };
    let failure = Failure::new(kind, error.to_string());
    worker.state.lock().last_error = Some(failure.clone());
    broker.publish(WorkerEvent::Error {
        worker_id: worker.id().to_string(),
        error: failure,
    });
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
