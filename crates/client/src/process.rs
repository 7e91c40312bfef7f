// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One assistant CLI turn: spawn, stream, cancel, wait.
//!
//! A [`Process`] owns a spawned vendor CLI and three tasks: a stdout
//! parser feeding the bounded events channel, a stderr tailer keeping
//! the last lines for diagnostics, and an exit waiter that finalizes
//! status. The events channel closing is the "process done" signal;
//! `wait` is the join.

use crate::config::SpawnConfig;
use crate::parser::EventParser;
use crate::resolve::resolve_binary;
use crew_core::{now_millis, OutputEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Depth of the canonical events channel. The single consumer applies
/// back-pressure here; publishers further up never block.
const EVENT_CHANNEL: usize = 256;

/// Depth of the errors channel. Overflow is logged and dropped.
const ERROR_CHANNEL: usize = 10;

/// Stderr lines kept for diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// Hook invoked once, on the first system/init event of the turn.
pub type InitHook = Arc<dyn Fn(&OutputEvent) + Send + Sync>;

/// Lifecycle of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Errors that prevent a process from starting.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("{binary} binary not found (searched {searched:?} and PATH)")]
    BinaryNotFound {
        binary: String,
        searched: Vec<String>,
    },
    #[error("working directory does not exist: {0}")]
    WorkDirMissing(PathBuf),
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to capture {0} pipe")]
    Pipe(&'static str),
}

/// Terminal errors surfaced on the errors channel.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    #[error("process timed out after {0:?}")]
    Timeout(Duration),
    #[error("process exited with code {code}: {stderr}")]
    ExitFailure { code: i32, stderr: String },
    #[error("stdout read failed: {0}")]
    Stdout(String),
    #[error("wait failed: {0}")]
    Wait(String),
}

/// A running (or finished) assistant CLI turn.
pub struct Process {
    status: Arc<Mutex<ProcessStatus>>,
    session_ref: Arc<Mutex<String>>,
    main_model: Arc<Mutex<Option<String>>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    cancel: CancellationToken,
    events: Mutex<Option<mpsc::Receiver<OutputEvent>>>,
    errors: Mutex<Option<mpsc::Receiver<ProcessError>>>,
    waiter: Mutex<Option<JoinHandle<()>>>,
}

impl Process {
    /// Spawn a turn. The child context derives from `ctx`; a timeout
    /// in the config applies its deadline inside the exit waiter with
    /// no intermediate token.
    pub fn spawn(ctx: &CancellationToken, config: SpawnConfig) -> Result<Self, SpawnError> {
        Self::spawn_with_hook(ctx, config, None)
    }

    /// Spawn with an init hook, fired on the first system/init event.
    pub fn spawn_with_hook(
        ctx: &CancellationToken,
        config: SpawnConfig,
        on_init: Option<InitHook>,
    ) -> Result<Self, SpawnError> {
        if !config.work_dir.is_dir() {
            return Err(SpawnError::WorkDirMissing(config.work_dir.clone()));
        }
        let binary = resolve_binary(config.client)?;
        let parser = config.client.parser();
        let args = config.build_args();

        tracing::debug!(
            client = %config.client,
            binary = %binary.display(),
            work_dir = %config.work_dir.display(),
            resume = config.session_id.as_deref().unwrap_or(""),
            "spawning assistant process"
        );

        let mut cmd = Command::new(&binary);
        cmd.args(&args)
            .current_dir(&config.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        // Vendor extensions: only `env:NAME` keys are honoured here;
        // unknown keys are ignored.
        for (key, value) in &config.extensions {
            if let Some(name) = key.strip_prefix("env:") {
                cmd.env(name, value);
            }
        }

        let mut child = cmd.spawn().map_err(|source| SpawnError::Spawn {
            binary: config.client.binary_name().to_string(),
            source,
        })?;
        let stdout = child.stdout.take().ok_or(SpawnError::Pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(SpawnError::Pipe("stderr"))?;

        let cancel = ctx.child_token();
        let status = Arc::new(Mutex::new(ProcessStatus::Running));
        let session_ref = Arc::new(Mutex::new(String::new()));
        let main_model = Arc::new(Mutex::new(None));
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL);
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_CHANNEL);

        let stdout_handle = tokio::spawn(stdout_loop(
            stdout,
            parser,
            events_tx,
            errors_tx.clone(),
            Arc::clone(&session_ref),
            Arc::clone(&main_model),
            cancel.clone(),
            on_init,
        ));
        let stderr_handle = tokio::spawn(stderr_loop(stderr, Arc::clone(&stderr_tail)));
        let waiter = tokio::spawn(exit_waiter(
            child,
            config.timeout,
            cancel.clone(),
            Arc::clone(&status),
            Arc::clone(&stderr_tail),
            errors_tx,
            stdout_handle,
            stderr_handle,
        ));

        Ok(Self {
            status,
            session_ref,
            main_model,
            stderr_tail,
            cancel,
            events: Mutex::new(Some(events_rx)),
            errors: Mutex::new(Some(errors_rx)),
            waiter: Mutex::new(Some(waiter)),
        })
    }

    pub fn status(&self) -> ProcessStatus {
        *self.status.lock()
    }

    /// Session reference detected from the event stream, or "".
    pub fn session_ref(&self) -> String {
        self.session_ref.lock().clone()
    }

    /// Main model name surfaced on init, when the vendor reports one.
    pub fn main_model(&self) -> Option<String> {
        self.main_model.lock().clone()
    }

    /// Captured stderr tail for diagnostics.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail.lock().iter().cloned().collect()
    }

    /// Take the canonical event stream. Single consumer; the channel
    /// closing means the process is done.
    pub fn take_events(&self) -> Option<mpsc::Receiver<OutputEvent>> {
        self.events.lock().take()
    }

    /// Take the terminal-errors stream.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<ProcessError>> {
        self.errors.lock().take()
    }

    /// Cancel the turn. Status flips to Cancelled before the token
    /// fires so the exit waiter never reclassifies the exit.
    pub fn cancel(&self) {
        {
            let mut status = self.status.lock();
            if !status.is_terminal() {
                *status = ProcessStatus::Cancelled;
            }
        }
        self.cancel.cancel();
    }

    /// Join all tasks and return the final status. Idempotent.
    pub async fn wait(&self) -> ProcessStatus {
        let handle = self.waiter.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "process waiter task failed");
            }
        }
        self.status()
    }

    /// A process with externally scripted streams, for tests. The
    /// returned token is the process's own cancel token; cancelling
    /// the process fires it, and script drivers use it to close the
    /// streams the way a real exit would.
    #[cfg(any(test, feature = "test-support"))]
    #[allow(clippy::type_complexity)]
    pub fn scripted() -> (
        Self,
        mpsc::Sender<OutputEvent>,
        mpsc::Sender<ProcessError>,
        Arc<Mutex<ProcessStatus>>,
        Arc<Mutex<String>>,
        CancellationToken,
    ) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL);
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_CHANNEL);
        let status = Arc::new(Mutex::new(ProcessStatus::Running));
        let session_ref = Arc::new(Mutex::new(String::new()));
        let cancel = CancellationToken::new();
        let process = Self {
            status: Arc::clone(&status),
            session_ref: Arc::clone(&session_ref),
            main_model: Arc::new(Mutex::new(None)),
            stderr_tail: Arc::new(Mutex::new(VecDeque::new())),
            cancel: cancel.clone(),
            events: Mutex::new(Some(events_rx)),
            errors: Mutex::new(Some(errors_rx)),
            waiter: Mutex::new(None),
        };
        (process, events_tx, errors_tx, status, session_ref, cancel)
    }
}

/// Push onto the bounded errors channel, dropping on overflow.
fn push_error(tx: &mpsc::Sender<ProcessError>, error: ProcessError) {
    if let Err(mpsc::error::TrySendError::Full(dropped)) = tx.try_send(error) {
        tracing::warn!(error = %dropped, "errors channel full, dropping");
    }
}

#[allow(clippy::too_many_arguments)]
async fn stdout_loop<R: AsyncRead + Unpin + Send + 'static>(
    stdout: R,
    parser: Arc<dyn EventParser>,
    events_tx: mpsc::Sender<OutputEvent>,
    errors_tx: mpsc::Sender<ProcessError>,
    session_ref: Arc<Mutex<String>>,
    main_model: Arc<Mutex<Option<String>>>,
    cancel: CancellationToken,
    on_init: Option<InitHook>,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut init_seen = false;
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let mut event = match parser.parse_event(trimmed) {
                    Ok(event) => event,
                    Err(e) => {
                        // One bad line must not kill the stream.
                        tracing::warn!(error = %e, "skipping unparseable output line");
                        continue;
                    }
                };
                // The event owns its raw copy of the line.
                event.raw = line.clone();
                event.timestamp = now_millis();

                let detected = parser.extract_session_ref(&event, &line);
                if !detected.is_empty() {
                    *session_ref.lock() = detected;
                }
                if event.is_init() {
                    if let Some(model) = event.model() {
                        *main_model.lock() = Some(model.to_string());
                    }
                    if !init_seen {
                        init_seen = true;
                        if let Some(hook) = &on_init {
                            hook(&event);
                        }
                    }
                }

                // Block only on the canonical channel; cancellation
                // aborts the send.
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = events_tx.send(event) => {
                        if sent.is_err() {
                            break; // consumer gone
                        }
                    }
                }
            }
            Ok(None) => break, // EOF
            Err(e) => {
                push_error(&errors_tx, ProcessError::Stdout(e.to_string()));
                break;
            }
        }
    }
}

async fn stderr_loop<R: AsyncRead + Unpin + Send + 'static>(
    stderr: R,
    tail: Arc<Mutex<VecDeque<String>>>,
) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut tail = tail.lock();
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

enum ExitCause {
    Exited(std::process::ExitStatus),
    WaitFailed(std::io::Error),
    Cancelled,
    TimedOut(Duration),
}

#[allow(clippy::too_many_arguments)]
async fn exit_waiter(
    mut child: tokio::process::Child,
    timeout: Option<Duration>,
    cancel: CancellationToken,
    status: Arc<Mutex<ProcessStatus>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    errors_tx: mpsc::Sender<ProcessError>,
    stdout_handle: JoinHandle<()>,
    stderr_handle: JoinHandle<()>,
) {
    let cause = match timeout {
        Some(deadline) => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => ExitCause::Cancelled,
                _ = tokio::time::sleep(deadline) => ExitCause::TimedOut(deadline),
                exited = child.wait() => match exited {
                    Ok(exit) => ExitCause::Exited(exit),
                    Err(e) => ExitCause::WaitFailed(e),
                },
            }
        }
        None => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => ExitCause::Cancelled,
                exited = child.wait() => match exited {
                    Ok(exit) => ExitCause::Exited(exit),
                    Err(e) => ExitCause::WaitFailed(e),
                },
            }
        }
    };

    // Make sure the child is gone and the scanners have drained.
    if matches!(cause, ExitCause::Cancelled | ExitCause::TimedOut(_)) {
        cancel.cancel();
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
    let _ = stdout_handle.await;
    let _ = stderr_handle.await;

    match cause {
        ExitCause::Cancelled => {
            let mut status = status.lock();
            if !status.is_terminal() {
                *status = ProcessStatus::Cancelled;
            }
        }
        ExitCause::TimedOut(deadline) => {
            {
                let mut status = status.lock();
                if *status != ProcessStatus::Cancelled {
                    *status = ProcessStatus::Failed;
                }
            }
            push_error(&errors_tx, ProcessError::Timeout(deadline));
        }
        ExitCause::WaitFailed(e) => {
            *status.lock() = ProcessStatus::Failed;
            push_error(&errors_tx, ProcessError::Wait(e.to_string()));
        }
        ExitCause::Exited(exit) => {
            let already_cancelled = *status.lock() == ProcessStatus::Cancelled;
            if already_cancelled {
                // Cancel won the race; keep the classification.
            } else if exit.success() {
                *status.lock() = ProcessStatus::Completed;
            } else {
                *status.lock() = ProcessStatus::Failed;
                let stderr = stderr_tail
                    .lock()
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n");
                push_error(
                    &errors_tx,
                    ProcessError::ExitFailure {
                        code: exit.code().unwrap_or(-1),
                        stderr,
                    },
                );
            }
        }
    }
    // errors_tx drops here: Errors closes after the final error, and
    // Events already closed when the stdout task finished.
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
