// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::pool::{WorkerPoolConfig, WorkerSpawnSpec};
use crew_client::{ProcessStatus, ScriptHandle, ScriptedClient};
use crew_core::{EventType, OutputEvent, Usage};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn init_event(session: &str) -> OutputEvent {
    OutputEvent {
        event_type: EventType::System,
        subtype: "init".to_string(),
        session_id: session.to_string(),
        ..OutputEvent::default()
    }
}

fn success_result() -> OutputEvent {
    OutputEvent {
        event_type: EventType::Result,
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 2,
            ..Usage::default()
        }),
        total_cost_usd: Some(0.01),
        ..OutputEvent::default()
    }
}

fn test_coordinator(client: &ScriptedClient, work_dir: &std::path::Path) -> Coordinator {
    let pool = crate::pool::WorkerPool::new(
        WorkerPoolConfig::new(ClientKind::Claude, work_dir),
        Arc::new(client.clone()),
    );
    let fabric = Arc::new(Fabric::new());
    fabric.init_session(&crew_core::AgentId::coordinator()).unwrap();
    Coordinator::new(
        CoordinatorConfig::new(ClientKind::Claude, work_dir),
        Arc::new(client.clone()),
        pool,
        fabric,
    )
}

/// Complete the current turn: emit init + result, then close streams.
async fn finish_turn(handle: &ScriptHandle, session: &str) {
    handle.emit(init_event(session)).await;
    handle.emit(success_result()).await;
    handle.finish(ProcessStatus::Completed);
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn start_requires_pending() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());

    coordinator.start().await.unwrap();
    assert_eq!(coordinator.status(), CoordinatorStatus::Running);
    assert!(coordinator.working());

    let result = coordinator.start().await;
    assert!(matches!(result, Err(CoordinatorError::InvalidStatus(..))));

    coordinator.stop().await;
}

#[tokio::test]
async fn start_writes_mcp_config() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());
    coordinator.start().await.unwrap();

    let mcp = dir.path().join(".crew/mcp.json");
    assert!(mcp.is_file());
    let body: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&mcp).unwrap()).unwrap();
    assert!(body.get("mcpServers").is_some());

    // The spawned process was pointed at it, with permissions skipped
    // and user-blocking tools disallowed.
    let config = &client.configs()[0];
    assert_eq!(config.mcp_config.as_deref(), Some(mcp.as_path()));
    assert!(config.skip_permissions);
    assert!(config
        .disallowed_tools
        .contains(&"AskUserQuestion".to_string()));

    coordinator.stop().await;
}

#[tokio::test]
async fn failed_start_is_absorbing() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());
    client.fail_next_spawn("no binary");

    assert!(coordinator.start().await.is_err());
    assert_eq!(coordinator.status(), CoordinatorStatus::Failed);

    // No sends accepted once failed.
    let result = coordinator.send_user_message("hi").await;
    assert!(matches!(result, Err(CoordinatorError::NotRunning(_))));
}

#[tokio::test]
async fn session_id_recorded_from_init() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());
    coordinator.start().await.unwrap();

    client.handle(0).unwrap().emit(init_event("sess-c")).await;
    wait_until(|| coordinator.session_id() == "sess-c").await;

    coordinator.stop().await;
}

// Coordinator serialization: sends during a busy turn queue with
// distinct increasing positions, drain FIFO with one resume per
// message, and working flips off only when the queue is empty.
#[tokio::test]
async fn queueing_drains_fifo_with_one_resume_each() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());
    coordinator.start().await.unwrap();
    assert!(coordinator.working());

    for (i, content) in ["m1", "m2", "m3", "m4"].iter().enumerate() {
        let outcome = coordinator.send_user_message(*content).await.unwrap();
        assert!(outcome.queued);
        assert_eq!(outcome.queue_position, i + 1);
    }
    assert_eq!(coordinator.queue_len(), 4);

    // Finish the initial turn; each completion dequeues exactly one
    // message and resumes with the recorded session id.
    finish_turn(&client.handle(0).unwrap(), "sess-1").await;
    for turn in 1..=4 {
        wait_until(|| client.spawn_count() == turn + 1).await;
        let config = client.handle(turn).unwrap().config.clone();
        assert_eq!(config.prompt, format!("m{turn}"));
        assert_eq!(config.session_id.as_deref(), Some("sess-1"));
        assert!(coordinator.working());
        finish_turn(&client.handle(turn).unwrap(), "sess-1").await;
    }

    wait_until(|| !coordinator.working()).await;
    assert_eq!(coordinator.queue_len(), 0);
    assert_eq!(client.spawn_count(), 5);

    coordinator.stop().await;
}

#[tokio::test]
async fn queue_overflow_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let pool = crate::pool::WorkerPool::new(
        WorkerPoolConfig::new(ClientKind::Claude, dir.path()),
        Arc::new(client.clone()),
    );
    let fabric = Arc::new(Fabric::new());
    let mut config = CoordinatorConfig::new(ClientKind::Claude, dir.path());
    config.queue_limit = 2;
    let coordinator = Coordinator::new(config, Arc::new(client.clone()), pool, fabric);
    coordinator.start().await.unwrap();

    coordinator.send_user_message("a").await.unwrap();
    coordinator.send_user_message("b").await.unwrap();
    let result = coordinator.send_user_message("c").await;
    assert!(matches!(result, Err(CoordinatorError::QueueFull(2))));

    coordinator.stop().await;
}

#[tokio::test]
async fn send_when_idle_spawns_with_session_resume() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());
    coordinator.start().await.unwrap();
    finish_turn(&client.handle(0).unwrap(), "sess-9").await;
    wait_until(|| !coordinator.working()).await;

    let outcome = coordinator.send_user_message("direct").await.unwrap();
    assert!(!outcome.queued);
    assert!(coordinator.working());
    wait_until(|| client.spawn_count() == 2).await;
    let config = client.handle(1).unwrap().config.clone();
    assert_eq!(config.prompt, "direct");
    assert_eq!(config.session_id.as_deref(), Some("sess-9"));

    coordinator.stop().await;
}

#[tokio::test]
async fn pause_and_resume_gate_sends() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());
    coordinator.start().await.unwrap();

    coordinator.pause().unwrap();
    assert_eq!(coordinator.status(), CoordinatorStatus::Paused);
    assert!(matches!(
        coordinator.send_user_message("hi").await,
        Err(CoordinatorError::NotRunning(CoordinatorStatus::Paused))
    ));
    assert!(coordinator.pause().is_err());

    coordinator.resume().unwrap();
    assert_eq!(coordinator.status(), CoordinatorStatus::Running);

    coordinator.stop().await;
}

// Context refresh preserves workers, fabric, queue, and subscribers;
// only the process and session id are replaced.
#[tokio::test]
async fn replace_preserves_everything_but_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());
    coordinator.start().await.unwrap();

    // A worker, a fabric message, a broker subscriber, and a queued
    // user message all survive the swap.
    coordinator
        .pool()
        .spawn_worker(WorkerSpawnSpec::new("work"))
        .await
        .unwrap();
    coordinator
        .fabric()
        .send_message(crew_fabric::SendMessageParams::new(
            "tasks",
            "pre-refresh",
            crew_core::AgentId::coordinator(),
        ))
        .unwrap();
    let token = CancellationToken::new();
    let _rx = coordinator.events().subscribe(token.clone());
    let subscribers_before = coordinator.events().subscriber_count();

    client.handle(0).unwrap().emit(init_event("old-sess")).await;
    wait_until(|| coordinator.session_id() == "old-sess").await;
    coordinator.send_user_message("queued during turn").await.unwrap();

    coordinator.replace().await.unwrap();

    // Old process cancelled, fresh one spawned without a session id.
    assert_eq!(
        client.handle(0).unwrap().status(),
        ProcessStatus::Cancelled
    );
    let replacement = client.last_handle().unwrap();
    assert_eq!(replacement.config.session_id, None);
    assert!(coordinator.session_id().is_empty());
    assert!(coordinator.working());

    assert_eq!(coordinator.pool().active_count(), 1);
    assert_eq!(
        coordinator.fabric().list_messages("tasks", 0).unwrap().len(),
        1
    );
    assert_eq!(coordinator.events().subscriber_count(), subscribers_before);
    assert_eq!(coordinator.queue_len(), 1);

    // The new session id lands when the fresh process inits.
    replacement.emit(init_event("new-sess")).await;
    wait_until(|| coordinator.session_id() == "new-sess").await;

    coordinator.stop().await;
}

#[tokio::test]
async fn replace_requires_running() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());
    assert!(matches!(
        coordinator.replace().await,
        Err(CoordinatorError::NotRunning(CoordinatorStatus::Pending))
    ));
}

#[tokio::test]
async fn stop_is_idempotent_and_closes_pool() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());
    coordinator.start().await.unwrap();
    coordinator
        .pool()
        .spawn_worker(WorkerSpawnSpec::new("w"))
        .await
        .unwrap();

    coordinator.stop().await;
    coordinator.stop().await;

    assert_eq!(coordinator.status(), CoordinatorStatus::Stopped);
    assert!(coordinator.pool().is_closed());
}

#[tokio::test]
async fn error_result_keeps_working_and_surfaces_chat() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());

    let token = CancellationToken::new();
    let mut rx = coordinator.events().subscribe(token.clone());
    coordinator.start().await.unwrap();

    let handle = client.handle(0).unwrap();
    handle
        .emit(OutputEvent {
            event_type: EventType::Result,
            is_error_result: true,
            result: Some("usage limit".to_string()),
            error: Some(crew_core::EventError {
                code: "invalid_request".to_string(),
                message: "Prompt is too long".to_string(),
                reason: Some(crew_core::ErrorReason::ContextExceeded),
                ..crew_core::EventError::default()
            }),
            ..OutputEvent::default()
        })
        .await;

    let mut saw_error_chat = false;
    let mut saw_typed_error = false;
    for _ in 0..12 {
        if saw_error_chat && saw_typed_error {
            break;
        }
        match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            Ok(Some(CoordinatorEvent::Chat { role, content, .. }))
                if role == ChatRole::System && content.contains("usage limit") =>
            {
                saw_error_chat = true;
            }
            Ok(Some(CoordinatorEvent::Error { error })) => {
                // Classified so the UI can offer a context refresh.
                assert_eq!(error.kind, crew_core::ErrorKind::ContextExceeded);
                saw_typed_error = true;
            }
            Ok(Some(CoordinatorEvent::Ready)) => panic!("Ready must not follow an error result"),
            Ok(Some(_)) => continue,
            _ => break,
        }
    }
    assert!(saw_error_chat);
    assert!(saw_typed_error);
    assert!(coordinator.working());

    coordinator.stop().await;
}

#[tokio::test]
async fn token_usage_accumulates_across_turns() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new();
    let coordinator = test_coordinator(&client, dir.path());
    coordinator.start().await.unwrap();

    finish_turn(&client.handle(0).unwrap(), "s").await;
    wait_until(|| !coordinator.working()).await;
    coordinator.send_user_message("again").await.unwrap();
    wait_until(|| client.spawn_count() == 2).await;
    finish_turn(&client.handle(1).unwrap(), "s").await;
    wait_until(|| !coordinator.working()).await;

    let metrics = coordinator.metrics();
    assert!((metrics.total_cost_usd - 0.02).abs() < 1e-9);
    assert_eq!(metrics.context_window, 200_000);

    coordinator.stop().await;
}
