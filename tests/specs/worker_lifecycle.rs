//! Worker lifecycle: spawn, stream a turn, return to Ready with the
//! session recorded and output buffered, in event order.

use crate::prelude::*;
use crew_client::{ProcessStatus, ScriptedClient};
use crew_engine::{WorkerEvent, WorkerPool, WorkerPoolConfig, WorkerSpawnSpec, WorkerStatus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn spawn_stream_and_return_to_ready() {
    let client = ScriptedClient::new();
    let pool = WorkerPool::new(
        WorkerPoolConfig::new(crew_client::ClientKind::Claude, "/tmp"),
        Arc::new(client.clone()),
    );
    let token = CancellationToken::new();
    let mut rx = pool.events().subscribe(token.clone());

    let id = pool
        .spawn_worker(WorkerSpawnSpec::new("say hi"))
        .await
        .unwrap();

    let handle = client.last_handle().unwrap();
    handle.emit(init_event("s1")).await;
    handle.emit(assistant_text("hi")).await;
    handle.emit(success_result()).await;
    handle.finish(ProcessStatus::Completed);

    // Expected order: Spawned(Working) → Output("hi") → Ready.
    match rx.recv().await.unwrap() {
        WorkerEvent::Spawned { worker_id, status } => {
            assert_eq!(worker_id, id);
            assert_eq!(status, WorkerStatus::Working);
        }
        other => panic!("expected Spawned first, got {other:?}"),
    }

    let mut saw_output = false;
    loop {
        match rx.recv().await.unwrap() {
            WorkerEvent::Output { text, .. } if text == "hi" => saw_output = true,
            WorkerEvent::StatusChange { status, .. } if status == WorkerStatus::Ready => {
                assert!(saw_output, "output must precede the Ready transition");
                break;
            }
            _ => {}
        }
    }

    let worker = pool.worker(&id).unwrap();
    assert_eq!(worker.session_id(), "s1");
    assert_eq!(
        worker.output().lines().last().map(String::as_str),
        Some("hi")
    );

    pool.close().await;
}
