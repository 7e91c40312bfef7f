//! Coordinator queueing: concurrent sends during a busy turn queue
//! with distinct increasing positions, then drain FIFO with exactly
//! one resume per message.

use crate::prelude::*;
use crew_client::ProcessStatus;

async fn finish_turn(client: &crew_client::ScriptedClient, index: usize, session: &str) {
    let handle = client.handle(index).unwrap();
    handle.emit(init_event(session)).await;
    handle.emit(success_result()).await;
    handle.finish(ProcessStatus::Completed);
}

#[tokio::test]
async fn concurrent_sends_queue_then_drain_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (client, coordinator) = rig(dir.path());
    coordinator.start().await.unwrap();
    assert!(coordinator.working());

    // Four concurrent sends while the initial turn is in flight.
    let (o1, o2, o3, o4) = tokio::join!(
        coordinator.send_user_message("m1"),
        coordinator.send_user_message("m2"),
        coordinator.send_user_message("m3"),
        coordinator.send_user_message("m4"),
    );
    let outcomes = [o1.unwrap(), o2.unwrap(), o3.unwrap(), o4.unwrap()];
    assert!(outcomes.iter().all(|o| o.queued));
    let mut positions: Vec<usize> = outcomes.iter().map(|o| o.queue_position).collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![1, 2, 3, 4]);

    // Completing the active turn resumes with the first queued
    // message and the recorded session id; each later completion
    // dequeues exactly one more.
    finish_turn(&client, 0, "sess-q").await;
    let mut prompts = Vec::new();
    for turn in 1..=4 {
        wait_until(|| client.spawn_count() == turn + 1).await;
        let config = client.handle(turn).unwrap().config.clone();
        assert_eq!(config.session_id.as_deref(), Some("sess-q"));
        prompts.push(config.prompt.clone());
        assert!(coordinator.working(), "working holds until the queue drains");
        finish_turn(&client, turn, "sess-q").await;
    }

    // FIFO: prompts drained in send order (join! polls in order, so
    // the queue order is m1..m4).
    assert_eq!(prompts, vec!["m1", "m2", "m3", "m4"]);

    wait_until(|| !coordinator.working()).await;
    assert_eq!(coordinator.queue_len(), 0);
    assert_eq!(client.spawn_count(), 5);

    coordinator.stop().await;
}
