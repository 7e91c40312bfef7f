// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::thread::{SubscriptionMode, ThreadType};
use crew_core::AgentId;

fn coordinator() -> AgentId {
    AgentId::coordinator()
}

fn seeded() -> Fabric {
    let fabric = Fabric::new();
    fabric.init_session(&coordinator()).unwrap();
    fabric
}

#[test]
fn init_session_creates_fixed_channels_in_seq_order() {
    let fabric = seeded();
    let channels = fabric.list_channels();
    assert_eq!(channels.len(), 6);

    for (i, slug) in FIXED_CHANNELS.iter().enumerate() {
        let id = fabric.channel_id(slug).unwrap();
        let thread = fabric.thread(&id).unwrap();
        assert_eq!(thread.thread_type, ThreadType::Channel);
        assert_eq!(thread.seq, i as u64);
        assert_eq!(fabric.channel_slug(&id).as_deref(), Some(*slug));
    }
}

#[test]
fn init_session_subscribes_initiator_to_system() {
    let fabric = seeded();
    let system = fabric.channel_id("system").unwrap();
    assert_eq!(
        fabric.subscription(&system, "coordinator"),
        Some(SubscriptionMode::All)
    );
}

#[test]
fn init_session_twice_fails() {
    let fabric = seeded();
    assert!(matches!(
        fabric.init_session(&coordinator()),
        Err(FabricError::ChannelExists(_))
    ));
}

#[test]
fn send_message_extracts_and_normalizes_mentions() {
    let fabric = seeded();
    let thread = fabric
        .send_message(SendMessageParams::new(
            "tasks",
            "hello @Worker.2 and @WORKER.2",
            AgentId::new("worker-1"),
        ))
        .unwrap();
    assert!(thread.mentions.contains("worker.2"));
    assert_eq!(thread.mentions.len(), 1);
    // Participants: creator plus mentions.
    assert!(thread.participants.contains("worker-1"));
    assert!(thread.participants.contains("worker.2"));
}

#[test]
fn send_message_to_unknown_channel_fails() {
    let fabric = seeded();
    let result = fabric.send_message(SendMessageParams::new(
        "nope",
        "hi",
        coordinator(),
    ));
    assert!(matches!(result, Err(FabricError::UnknownChannel(_))));
}

#[test]
fn seq_is_strictly_increasing_across_operations() {
    let fabric = seeded();
    let m1 = fabric
        .send_message(SendMessageParams::new("general", "one", coordinator()))
        .unwrap();
    let m2 = fabric
        .send_message(SendMessageParams::new("tasks", "two", coordinator()))
        .unwrap();
    let r1 = fabric
        .reply(ReplyParams::new(m1.id.clone(), "three", coordinator()))
        .unwrap();
    assert!(m1.seq < m2.seq);
    assert!(m2.seq < r1.seq);
}

// Reply flattening: replies to replies attach to the root; an
// intermediate reply never has children.
#[test]
fn reply_chains_flatten_to_root() {
    let fabric = seeded();
    let root = fabric
        .send_message(SendMessageParams::new(
            "general",
            "root",
            AgentId::new("alice"),
        ))
        .unwrap();
    let r1 = fabric
        .reply(ReplyParams::new(root.id.clone(), "r1", AgentId::new("bob")))
        .unwrap();
    let r2 = fabric
        .reply(ReplyParams::new(r1.id.clone(), "r2", AgentId::new("carol")))
        .unwrap();
    let r3 = fabric
        .reply(ReplyParams::new(r2.id.clone(), "r3", AgentId::new("dave")))
        .unwrap();

    let replies = fabric.replies(&root.id);
    let ids: Vec<_> = replies.iter().map(|t| t.id.clone()).collect();
    assert_eq!(ids, vec![r1.id.clone(), r2.id.clone(), r3.id.clone()]);
    assert!(fabric.replies(&r1.id).is_empty());
    assert!(fabric.replies(&r2.id).is_empty());

    // Participants of the root picked up every replier.
    let root = fabric.thread(&root.id).unwrap();
    for agent in ["alice", "bob", "carol", "dave"] {
        assert!(root.participants.contains(agent), "missing {agent}");
    }
}

#[test]
fn root_participants_never_shrink() {
    let fabric = seeded();
    let root = fabric
        .send_message(SendMessageParams::new(
            "general",
            "hi @alice",
            coordinator(),
        ))
        .unwrap();
    let before = fabric.thread(&root.id).unwrap().participants;
    fabric
        .reply(ReplyParams::new(root.id.clone(), "yo", AgentId::new("bob")))
        .unwrap();
    let after = fabric.thread(&root.id).unwrap().participants;
    assert!(after.is_superset(&before));
    assert!(after.contains("bob"));
}

#[test]
fn reply_to_channel_is_rejected() {
    let fabric = seeded();
    let channel = fabric.channel_id("general").unwrap();
    let result = fabric.reply(ReplyParams::new(channel, "hi", coordinator()));
    assert!(matches!(result, Err(FabricError::NotAMessage(_))));
}

#[test]
fn ack_clears_unread_until_new_activity() {
    let fabric = seeded();
    let worker = AgentId::new("worker-1");
    fabric
        .subscribe("tasks", &worker, SubscriptionMode::All)
        .unwrap();
    let msg = fabric
        .send_message(SendMessageParams::new("tasks", "do it", coordinator()))
        .unwrap();

    let tasks_id = fabric.channel_id("tasks").unwrap();
    let unread = fabric.unacked(&worker);
    assert_eq!(unread.get(&tasks_id).map(|u| u.count), Some(1));

    fabric.ack(&worker, &[msg.id.clone()]);
    assert!(fabric.unacked(&worker).get(&tasks_id).is_none());

    // A reply on the same thread creates a new unread.
    fabric
        .reply(ReplyParams::new(
            msg.id.clone(),
            "@worker-1 ping",
            coordinator(),
        ))
        .unwrap();
    let unread = fabric.unacked(&worker);
    assert_eq!(unread.get(&tasks_id).map(|u| u.count), Some(1));
}

#[test]
fn unacked_excludes_own_messages() {
    let fabric = seeded();
    let worker = AgentId::new("worker-1");
    fabric
        .subscribe("tasks", &worker, SubscriptionMode::All)
        .unwrap();
    fabric
        .send_message(SendMessageParams::new("tasks", "mine", worker.clone()))
        .unwrap();
    assert!(fabric.unacked(&worker).is_empty());
}

#[test]
fn unacked_respects_mentions_without_subscription() {
    let fabric = seeded();
    let msg = fabric
        .send_message(SendMessageParams::new(
            "planning",
            "fyi @worker-9",
            coordinator(),
        ))
        .unwrap();
    let unread = fabric.unacked(&AgentId::new("worker-9"));
    let planning = fabric.channel_id("planning").unwrap();
    assert_eq!(
        unread.get(&planning).map(|u| u.thread_ids.clone()),
        Some(vec![msg.id])
    );
}

#[test]
fn ack_skips_unknown_ids() {
    let fabric = seeded();
    let acked = fabric.ack(&coordinator(), &[ThreadId::new("missing")]);
    assert!(acked.is_empty());
}

#[test]
fn list_messages_is_chronological_and_limited() {
    let fabric = seeded();
    for i in 0..5 {
        fabric
            .send_message(SendMessageParams::new(
                "general",
                format!("m{i}"),
                coordinator(),
            ))
            .unwrap();
    }
    let all = fabric.list_messages("general", 0).unwrap();
    assert_eq!(all.len(), 5);
    assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));

    let last_two = fabric.list_messages("general", 2).unwrap();
    assert_eq!(last_two.len(), 2);
    assert_eq!(last_two[0].content, "m3");
    assert_eq!(last_two[1].content, "m4");
}

#[test]
fn archived_messages_drop_out_of_listings_but_stay_readable() {
    let fabric = seeded();
    let msg = fabric
        .send_message(SendMessageParams::new("general", "old", coordinator()))
        .unwrap();
    fabric.archive(&msg.id).unwrap();

    assert!(fabric.list_messages("general", 0).unwrap().is_empty());
    assert!(fabric.thread(&msg.id).unwrap().is_archived());
    assert!(fabric.unacked(&AgentId::new("worker-1")).is_empty());
}

#[test]
fn attach_artifact_links_and_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.md");
    std::fs::write(&path, "# plan").unwrap();

    let fabric = seeded();
    let msg = fabric
        .send_message(SendMessageParams::new("tasks", "see plan", coordinator()))
        .unwrap();
    let artifact = fabric
        .attach_artifact(&msg.id, &path, None, coordinator())
        .unwrap();

    let attached = fabric.artifacts(&msg.id);
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].id, artifact.id);
    let meta = attached[0].artifact.clone().unwrap();
    assert_eq!(meta.name, "plan.md");
    assert_eq!(meta.size_bytes, 6);

    let content = fabric.artifact_content(&artifact.id).unwrap();
    assert_eq!(content, b"# plan");
}

#[test]
fn attach_artifact_to_unknown_target_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.txt");
    std::fs::write(&path, "x").unwrap();

    let fabric = seeded();
    let result = fabric.attach_artifact(&ThreadId::new("missing"), &path, None, coordinator());
    assert!(matches!(result, Err(FabricError::UnknownThread(_))));
}

#[test]
fn unsubscribe_all_clears_every_channel() {
    let fabric = seeded();
    let worker = AgentId::new("worker-1");
    fabric
        .subscribe("tasks", &worker, SubscriptionMode::All)
        .unwrap();
    fabric
        .subscribe("general", &worker, SubscriptionMode::Mentions)
        .unwrap();

    fabric.unsubscribe_all(&worker);

    let tasks = fabric.channel_id("tasks").unwrap();
    let general = fabric.channel_id("general").unwrap();
    assert_eq!(fabric.subscription(&tasks, "worker-1"), None);
    assert_eq!(fabric.subscription(&general, "worker-1"), None);
}

#[tokio::test]
async fn events_are_published_for_mutations() {
    use tokio_util::sync::CancellationToken;

    let fabric = Fabric::new();
    let token = CancellationToken::new();
    let mut rx = fabric.events().subscribe(token.clone());

    fabric.init_session(&coordinator()).unwrap();
    let msg = fabric
        .send_message(SendMessageParams::new("tasks", "hi", coordinator()))
        .unwrap();

    let mut saw_channel_created = false;
    let mut saw_message_posted = false;
    for _ in 0..7 {
        match rx.recv().await.unwrap() {
            FabricEvent::ChannelCreated { .. } => saw_channel_created = true,
            FabricEvent::MessagePosted { thread, .. } => {
                assert_eq!(thread.id, msg.id);
                saw_message_posted = true;
            }
            _ => {}
        }
    }
    assert!(saw_channel_created);
    assert!(saw_message_posted);
}
