//! Shared rig for behavioral specs.

use crew_client::{ClientKind, ScriptedClient};
use crew_core::{AgentId, EventType, OutputEvent, Usage};
use crew_engine::{Coordinator, CoordinatorConfig, WorkerPool, WorkerPoolConfig};
use crew_fabric::Fabric;
use std::sync::Arc;
use std::time::Duration;

pub fn init_event(session: &str) -> OutputEvent {
    OutputEvent {
        event_type: EventType::System,
        subtype: "init".to_string(),
        session_id: session.to_string(),
        ..OutputEvent::default()
    }
}

pub fn assistant_text(text: &str) -> OutputEvent {
    OutputEvent {
        event_type: EventType::Assistant,
        message: Some(crew_core::EventMessage {
            role: "assistant".to_string(),
            model: None,
            content: vec![crew_core::ContentBlock::Text {
                text: text.to_string(),
            }],
        }),
        ..OutputEvent::default()
    }
}

pub fn success_result() -> OutputEvent {
    OutputEvent {
        event_type: EventType::Result,
        usage: Some(Usage {
            input_tokens: 25,
            output_tokens: 5,
            ..Usage::default()
        }),
        total_cost_usd: Some(0.01),
        ..OutputEvent::default()
    }
}

/// A coordinator wired to a scripted client, a pool, and a seeded
/// fabric.
pub fn rig(work_dir: &std::path::Path) -> (ScriptedClient, Coordinator) {
    let client = ScriptedClient::new();
    let pool = WorkerPool::new(
        WorkerPoolConfig::new(ClientKind::Claude, work_dir),
        Arc::new(client.clone()),
    );
    let fabric = Arc::new(Fabric::new());
    fabric.init_session(&AgentId::coordinator()).unwrap();
    let coordinator = Coordinator::new(
        CoordinatorConfig::new(ClientKind::Claude, work_dir),
        Arc::new(client.clone()),
        pool,
        fabric,
    );
    (client, coordinator)
}

pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}
