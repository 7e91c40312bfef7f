//! Mention fan-out: one debounced nudge to the mentioned subscriber,
//! none to the sender.

use crew_core::AgentId;
use crew_fabric::{
    Fabric, NotificationBroker, NotificationSink, NotifyError, NotifyPolicy, SendMessageParams,
    SubscriptionMode,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct RecordingSink {
    deliveries: Mutex<Vec<(String, String)>>,
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, recipient: AgentId, body: String) -> Result<(), NotifyError> {
        self.deliveries.lock().push((recipient.normalized(), body));
        Ok(())
    }
}

#[tokio::test]
async fn mention_fan_out_targets_only_the_recipient() {
    let fabric = Arc::new(Fabric::new());
    fabric.init_session(&AgentId::coordinator()).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let broker = NotificationBroker::start(
        Arc::clone(&fabric),
        sink.clone(),
        NotifyPolicy {
            debounce: Duration::from_millis(20),
            suppressed: HashSet::from(["observer".to_string()]),
        },
    );

    fabric
        .subscribe("tasks", &AgentId::new("WORKER.2"), SubscriptionMode::All)
        .unwrap();
    let message = fabric
        .send_message(SendMessageParams::new(
            "tasks",
            "hello @worker.2",
            AgentId::new("WORKER.1"),
        ))
        .unwrap();

    let mut deliveries = Vec::new();
    for _ in 0..200 {
        deliveries = sink.deliveries.lock().clone();
        if !deliveries.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(deliveries.len(), 1, "exactly one nudge after the debounce");
    let (recipient, body) = &deliveries[0];
    assert_eq!(recipient, "worker.2");
    assert!(body.contains("#tasks"));
    assert!(body.contains(message.id.short(8)));
    assert!(body.contains("fabric_inbox"));
    assert!(body.contains("fabric_read_thread"));

    broker.stop().await;
    assert!(!sink
        .deliveries
        .lock()
        .iter()
        .any(|(recipient, _)| recipient == "worker.1"));
}
