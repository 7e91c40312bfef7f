//! Session init: the fixed channels exist and the initiator is
//! subscribed to #system.

use crew_core::AgentId;
use crew_fabric::{Fabric, SubscriptionMode, ThreadType, FIXED_CHANNELS};

#[test]
fn init_session_creates_channels_and_system_subscription() {
    let fabric = Fabric::new();
    fabric.init_session(&AgentId::coordinator()).unwrap();

    let slugs: Vec<String> = fabric
        .list_channels()
        .into_iter()
        .map(|(slug, _, _)| slug)
        .collect();
    for expected in FIXED_CHANNELS {
        assert!(slugs.iter().any(|s| s == expected), "missing #{expected}");
    }
    assert_eq!(slugs.len(), 6);

    for slug in FIXED_CHANNELS {
        let id = fabric.channel_id(slug).unwrap();
        assert_eq!(fabric.thread(&id).unwrap().thread_type, ThreadType::Channel);
    }

    let system = fabric.channel_id("system").unwrap();
    assert_eq!(
        fabric.subscription(&system, "COORDINATOR"),
        Some(SubscriptionMode::All)
    );
}
