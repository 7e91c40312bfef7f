//! Reply flattening: nested replies collapse to depth 1 under the
//! root, and the root's participants accumulate every poster.

use crew_core::AgentId;
use crew_fabric::{Fabric, ReplyParams, SendMessageParams};

#[test]
fn nested_replies_flatten_under_the_root() {
    let fabric = Fabric::new();
    fabric.init_session(&AgentId::coordinator()).unwrap();

    let m = fabric
        .send_message(SendMessageParams::new(
            "general",
            "root message",
            AgentId::new("alice"),
        ))
        .unwrap();
    let r1 = fabric
        .reply(ReplyParams::new(m.id.clone(), "one", AgentId::new("bob")))
        .unwrap();
    let r2 = fabric
        .reply(ReplyParams::new(r1.id.clone(), "two", AgentId::new("carol")))
        .unwrap();
    let r3 = fabric
        .reply(ReplyParams::new(r2.id.clone(), "three", AgentId::new("dave")))
        .unwrap();

    let replies: Vec<_> = fabric
        .replies(&m.id)
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(replies, vec![r1.id.clone(), r2.id.clone(), r3.id.clone()]);
    assert!(fabric.replies(&r1.id).is_empty());
    assert!(fabric.replies(&r2.id).is_empty());
    assert!(fabric.replies(&r3.id).is_empty());

    let root = fabric.thread(&m.id).unwrap();
    for poster in ["alice", "bob", "carol", "dave"] {
        assert!(root.participants.contains(poster), "missing {poster}");
    }

    // The nominal roots resolve through any link in the chain.
    assert_eq!(fabric.root_of(&r3.id), m.id);
    assert_eq!(fabric.root_of(&m.id), m.id);
}
