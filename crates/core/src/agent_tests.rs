// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn well_known_ids() {
    assert_eq!(AgentId::coordinator(), "COORDINATOR");
    assert_eq!(AgentId::user(), "USER");
    assert_eq!(AgentId::worker(3), "worker-3");
}

#[test]
fn normalized_lowercases() {
    assert_eq!(AgentId::new("WORKER.2").normalized(), "worker.2");
}

#[test]
fn matches_is_case_insensitive() {
    assert!(AgentId::new("Coordinator").is_coordinator());
    assert!(AgentId::new("coordinator").matches("COORDINATOR"));
    assert!(!AgentId::new("worker-1").is_coordinator());
}

#[parameterized(
    dash = { "worker-2", Some(2) },
    dot = { "worker.2", Some(2) },
    upper = { "WORKER.7", Some(7) },
    coordinator = { "COORDINATOR", None },
    bare = { "worker", None },
    trailing_junk = { "worker-2x", None },
)]
fn worker_ordinal(id: &str, expected: Option<u64>) {
    assert_eq!(AgentId::new(id).worker_ordinal(), expected);
}

#[test]
fn pool_worker_id_canonicalizes() {
    assert_eq!(
        AgentId::new("WORKER.4").pool_worker_id(),
        Some("worker-4".to_string())
    );
    assert_eq!(AgentId::user().pool_worker_id(), None);
}
