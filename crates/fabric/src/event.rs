// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fabric domain events.

use crate::thread::{Thread, ThreadId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Events emitted by the fabric on every mutation, consumed by the
/// notification broker and any UI subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FabricEvent {
    #[serde(rename = "fabric:channel_created")]
    ChannelCreated { channel_id: ThreadId, slug: String },

    #[serde(rename = "fabric:message_posted")]
    MessagePosted {
        channel_id: ThreadId,
        channel_slug: String,
        thread: Thread,
        mentions: BTreeSet<String>,
        participants: BTreeSet<String>,
    },

    #[serde(rename = "fabric:reply_posted")]
    ReplyPosted {
        channel_id: ThreadId,
        channel_slug: String,
        parent_id: ThreadId,
        thread: Thread,
        mentions: BTreeSet<String>,
        /// Participants of the root after merging in this reply's
        /// poster and mentions.
        participants: BTreeSet<String>,
    },

    #[serde(rename = "fabric:artifact_attached")]
    ArtifactAttached {
        target_id: ThreadId,
        artifact: Thread,
    },

    #[serde(rename = "fabric:message_acked")]
    MessageAcked { thread_id: ThreadId, agent: String },
}
