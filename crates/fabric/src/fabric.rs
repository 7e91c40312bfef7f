// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fabric repository.
//!
//! All mutating operations run under one coarse lock and assign a
//! strictly increasing global `seq`, so per-channel listings are
//! chronological and every operation is serializable from the
//! caller's perspective.

use crate::artifact::describe_file;
use crate::event::FabricEvent;
use crate::mention::extract_mentions;
use crate::thread::{
    Dependency, MessageKind, Relation, SubscriptionMode, Thread, ThreadId, ThreadType,
};
use crew_core::{now_millis, AgentId, Broker};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Channels created at session init, in seq order.
pub const FIXED_CHANNELS: [&str; 6] = ["root", "system", "tasks", "planning", "general", "observer"];

/// Errors from fabric operations.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("unknown thread: {0}")]
    UnknownThread(ThreadId),
    #[error("thread {0} is not a message")]
    NotAMessage(ThreadId),
    #[error("channel {0} already exists")]
    ChannelExists(String),
    #[error("artifact io: {0}")]
    ArtifactIo(#[from] std::io::Error),
}

/// Parameters for posting a message to a channel.
#[derive(Debug, Clone)]
pub struct SendMessageParams {
    pub channel_slug: String,
    pub content: String,
    pub kind: MessageKind,
    pub created_by: AgentId,
    /// Extra mentions beyond those extracted from the content.
    pub mentions: Vec<String>,
}

impl SendMessageParams {
    pub fn new(
        channel_slug: impl Into<String>,
        content: impl Into<String>,
        created_by: AgentId,
    ) -> Self {
        Self {
            channel_slug: channel_slug.into(),
            content: content.into(),
            kind: MessageKind::Info,
            created_by,
            mentions: Vec::new(),
        }
    }
}

/// Parameters for replying to a message.
#[derive(Debug, Clone)]
pub struct ReplyParams {
    pub parent_message_id: ThreadId,
    pub content: String,
    pub kind: MessageKind,
    pub created_by: AgentId,
}

impl ReplyParams {
    pub fn new(
        parent_message_id: ThreadId,
        content: impl Into<String>,
        created_by: AgentId,
    ) -> Self {
        Self {
            parent_message_id,
            content: content.into(),
            kind: MessageKind::Info,
            created_by,
        }
    }
}

/// Per-channel unread summary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnackedChannel {
    pub count: usize,
    pub thread_ids: Vec<ThreadId>,
}

struct FabricState {
    threads: HashMap<ThreadId, Thread>,
    deps: Vec<Dependency>,
    /// child_of edges in insertion (seq) order.
    children: HashMap<ThreadId, Vec<ThreadId>>,
    /// Flattened reply lists keyed by root id.
    replies: HashMap<ThreadId, Vec<ThreadId>>,
    reply_root: HashMap<ThreadId, ThreadId>,
    channels: BTreeMap<String, ThreadId>,
    /// channel -> normalized agent -> mode.
    subs: HashMap<ThreadId, BTreeMap<String, SubscriptionMode>>,
    /// thread -> normalized agents that acked it.
    acks: HashMap<ThreadId, HashSet<String>>,
    seq: u64,
}

impl FabricState {
    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    fn resolve_root(&self, id: &ThreadId) -> ThreadId {
        self.reply_root.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    /// Channel that a message (or reply) ultimately lives in.
    fn channel_of(&self, root: &ThreadId) -> Option<(ThreadId, String)> {
        let channel_id = self.deps.iter().find_map(|d| {
            (d.relation == Relation::ChildOf && &d.from == root).then(|| d.to.clone())
        })?;
        let slug = self
            .threads
            .get(&channel_id)
            .and_then(|t| t.slug.clone())?;
        Some((channel_id, slug))
    }
}

/// The message fabric. Cheap to share behind an `Arc`.
pub struct Fabric {
    state: Mutex<FabricState>,
    broker: Broker<FabricEvent>,
}

impl Default for Fabric {
    fn default() -> Self {
        Self::new()
    }
}

impl Fabric {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FabricState {
                threads: HashMap::new(),
                deps: Vec::new(),
                children: HashMap::new(),
                replies: HashMap::new(),
                reply_root: HashMap::new(),
                channels: BTreeMap::new(),
                subs: HashMap::new(),
                acks: HashMap::new(),
                seq: 0,
            }),
            broker: Broker::new(),
        }
    }

    /// Broker carrying [`FabricEvent`]s.
    pub fn events(&self) -> &Broker<FabricEvent> {
        &self.broker
    }

    /// Create the fixed channels and subscribe the initiator to
    /// `#system`.
    pub fn init_session(&self, initiator: &AgentId) -> Result<(), FabricError> {
        let mut created = Vec::new();
        {
            let mut state = self.state.lock();
            for slug in FIXED_CHANNELS {
                if state.channels.contains_key(slug) {
                    return Err(FabricError::ChannelExists(slug.to_string()));
                }
                let seq = state.next_seq();
                let id = ThreadId::generate();
                let thread = Thread {
                    id: id.clone(),
                    thread_type: ThreadType::Channel,
                    created_at: now_millis(),
                    created_by: initiator.clone(),
                    content: String::new(),
                    kind: MessageKind::Info,
                    slug: Some(slug.to_string()),
                    title: Some(format!("#{slug}")),
                    purpose: None,
                    artifact: None,
                    mentions: BTreeSet::new(),
                    participants: BTreeSet::from([initiator.normalized()]),
                    seq,
                    archived_at: None,
                };
                state.threads.insert(id.clone(), thread);
                state.channels.insert(slug.to_string(), id.clone());
                created.push((id, slug.to_string()));
            }
            let system_id = created
                .iter()
                .find(|(_, slug)| slug == "system")
                .map(|(id, _)| id.clone());
            if let Some(system_id) = system_id {
                state
                    .subs
                    .entry(system_id)
                    .or_default()
                    .insert(initiator.normalized(), SubscriptionMode::All);
            }
        }
        for (channel_id, slug) in created {
            self.broker.publish(FabricEvent::ChannelCreated { channel_id, slug });
        }
        Ok(())
    }

    /// Post a message to a channel.
    pub fn send_message(&self, params: SendMessageParams) -> Result<Thread, FabricError> {
        let (thread, channel_id, slug) = {
            let mut state = self.state.lock();
            let channel_id = state
                .channels
                .get(&params.channel_slug)
                .cloned()
                .ok_or_else(|| FabricError::UnknownChannel(params.channel_slug.clone()))?;

            let mut mentions = extract_mentions(&params.content);
            mentions.extend(params.mentions.iter().map(|m| m.to_lowercase()));
            let mut participants = mentions.clone();
            participants.insert(params.created_by.normalized());

            let seq = state.next_seq();
            let id = ThreadId::generate();
            let thread = Thread {
                id: id.clone(),
                thread_type: ThreadType::Message,
                created_at: now_millis(),
                created_by: params.created_by,
                content: params.content,
                kind: params.kind,
                slug: None,
                title: None,
                purpose: None,
                artifact: None,
                mentions,
                participants,
                seq,
                archived_at: None,
            };
            state.threads.insert(id.clone(), thread.clone());
            state.deps.push(Dependency {
                from: id.clone(),
                to: channel_id.clone(),
                relation: Relation::ChildOf,
            });
            state.children.entry(channel_id.clone()).or_default().push(id);
            (thread, channel_id, params.channel_slug)
        };

        self.broker.publish(FabricEvent::MessagePosted {
            channel_id,
            channel_slug: slug,
            mentions: thread.mentions.clone(),
            participants: thread.participants.clone(),
            thread: thread.clone(),
        });
        Ok(thread)
    }

    /// Reply to a message. The reply always attaches to the root of
    /// the parent's thread; intermediate replies never grow children.
    pub fn reply(&self, params: ReplyParams) -> Result<Thread, FabricError> {
        let (thread, root_id, channel_id, slug, participants) = {
            let mut state = self.state.lock();
            let parent = state
                .threads
                .get(&params.parent_message_id)
                .ok_or_else(|| FabricError::UnknownThread(params.parent_message_id.clone()))?;
            if parent.thread_type != ThreadType::Message {
                return Err(FabricError::NotAMessage(params.parent_message_id.clone()));
            }

            let root_id = state.resolve_root(&params.parent_message_id);
            let (channel_id, slug) = state
                .channel_of(&root_id)
                .ok_or_else(|| FabricError::UnknownThread(root_id.clone()))?;

            let mentions = extract_mentions(&params.content);
            let mut participants = mentions.clone();
            participants.insert(params.created_by.normalized());

            let seq = state.next_seq();
            let id = ThreadId::generate();
            let thread = Thread {
                id: id.clone(),
                thread_type: ThreadType::Message,
                created_at: now_millis(),
                created_by: params.created_by.clone(),
                content: params.content,
                kind: params.kind,
                slug: None,
                title: None,
                purpose: None,
                artifact: None,
                mentions: mentions.clone(),
                participants,
                seq,
                archived_at: None,
            };
            state.threads.insert(id.clone(), thread.clone());
            state.deps.push(Dependency {
                from: id.clone(),
                to: root_id.clone(),
                relation: Relation::ChildOf,
            });
            state.deps.push(Dependency {
                from: id.clone(),
                to: root_id.clone(),
                relation: Relation::ReplyTo,
            });
            state.replies.entry(root_id.clone()).or_default().push(id.clone());
            state.reply_root.insert(id, root_id.clone());

            // Merge the poster and mentions into the root's
            // participants; the set never shrinks.
            let root_participants = {
                let poster = params.created_by.normalized();
                let root = state
                    .threads
                    .get_mut(&root_id)
                    .ok_or_else(|| FabricError::UnknownThread(root_id.clone()))?;
                root.participants.insert(poster);
                root.participants.extend(mentions.iter().cloned());
                root.participants.clone()
            };

            (thread, root_id, channel_id, slug, root_participants)
        };

        self.broker.publish(FabricEvent::ReplyPosted {
            channel_id,
            channel_slug: slug,
            parent_id: root_id,
            mentions: thread.mentions.clone(),
            participants,
            thread: thread.clone(),
        });
        Ok(thread)
    }

    /// Attach an artifact reference to a channel or message. Hashes
    /// the file before taking the fabric lock.
    pub fn attach_artifact(
        &self,
        target_id: &ThreadId,
        path: &Path,
        name: Option<String>,
        created_by: AgentId,
    ) -> Result<Thread, FabricError> {
        let meta = describe_file(path, name)?;

        let thread = {
            let mut state = self.state.lock();
            if !state.threads.contains_key(target_id) {
                return Err(FabricError::UnknownThread(target_id.clone()));
            }
            let seq = state.next_seq();
            let id = ThreadId::generate();
            let thread = Thread {
                id: id.clone(),
                thread_type: ThreadType::Artifact,
                created_at: now_millis(),
                created_by: created_by.clone(),
                content: String::new(),
                kind: MessageKind::Info,
                slug: None,
                title: None,
                purpose: None,
                artifact: Some(meta),
                mentions: BTreeSet::new(),
                participants: BTreeSet::from([created_by.normalized()]),
                seq,
                archived_at: None,
            };
            state.threads.insert(id.clone(), thread.clone());
            state.deps.push(Dependency {
                from: id.clone(),
                to: target_id.clone(),
                relation: Relation::ChildOf,
            });
            state.children.entry(target_id.clone()).or_default().push(id);
            thread
        };

        self.broker.publish(FabricEvent::ArtifactAttached {
            target_id: target_id.clone(),
            artifact: thread.clone(),
        });
        Ok(thread)
    }

    /// Read artifact bytes from their storage location.
    pub fn artifact_content(&self, artifact_id: &ThreadId) -> Result<Vec<u8>, FabricError> {
        let uri = {
            let state = self.state.lock();
            let thread = state
                .threads
                .get(artifact_id)
                .ok_or_else(|| FabricError::UnknownThread(artifact_id.clone()))?;
            thread
                .artifact
                .as_ref()
                .map(|a| a.storage_uri.clone())
                .ok_or_else(|| FabricError::NotAMessage(artifact_id.clone()))?
        };
        Ok(std::fs::read(uri)?)
    }

    /// Acknowledge messages for an agent. Unknown ids are skipped;
    /// the acked ids are returned.
    pub fn ack(&self, agent: &AgentId, message_ids: &[ThreadId]) -> Vec<ThreadId> {
        let mut acked = Vec::new();
        {
            let mut state = self.state.lock();
            for id in message_ids {
                if !state.threads.contains_key(id) {
                    continue;
                }
                state
                    .acks
                    .entry(id.clone())
                    .or_default()
                    .insert(agent.normalized());
                acked.push(id.clone());
            }
        }
        for id in &acked {
            self.broker.publish(FabricEvent::MessageAcked {
                thread_id: id.clone(),
                agent: agent.normalized(),
            });
        }
        acked
    }

    pub fn subscribe(
        &self,
        channel_slug: &str,
        agent: &AgentId,
        mode: SubscriptionMode,
    ) -> Result<(), FabricError> {
        let mut state = self.state.lock();
        let channel_id = state
            .channels
            .get(channel_slug)
            .cloned()
            .ok_or_else(|| FabricError::UnknownChannel(channel_slug.to_string()))?;
        state
            .subs
            .entry(channel_id)
            .or_default()
            .insert(agent.normalized(), mode);
        Ok(())
    }

    pub fn unsubscribe(&self, channel_slug: &str, agent: &AgentId) -> Result<(), FabricError> {
        let mut state = self.state.lock();
        let channel_id = state
            .channels
            .get(channel_slug)
            .cloned()
            .ok_or_else(|| FabricError::UnknownChannel(channel_slug.to_string()))?;
        if let Some(subs) = state.subs.get_mut(&channel_id) {
            subs.remove(&agent.normalized());
        }
        Ok(())
    }

    pub fn unsubscribe_all(&self, agent: &AgentId) {
        let normalized = agent.normalized();
        let mut state = self.state.lock();
        for subs in state.subs.values_mut() {
            subs.remove(&normalized);
        }
    }

    /// Subscription mode for an agent on a channel, if any.
    pub fn subscription(&self, channel_id: &ThreadId, agent: &str) -> Option<SubscriptionMode> {
        let state = self.state.lock();
        state
            .subs
            .get(channel_id)
            .and_then(|subs| subs.get(&agent.to_lowercase()))
            .copied()
    }

    /// Normalized agents subscribed to a channel with the given mode.
    pub fn subscribers(&self, channel_id: &ThreadId, mode: SubscriptionMode) -> Vec<String> {
        let state = self.state.lock();
        state
            .subs
            .get(channel_id)
            .map(|subs| {
                subs.iter()
                    .filter(|(_, m)| **m == mode)
                    .map(|(agent, _)| agent.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Per-channel unread summary for an agent.
    ///
    /// A message or reply is unread for A when A did not create it,
    /// has not acked it, and is either a participant of its root,
    /// mentioned directly, or subscribed to the channel in mode=all.
    pub fn unacked(&self, agent: &AgentId) -> BTreeMap<ThreadId, UnackedChannel> {
        let normalized = agent.normalized();
        let state = self.state.lock();
        let mut out: BTreeMap<ThreadId, UnackedChannel> = BTreeMap::new();

        for channel_id in state.channels.values() {
            let archived = state
                .threads
                .get(channel_id)
                .is_none_or(|c| c.is_archived());
            if archived {
                continue;
            }
            let sub_all = state
                .subs
                .get(channel_id)
                .and_then(|subs| subs.get(&normalized))
                .is_some_and(|m| *m == SubscriptionMode::All);

            let roots = state.children.get(channel_id).cloned().unwrap_or_default();
            for root_id in roots {
                let Some(root) = state.threads.get(&root_id) else {
                    continue;
                };
                if root.thread_type != ThreadType::Message || root.is_archived() {
                    continue;
                }
                let mut candidates = vec![root_id.clone()];
                if let Some(replies) = state.replies.get(&root_id) {
                    candidates.extend(replies.iter().cloned());
                }
                for id in candidates {
                    let Some(thread) = state.threads.get(&id) else {
                        continue;
                    };
                    if thread.created_by.normalized() == normalized {
                        continue;
                    }
                    if state
                        .acks
                        .get(&id)
                        .is_some_and(|agents| agents.contains(&normalized))
                    {
                        continue;
                    }
                    let relevant = sub_all
                        || thread.mentions.contains(&normalized)
                        || root.participants.contains(&normalized);
                    if !relevant {
                        continue;
                    }
                    let entry = out.entry(channel_id.clone()).or_default();
                    entry.count += 1;
                    entry.thread_ids.push(id);
                }
            }
        }
        out
    }

    /// Chronological messages in a channel, excluding archived ones.
    /// `limit` of 0 means no limit.
    pub fn list_messages(&self, channel_slug: &str, limit: usize) -> Result<Vec<Thread>, FabricError> {
        let state = self.state.lock();
        let channel_id = state
            .channels
            .get(channel_slug)
            .cloned()
            .ok_or_else(|| FabricError::UnknownChannel(channel_slug.to_string()))?;
        let ids = state.children.get(&channel_id).cloned().unwrap_or_default();
        let messages: Vec<Thread> = ids
            .iter()
            .filter_map(|id| state.threads.get(id))
            .filter(|t| t.thread_type == ThreadType::Message && !t.is_archived())
            .cloned()
            .collect();
        let skip = if limit == 0 {
            0
        } else {
            messages.len().saturating_sub(limit)
        };
        Ok(messages.into_iter().skip(skip).collect())
    }

    /// Direct replies of a root, in seq order. Replies of replies are
    /// always empty by the flattening invariant.
    pub fn replies(&self, root_id: &ThreadId) -> Vec<Thread> {
        let state = self.state.lock();
        state
            .replies
            .get(root_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.threads.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Artifact children of a channel or message.
    pub fn artifacts(&self, target_id: &ThreadId) -> Vec<Thread> {
        let state = self.state.lock();
        state
            .children
            .get(target_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.threads.get(id))
                    .filter(|t| t.thread_type == ThreadType::Artifact)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn thread(&self, id: &ThreadId) -> Option<Thread> {
        self.state.lock().threads.get(id).cloned()
    }

    /// Whether an agent has acked a thread.
    pub fn is_acked(&self, id: &ThreadId, agent: &AgentId) -> bool {
        let state = self.state.lock();
        state
            .acks
            .get(id)
            .is_some_and(|agents| agents.contains(&agent.normalized()))
    }

    /// Root of a message's thread (itself, for a root message).
    pub fn root_of(&self, id: &ThreadId) -> ThreadId {
        self.state.lock().resolve_root(id)
    }

    pub fn channel_id(&self, slug: &str) -> Option<ThreadId> {
        self.state.lock().channels.get(slug).cloned()
    }

    pub fn channel_slug(&self, id: &ThreadId) -> Option<String> {
        self.state.lock().threads.get(id).and_then(|t| t.slug.clone())
    }

    /// (slug, id, message count) for every channel, in slug order.
    pub fn list_channels(&self) -> Vec<(String, ThreadId, usize)> {
        let state = self.state.lock();
        state
            .channels
            .iter()
            .map(|(slug, id)| {
                let count = state
                    .children
                    .get(id)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(|cid| state.threads.get(cid))
                            .filter(|t| t.thread_type == ThreadType::Message)
                            .count()
                    })
                    .unwrap_or(0);
                (slug.clone(), id.clone(), count)
            })
            .collect()
    }

    /// Mark a thread archived. Archived threads drop out of listings
    /// and unread counts but stay readable by id.
    pub fn archive(&self, id: &ThreadId) -> Result<(), FabricError> {
        let mut state = self.state.lock();
        let thread = state
            .threads
            .get_mut(id)
            .ok_or_else(|| FabricError::UnknownThread(id.clone()))?;
        if thread.archived_at.is_none() {
            thread.archived_at = Some(now_millis());
        }
        Ok(())
    }

    /// Close the event broker. Repository reads keep working.
    pub fn close(&self) {
        self.broker.close();
    }
}

#[cfg(test)]
#[path = "fabric_tests.rs"]
mod tests;
