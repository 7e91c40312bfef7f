// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool surface the assistant processes call into.
//!
//! Each handler takes JSON params and returns a human-readable
//! summary plus a structured payload. The MCP transport in front of
//! this router is an opaque request/response protocol; everything
//! here is plain dispatch.

use crate::error::ToolError;
use crate::pool::{WorkerPool, WorkerSpawnSpec};
use crew_core::AgentId;
use crew_fabric::{
    Fabric, MessageKind, ReplyParams, SendMessageParams, SubscriptionMode, Thread, ThreadId,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Channels addressable from tool calls.
const TOOL_CHANNELS: [&str; 5] = ["tasks", "planning", "general", "system", "observer"];

/// Preview length for inbox listings.
const PREVIEW_LEN: usize = 80;

/// A tool call result: summary for the model, payload for machines.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ToolResponse {
    pub summary: String,
    pub payload: Value,
}

impl ToolResponse {
    fn new(summary: impl Into<String>, payload: Value) -> Self {
        Self {
            summary: summary.into(),
            payload,
        }
    }
}

/// Dispatches tool calls on behalf of one caller agent.
pub struct ToolRouter {
    caller: AgentId,
    fabric: Arc<Fabric>,
    pool: WorkerPool,
}

fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolError> {
    serde_json::from_value(params).map_err(|e| ToolError::InvalidParams(e.to_string()))
}

fn validate_channel(channel: &str) -> Result<(), ToolError> {
    if TOOL_CHANNELS.contains(&channel) {
        Ok(())
    } else {
        Err(ToolError::InvalidChannel(channel.to_string()))
    }
}

fn preview(content: &str) -> String {
    let flat = content.replace('\n', " ");
    if flat.len() <= PREVIEW_LEN {
        return flat;
    }
    let mut end = PREVIEW_LEN;
    while !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &flat[..end])
}

fn thread_json(thread: &Thread) -> Value {
    json!({
        "id": thread.id,
        "from": thread.created_by,
        "kind": thread.kind,
        "content": thread.content,
        "mentions": thread.mentions,
        "participants": thread.participants,
        "seq": thread.seq,
        "created_at": thread.created_at,
    })
}

#[derive(Deserialize)]
struct SendParams {
    channel: String,
    content: String,
    #[serde(default)]
    kind: Option<MessageKind>,
}

#[derive(Deserialize)]
struct ReplyToolParams {
    message_id: String,
    content: String,
    #[serde(default)]
    kind: Option<MessageKind>,
}

#[derive(Deserialize)]
struct AckParams {
    message_ids: Vec<String>,
}

#[derive(Deserialize)]
struct SubscribeParams {
    channel: String,
    #[serde(default)]
    mode: Option<SubscriptionMode>,
}

#[derive(Deserialize)]
struct UnsubscribeParams {
    channel: String,
}

#[derive(Deserialize)]
struct AttachParams {
    target_id: String,
    path: PathBuf,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct HistoryParams {
    channel: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    include_acked: Option<bool>,
}

#[derive(Deserialize)]
struct ReadThreadParams {
    message_id: String,
    #[serde(default)]
    include_artifacts: Option<bool>,
}

#[derive(Deserialize)]
struct SpawnWorkerParams {
    prompt: String,
    #[serde(default)]
    task_id: Option<String>,
}

#[derive(Deserialize)]
struct AssignTaskParams {
    worker_id: String,
    task_id: String,
}

#[derive(Deserialize)]
struct SendToWorkerParams {
    worker_id: String,
    message: String,
}

#[derive(Deserialize)]
struct WorkerIdParams {
    worker_id: String,
}

#[derive(Deserialize)]
struct ReplaceWorkerParams {
    worker_id: String,
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Deserialize, Default)]
struct QueryWorkerParams {
    #[serde(default)]
    worker_id: Option<String>,
}

impl ToolRouter {
    pub fn new(caller: AgentId, fabric: Arc<Fabric>, pool: WorkerPool) -> Self {
        Self {
            caller,
            fabric,
            pool,
        }
    }

    /// Dispatch one tool call by name.
    pub async fn dispatch(&self, tool: &str, params: Value) -> Result<ToolResponse, ToolError> {
        match tool {
            "fabric_inbox" => self.fabric_inbox(),
            "fabric_send" => self.fabric_send(parse(params)?),
            "fabric_reply" => self.fabric_reply(parse(params)?),
            "fabric_ack" => self.fabric_ack(parse(params)?),
            "fabric_subscribe" => self.fabric_subscribe(parse(params)?),
            "fabric_unsubscribe" => self.fabric_unsubscribe(parse(params)?),
            "fabric_attach" => self.fabric_attach(parse(params)?),
            "fabric_history" => self.fabric_history(parse(params)?),
            "fabric_read_thread" => self.fabric_read_thread(parse(params)?),
            "spawn_worker" => self.spawn_worker(parse(params)?).await,
            "assign_task" => self.assign_task(parse(params)?),
            "send_to_worker" => self.send_to_worker(parse(params)?).await,
            "retire_worker" => self.retire_worker(parse(params)?),
            "replace_worker" => self.replace_worker(parse(params)?).await,
            "query_worker_state" => self.query_worker_state(parse(params)?),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    fn fabric_inbox(&self) -> Result<ToolResponse, ToolError> {
        let unread = self.fabric.unacked(&self.caller);
        let mut channels = Vec::new();
        let mut total = 0usize;
        for (channel_id, entry) in &unread {
            total += entry.count;
            let slug = self
                .fabric
                .channel_slug(channel_id)
                .unwrap_or_else(|| channel_id.to_string());
            let threads: Vec<Value> = entry
                .thread_ids
                .iter()
                .take(10)
                .filter_map(|id| self.fabric.thread(id))
                .map(|t| {
                    json!({
                        "id": t.id,
                        "from": t.created_by,
                        "preview": preview(&t.content),
                    })
                })
                .collect();
            channels.push(json!({
                "channel": slug,
                "count": entry.count,
                "threads": threads,
            }));
        }
        let summary = if total == 0 {
            "Inbox empty.".to_string()
        } else {
            format!("{total} unread message(s) across {} channel(s).", channels.len())
        };
        Ok(ToolResponse::new(summary, json!({ "channels": channels })))
    }

    fn fabric_send(&self, params: SendParams) -> Result<ToolResponse, ToolError> {
        validate_channel(&params.channel)?;
        let mut message =
            SendMessageParams::new(params.channel.clone(), params.content, self.caller.clone());
        message.kind = params.kind.unwrap_or_default();
        let thread = self.fabric.send_message(message)?;
        Ok(ToolResponse::new(
            format!("Posted to #{} (message {}).", params.channel, thread.id.short(8)),
            json!({ "message_id": thread.id, "seq": thread.seq, "mentions": thread.mentions }),
        ))
    }

    fn fabric_reply(&self, params: ReplyToolParams) -> Result<ToolResponse, ToolError> {
        let mut reply = ReplyParams::new(
            ThreadId::new(params.message_id),
            params.content,
            self.caller.clone(),
        );
        reply.kind = params.kind.unwrap_or_default();
        let thread = self.fabric.reply(reply)?;
        let root = self.fabric.root_of(&thread.id);
        Ok(ToolResponse::new(
            format!("Replied in thread {}.", root.short(8)),
            json!({ "reply_id": thread.id, "root_id": root, "seq": thread.seq }),
        ))
    }

    fn fabric_ack(&self, params: AckParams) -> Result<ToolResponse, ToolError> {
        let ids: Vec<ThreadId> = params.message_ids.into_iter().map(ThreadId::new).collect();
        let acked = self.fabric.ack(&self.caller, &ids);
        Ok(ToolResponse::new(
            format!("Acked {} message(s).", acked.len()),
            json!({ "acked": acked }),
        ))
    }

    fn fabric_subscribe(&self, params: SubscribeParams) -> Result<ToolResponse, ToolError> {
        validate_channel(&params.channel)?;
        let mode = params.mode.unwrap_or_default();
        self.fabric.subscribe(&params.channel, &self.caller, mode)?;
        Ok(ToolResponse::new(
            format!("Subscribed to #{} (mode {:?}).", params.channel, mode),
            json!({ "channel": params.channel }),
        ))
    }

    fn fabric_unsubscribe(&self, params: UnsubscribeParams) -> Result<ToolResponse, ToolError> {
        validate_channel(&params.channel)?;
        self.fabric.unsubscribe(&params.channel, &self.caller)?;
        Ok(ToolResponse::new(
            format!("Unsubscribed from #{}.", params.channel),
            json!({ "channel": params.channel }),
        ))
    }

    fn fabric_attach(&self, params: AttachParams) -> Result<ToolResponse, ToolError> {
        let artifact = self.fabric.attach_artifact(
            &ThreadId::new(params.target_id.clone()),
            &params.path,
            params.name,
            self.caller.clone(),
        )?;
        let meta = artifact.artifact.clone().unwrap_or_else(|| {
            // attach_artifact always sets metadata; this is a shape
            // guard for serialization only.
            crew_fabric::ArtifactMeta {
                name: String::new(),
                media_type: String::new(),
                size_bytes: 0,
                storage_uri: String::new(),
                sha256: String::new(),
            }
        });
        Ok(ToolResponse::new(
            format!("Attached {} ({} bytes).", meta.name, meta.size_bytes),
            json!({ "artifact_id": artifact.id, "sha256": meta.sha256, "media_type": meta.media_type }),
        ))
    }

    fn fabric_history(&self, params: HistoryParams) -> Result<ToolResponse, ToolError> {
        validate_channel(&params.channel)?;
        let limit = params.limit.unwrap_or(20);
        let include_acked = params.include_acked.unwrap_or(true);
        let messages = self.fabric.list_messages(&params.channel, limit)?;
        let items: Vec<Value> = messages
            .iter()
            .filter(|t| include_acked || !self.fabric.is_acked(&t.id, &self.caller))
            .map(thread_json)
            .collect();
        Ok(ToolResponse::new(
            format!("{} message(s) in #{}.", items.len(), params.channel),
            json!({ "channel": params.channel, "messages": items }),
        ))
    }

    fn fabric_read_thread(&self, params: ReadThreadParams) -> Result<ToolResponse, ToolError> {
        let id = ThreadId::new(params.message_id);
        let root_id = self.fabric.root_of(&id);
        let root = self
            .fabric
            .thread(&root_id)
            .ok_or_else(|| crew_fabric::FabricError::UnknownThread(root_id.clone()))?;
        let replies: Vec<Value> = self
            .fabric
            .replies(&root_id)
            .iter()
            .map(thread_json)
            .collect();
        let mut payload = json!({
            "root": thread_json(&root),
            "replies": replies,
        });
        if params.include_artifacts.unwrap_or(false) {
            let artifacts: Vec<Value> = self
                .fabric
                .artifacts(&root_id)
                .iter()
                .map(|t| json!({ "id": t.id, "meta": t.artifact }))
                .collect();
            payload["artifacts"] = Value::Array(artifacts);
        }
        Ok(ToolResponse::new(
            format!("Thread {} with {} repl(ies).", root_id.short(8), replies.len()),
            payload,
        ))
    }

    async fn spawn_worker(&self, params: SpawnWorkerParams) -> Result<ToolResponse, ToolError> {
        let mut spec = WorkerSpawnSpec::new(params.prompt);
        spec.task_id = params.task_id;
        let worker_id = self.pool.spawn_worker(spec).await?;
        Ok(ToolResponse::new(
            format!("Spawned {worker_id}."),
            json!({ "worker_id": worker_id }),
        ))
    }

    fn assign_task(&self, params: AssignTaskParams) -> Result<ToolResponse, ToolError> {
        self.pool.assign_task(&params.worker_id, &params.task_id)?;
        Ok(ToolResponse::new(
            format!("Assigned {} to {}.", params.task_id, params.worker_id),
            json!({ "worker_id": params.worker_id, "task_id": params.task_id }),
        ))
    }

    async fn send_to_worker(&self, params: SendToWorkerParams) -> Result<ToolResponse, ToolError> {
        self.pool
            .resume_worker(&params.worker_id, &params.message)
            .await?;
        Ok(ToolResponse::new(
            format!("Message sent to {}.", params.worker_id),
            json!({ "worker_id": params.worker_id }),
        ))
    }

    fn retire_worker(&self, params: WorkerIdParams) -> Result<ToolResponse, ToolError> {
        self.pool.retire_worker(&params.worker_id)?;
        Ok(ToolResponse::new(
            format!("Retired {}.", params.worker_id),
            json!({ "worker_id": params.worker_id }),
        ))
    }

    /// Retire a worker and spawn a fresh one carrying its task.
    async fn replace_worker(&self, params: ReplaceWorkerParams) -> Result<ToolResponse, ToolError> {
        let old = self
            .pool
            .worker(&params.worker_id)
            .ok_or_else(|| crate::error::PoolError::WorkerNotFound(params.worker_id.clone()))?;
        let task_id = old.task_id();
        self.pool.retire_worker(&params.worker_id)?;

        let prompt = params.prompt.unwrap_or_else(|| {
            match &task_id {
                Some(task) => format!("Pick up task {task} where the previous worker left off."),
                None => "Pick up where the previous worker left off.".to_string(),
            }
        });
        let mut spec = WorkerSpawnSpec::new(prompt);
        spec.task_id = task_id;
        let new_id = self.pool.spawn_worker(spec).await?;
        Ok(ToolResponse::new(
            format!("Replaced {} with {new_id}.", params.worker_id),
            json!({ "retired": params.worker_id, "worker_id": new_id }),
        ))
    }

    fn query_worker_state(&self, params: QueryWorkerParams) -> Result<ToolResponse, ToolError> {
        let snapshots: Vec<Value> = match params.worker_id {
            Some(worker_id) => {
                let worker = self
                    .pool
                    .worker(&worker_id)
                    .ok_or_else(|| crate::error::PoolError::WorkerNotFound(worker_id.clone()))?;
                vec![json!({
                    "worker": worker.snapshot(),
                    "recent_output": worker.output().last_n(10),
                })]
            }
            None => self
                .pool
                .workers()
                .iter()
                .map(|w| {
                    json!({
                        "worker": w.snapshot(),
                        "recent_output": w.output().last_n(10),
                    })
                })
                .collect(),
        };
        Ok(ToolResponse::new(
            format!("{} worker(s).", snapshots.len()),
            json!({ "workers": snapshots }),
        ))
    }
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
