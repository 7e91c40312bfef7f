// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn configuration and the vendor registry.

use crate::parser::{ClaudeParser, CodexParser, EventParser, GeminiParser, OpenCodeParser};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Supported assistant CLI vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    Claude,
    Codex,
    Gemini,
    OpenCode,
}

impl ClientKind {
    pub fn binary_name(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
            Self::OpenCode => "opencode",
        }
    }

    /// Install locations checked before falling back to `PATH`.
    pub fn well_known_paths(&self) -> Vec<PathBuf> {
        let name = self.binary_name();
        let mut paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".local/bin").join(name));
            if *self == Self::Claude {
                paths.push(home.join(".claude/local/claude"));
            }
        }
        paths.push(PathBuf::from("/usr/local/bin").join(name));
        paths.push(PathBuf::from("/opt/homebrew/bin").join(name));
        paths
    }

    /// The vendor's streaming-JSON parser.
    pub fn parser(&self) -> Arc<dyn EventParser> {
        match self {
            Self::Claude => Arc::new(ClaudeParser),
            Self::Codex => Arc::new(CodexParser),
            Self::Gemini => Arc::new(GeminiParser),
            Self::OpenCode => Arc::new(OpenCodeParser),
        }
    }
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.binary_name())
    }
}

/// Configuration for one assistant turn.
///
/// A process runs `--print` style: one spawn per exchange, resumed via
/// `session_id` on the next exchange.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub client: ClientKind,
    pub work_dir: PathBuf,
    pub prompt: String,
    /// Resume an existing session instead of starting fresh.
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub append_system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub mcp_config: Option<PathBuf>,
    pub skip_permissions: bool,
    /// Hard deadline for the whole turn. `None` disables.
    pub timeout: Option<Duration>,
    pub env: Vec<(String, String)>,
    /// Vendor-specific extensions (model aliases, env tweaks). Unknown
    /// keys are ignored.
    pub extensions: HashMap<String, String>,
}

impl SpawnConfig {
    pub fn new(client: ClientKind, work_dir: impl Into<PathBuf>, prompt: impl Into<String>) -> Self {
        Self {
            client,
            work_dir: work_dir.into(),
            prompt: prompt.into(),
            session_id: None,
            model: None,
            append_system_prompt: None,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            mcp_config: None,
            skip_permissions: false,
            timeout: None,
            env: Vec::new(),
            extensions: HashMap::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the argv for this turn.
    ///
    /// Shared positions, in order: print-mode flag, output-format
    /// flag, verbose flag, resume, model, skip-permissions,
    /// append-system-prompt, allowed/disallowed tool pairs, MCP
    /// config, then always `--` before the prompt so it can never be
    /// read as a flag.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        match self.client {
            ClientKind::Claude => {
                args.extend(["--print", "--output-format", "stream-json", "--verbose"].map(String::from));
                if let Some(session) = &self.session_id {
                    args.push("--resume".to_string());
                    args.push(session.clone());
                }
                if let Some(model) = &self.model {
                    args.push("--model".to_string());
                    args.push(model.clone());
                }
                if self.skip_permissions {
                    args.push("--dangerously-skip-permissions".to_string());
                }
                if let Some(prompt) = &self.append_system_prompt {
                    args.push("--append-system-prompt".to_string());
                    args.push(prompt.clone());
                }
                for tool in &self.allowed_tools {
                    args.push("--allowedTools".to_string());
                    args.push(tool.clone());
                }
                for tool in &self.disallowed_tools {
                    args.push("--disallowedTools".to_string());
                    args.push(tool.clone());
                }
                if let Some(mcp) = &self.mcp_config {
                    args.push("--mcp-config".to_string());
                    args.push(mcp.display().to_string());
                }
            }
            ClientKind::Codex => {
                args.extend(["exec", "--json"].map(String::from));
                if let Some(session) = &self.session_id {
                    args.push("resume".to_string());
                    args.push(session.clone());
                }
                if let Some(model) = &self.model {
                    args.push("--model".to_string());
                    args.push(model.clone());
                }
                if self.skip_permissions {
                    args.push("--dangerously-bypass-approvals-and-sandbox".to_string());
                }
                if let Some(mcp) = &self.mcp_config {
                    args.push("--mcp-config".to_string());
                    args.push(mcp.display().to_string());
                }
            }
            ClientKind::Gemini | ClientKind::OpenCode => {
                args.extend(["run", "--output-format", "stream-json"].map(String::from));
                if let Some(session) = &self.session_id {
                    args.push("--session".to_string());
                    args.push(session.clone());
                }
                if let Some(model) = &self.model {
                    args.push("--model".to_string());
                    args.push(model.clone());
                }
                if self.skip_permissions {
                    args.push("--yolo".to_string());
                }
            }
        }
        args.push("--".to_string());
        args.push(self.prompt.clone());
        args
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
