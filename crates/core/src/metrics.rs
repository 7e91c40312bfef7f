// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token and cost accounting.

use crate::event::Usage;
use serde::{Deserialize, Serialize};

/// Which vendor event the per-turn numbers were read from.
///
/// Some vendors under-report usage on the result event; their parsers
/// attach usage to the assistant event instead. Consumers get the
/// provenance rather than a silently-picked number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageSource {
    #[default]
    Result,
    Assistant,
}

/// Accumulated token metrics for one agent session.
///
/// Per-turn fields are replaced on each completed turn;
/// `total_cost_usd` is monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub context_window: u64,
    pub turn_cost_usd: f64,
    pub total_cost_usd: f64,
    pub usage_source: UsageSource,
}

impl TokenMetrics {
    /// Build per-turn metrics from a usage block.
    pub fn from_usage(usage: &Usage, source: UsageSource) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_read_input_tokens: usage.cache_read_input_tokens,
            cache_creation_input_tokens: usage.cache_creation_input_tokens,
            usage_source: source,
            ..Self::default()
        }
    }

    /// Tokens occupying the context window after this turn.
    pub fn context_tokens(&self) -> u64 {
        self.input_tokens + self.cache_read_input_tokens + self.cache_creation_input_tokens
    }

    /// Fold a completed turn into the running totals. Per-turn numbers
    /// are replaced; total cost accumulates.
    pub fn record_turn(&mut self, turn: &TokenMetrics) {
        let total = self.total_cost_usd + turn.turn_cost_usd;
        *self = *turn;
        self.total_cost_usd = total;
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
