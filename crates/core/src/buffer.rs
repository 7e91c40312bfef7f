// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-worker output ring buffer.
//!
//! Keeps the last N text lines a worker produced so diagnostic tools
//! can show recent activity without retaining full transcripts.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Fixed-capacity ring of output lines, safe for concurrent use.
///
/// `lines` and `last_n` return independent copies, never a view into
/// the ring.
#[derive(Debug)]
pub struct OutputBuffer {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl OutputBuffer {
    /// A ring holding at most `capacity` lines (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when full.
    pub fn write(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All buffered lines in chronological order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    /// The trailing `n` lines in chronological order.
    pub fn last_n(&self, n: usize) -> Vec<String> {
        let lines = self.lines.lock();
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
