// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;

#[test]
fn write_overwrites_oldest_at_capacity() {
    let buffer = OutputBuffer::new(3);
    for line in ["a", "b", "c", "d"] {
        buffer.write(line);
    }
    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.lines(), vec!["b", "c", "d"]);
}

#[test]
fn capacity_floor_is_one() {
    let buffer = OutputBuffer::new(0);
    assert_eq!(buffer.capacity(), 1);
    buffer.write("x");
    buffer.write("y");
    assert_eq!(buffer.lines(), vec!["y"]);
}

#[test]
fn last_n_returns_trailing_lines_chronologically() {
    let buffer = OutputBuffer::new(10);
    for line in ["1", "2", "3", "4"] {
        buffer.write(line);
    }
    assert_eq!(buffer.last_n(2), vec!["3", "4"]);
    assert_eq!(buffer.last_n(100), vec!["1", "2", "3", "4"]);
}

#[test]
fn lines_returns_independent_copy() {
    let buffer = OutputBuffer::new(5);
    buffer.write("a");
    let snapshot = buffer.lines();
    buffer.write("b");
    assert_eq!(snapshot, vec!["a"]);
}

#[test]
fn clear_resets() {
    let buffer = OutputBuffer::new(5);
    buffer.write("a");
    buffer.clear();
    assert!(buffer.is_empty());
}

#[test]
fn concurrent_writers_never_exceed_capacity() {
    let buffer = Arc::new(OutputBuffer::new(8));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 0..100 {
                    buffer.write(format!("{t}-{i}"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(buffer.len(), 8);
}
