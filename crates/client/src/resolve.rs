// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vendor CLI binary resolution.

use crate::config::ClientKind;
use crate::process::SpawnError;
use std::path::PathBuf;

/// Locate the vendor binary: well-known install paths first, then the
/// OS `PATH`.
pub fn resolve_binary(kind: ClientKind) -> Result<PathBuf, SpawnError> {
    let candidates = kind.well_known_paths();
    for path in &candidates {
        if path.is_file() {
            return Ok(path.clone());
        }
    }
    which::which(kind.binary_name()).map_err(|_| SpawnError::BinaryNotFound {
        binary: kind.binary_name().to_string(),
        searched: candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
    })
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
