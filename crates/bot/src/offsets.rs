// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent byte offsets for tracked transcripts.
//!
//! One row per agent session the monitor is tailing. Offsets only matter for
//! restart behavior: nothing already delivered is ever replayed. Mutations
//! mark the store dirty; the monitor flushes once at the end of each tick so
//! a burst of lines costs one rewrite.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A session the monitor watches, with its tail position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSession {
    pub session_id: String,
    pub file_path: PathBuf,
    pub last_byte_offset: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OffsetFile {
    sessions: HashMap<String, TrackedSession>,
}

/// The offset store backing `monitor_state.json`.
#[derive(Debug)]
pub struct OffsetStore {
    path: PathBuf,
    sessions: HashMap<String, TrackedSession>,
    dirty: bool,
}

impl OffsetStore {
    /// Load the store; a missing file starts empty.
    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        let file: OffsetFile = crate::persist::read_json(&path)?.unwrap_or_default();
        Ok(Self { path, sessions: file.sessions, dirty: false })
    }

    pub fn get(&self, session_id: &str) -> Option<&TrackedSession> {
        self.sessions.get(session_id)
    }

    pub fn offset(&self, session_id: &str) -> Option<u64> {
        self.sessions.get(session_id).map(|s| s.last_byte_offset)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Begin tracking a session at the given offset. Replaces any existing
    /// row for the same id.
    pub fn track(&mut self, session_id: &str, file_path: PathBuf, offset: u64) {
        self.sessions.insert(
            session_id.to_owned(),
            TrackedSession {
                session_id: session_id.to_owned(),
                file_path,
                last_byte_offset: offset,
            },
        );
        self.dirty = true;
    }

    /// Drop a session's row entirely (rotation or disappearance).
    pub fn remove(&mut self, session_id: &str) -> Option<TrackedSession> {
        let removed = self.sessions.remove(session_id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Move a session's offset. Backward moves are allowed only as a reset
    /// to zero (file truncation); other regressions are ignored.
    pub fn set_offset(&mut self, session_id: &str, offset: u64) {
        if let Some(row) = self.sessions.get_mut(session_id) {
            if offset >= row.last_byte_offset || offset == 0 {
                if row.last_byte_offset != offset {
                    row.last_byte_offset = offset;
                    self.dirty = true;
                }
            }
        }
    }

    /// Persist if any mutation happened since the last flush.
    pub fn flush_if_dirty(&mut self) -> anyhow::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let file = OffsetFile { sessions: self.sessions.clone() };
        crate::persist::write_json(&self.path, &file)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
#[path = "offsets_tests.rs"]
mod tests;
