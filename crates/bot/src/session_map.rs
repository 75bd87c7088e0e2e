// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The hook-written session map.
//!
//! `session_map.json` links tmux windows to agent sessions. The SessionStart
//! hook (`ccbot hook`) is its only writer; the bridge side is read-only and
//! re-reads the file on every monitor tick.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One window's agent binding, keyed by `"<tmux_session>:<window_id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMapEntry {
    pub session_id: String,
    pub cwd: String,
    pub window_name: String,
}

/// In-memory view of the session map file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMap {
    entries: HashMap<String, SessionMapEntry>,
}

impl SessionMap {
    /// Load the map. A missing file is an empty map; malformed JSON is an
    /// error (the caller's tick aborts and retries next time).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let entries = crate::persist::read_json(path)?.unwrap_or_default();
        Ok(Self { entries })
    }

    pub fn from_entries(entries: HashMap<String, SessionMapEntry>) -> Self {
        Self { entries }
    }

    pub fn key(tmux_session: &str, window_id: &str) -> String {
        format!("{tmux_session}:{window_id}")
    }

    pub fn get(&self, tmux_session: &str, window_id: &str) -> Option<&SessionMapEntry> {
        self.entries.get(&Self::key(tmux_session, window_id))
    }

    /// Iterate `(window_id, entry)` pairs belonging to one tmux session.
    pub fn windows_of<'a>(
        &'a self,
        tmux_session: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a SessionMapEntry)> + 'a {
        let prefix = format!("{tmux_session}:");
        self.entries.iter().filter_map(move |(key, entry)| {
            key.strip_prefix(prefix.as_str()).map(|window_id| (window_id, entry))
        })
    }

    /// Find the window currently mapped to an agent session, if any.
    pub fn window_for_session<'a>(
        &'a self,
        tmux_session: &'a str,
        agent_session_id: &str,
    ) -> Option<&'a str> {
        self.windows_of(tmux_session)
            .find(|(_, entry)| entry.session_id == agent_session_id)
            .map(|(window_id, _)| window_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rewrite one entry in the map file atomically. Used by the hook CLI;
/// the long-running bridge never calls this.
pub fn upsert_entry(
    path: &Path,
    tmux_session: &str,
    window_id: &str,
    entry: SessionMapEntry,
) -> anyhow::Result<()> {
    let mut entries: HashMap<String, SessionMapEntry> =
        crate::persist::read_json(path)?.unwrap_or_default();
    entries.insert(SessionMap::key(tmux_session, window_id), entry);
    crate::persist::write_json(path, &entries)
}

#[cfg(test)]
#[path = "session_map_tests.rs"]
mod tests;
