// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transcript monitor.
//!
//! One cooperative loop reconciles the hook-written session map against the
//! tracked set, then tails each tracked transcript from its persisted byte
//! offset. Offsets advance only past fully decoded lines, so a partially
//! flushed trailing line is picked up whole on a later tick. Nothing is ever
//! replayed: restarts resume from the persisted offset, entries that existed
//! before the bridge started are skipped, and a rotated session (`/clear`)
//! starts at its transcript's end.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::NewMessage;
use crate::offsets::OffsetStore;
use crate::session_map::SessionMap;

/// Monitor wiring that does not change at runtime.
pub struct MonitorConfig {
    pub session_map_path: PathBuf,
    pub tmux_session: String,
    pub poll_interval: Duration,
    /// Root of the agent's per-project transcript directories, normally
    /// `~/.claude/projects`.
    pub projects_root: PathBuf,
}

pub struct TranscriptMonitor {
    cfg: MonitorConfig,
    store: Arc<Mutex<OffsetStore>>,
    tx: mpsc::UnboundedSender<NewMessage>,
    /// Last observed mtime per session, for cheap skip of unchanged files.
    mtimes: HashMap<String, SystemTime>,
    /// `window_id → session_id` as of the previous reconcile, for rotation
    /// detection.
    window_sessions: HashMap<String, String>,
    first_tick_done: bool,
}

impl TranscriptMonitor {
    pub fn new(
        cfg: MonitorConfig,
        store: Arc<Mutex<OffsetStore>>,
        tx: mpsc::UnboundedSender<NewMessage>,
    ) -> Self {
        Self {
            cfg,
            store,
            tx,
            mtimes: HashMap::new(),
            window_sessions: HashMap::new(),
            first_tick_done: false,
        }
    }

    /// Run until cancelled, ticking at the configured interval.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.cfg.poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.tick();
        }
        if let Err(e) = self.store.lock().flush_if_dirty() {
            warn!("final offset flush failed: {e:#}");
        }
    }

    /// One full poll cycle: reconcile, tail, emit, flush.
    pub fn tick(&mut self) {
        let map = match SessionMap::load(&self.cfg.session_map_path) {
            Ok(map) => map,
            Err(e) => {
                warn!("session map unreadable, skipping tick: {e:#}");
                return;
            }
        };

        self.reconcile(&map);
        self.first_tick_done = true;

        let session_ids = self.store.lock().session_ids();
        for session_id in session_ids {
            if let Err(e) = self.poll_session(&session_id) {
                // One session's I/O trouble must not starve the others.
                debug!(session_id, "poll failed, will retry: {e:#}");
            }
        }

        if let Err(e) = self.store.lock().flush_if_dirty() {
            warn!("offset flush failed: {e:#}");
        }
    }

    /// Diff the session map against the tracked set.
    fn reconcile(&mut self, map: &SessionMap) {
        let mut store = self.store.lock();
        let mut live_sessions: Vec<String> = Vec::new();
        let mut next_window_sessions = HashMap::new();

        for (window_id, entry) in map.windows_of(&self.cfg.tmux_session) {
            next_window_sessions.insert(window_id.to_owned(), entry.session_id.clone());
            live_sessions.push(entry.session_id.clone());

            let rotated = self
                .window_sessions
                .get(window_id)
                .is_some_and(|prev| *prev != entry.session_id);
            if rotated {
                if let Some(prev) = self.window_sessions.get(window_id) {
                    debug!(window_id, old = %prev, new = %entry.session_id, "session rotated");
                    store.remove(prev);
                    self.mtimes.remove(prev);
                }
            }

            if store.contains(&entry.session_id) {
                continue;
            }

            let path = transcript_path(&self.cfg.projects_root, &entry.cwd, &entry.session_id);
            let Ok(meta) = std::fs::metadata(&path) else {
                // No transcript yet; try again next tick.
                continue;
            };

            // Rotated sessions and anything present before startup begin at
            // end-of-file; only a session that appears while the bridge is
            // running is delivered from the top.
            let offset =
                if self.first_tick_done && !rotated { 0 } else { meta.len() };
            debug!(session_id = %entry.session_id, offset, "tracking session");
            store.track(&entry.session_id, path, offset);
        }

        for session_id in store.session_ids() {
            if !live_sessions.contains(&session_id) {
                debug!(session_id, "session left the map, dropping");
                store.remove(&session_id);
                self.mtimes.remove(&session_id);
            }
        }

        self.window_sessions = next_window_sessions;
    }

    /// Tail one transcript from its stored offset, emitting per decoded line.
    fn poll_session(&mut self, session_id: &str) -> anyhow::Result<()> {
        let (path, mut offset) = {
            let store = self.store.lock();
            let Some(row) = store.get(session_id) else {
                return Ok(());
            };
            (row.file_path.clone(), row.last_byte_offset)
        };

        let meta = std::fs::metadata(&path)?;
        let mtime = meta.modified()?;

        // Unchanged since the last look and fully consumed: skip the read.
        if self.mtimes.get(session_id) == Some(&mtime) && meta.len() == offset {
            return Ok(());
        }

        if offset > meta.len() {
            debug!(session_id, offset, len = meta.len(), "transcript truncated, resetting");
            offset = 0;
            // Record the reset now; the post-read advance is relative to it.
            self.store.lock().set_offset(session_id, 0);
        }

        let mut file = std::fs::File::open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        // Only complete lines are consumed; a trailing fragment stays for
        // the next tick.
        let consumed = match buf.iter().rposition(|b| *b == b'\n') {
            Some(last_newline) => last_newline + 1,
            None => {
                self.mtimes.insert(session_id.to_owned(), mtime);
                self.store.lock().set_offset(session_id, offset);
                return Ok(());
            }
        };

        let text = String::from_utf8_lossy(&buf[..consumed]);
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match crate::parse::parse_line(line) {
                Ok(entries) => {
                    for entry in entries {
                        let _ = self.tx.send(NewMessage {
                            agent_session_id: session_id.to_owned(),
                            content_type: entry.content_type,
                            text: entry.text,
                            role: entry.role,
                            is_complete: true,
                            tool_use_id: entry.tool_use_id,
                            tool_name: entry.tool_name,
                        });
                    }
                }
                Err(e) => {
                    // Corrupt lines are never retried; the offset advances
                    // past them regardless.
                    warn!(session_id, "skipping malformed transcript line: {e:#}");
                }
            }
        }

        self.mtimes.insert(session_id.to_owned(), mtime);
        self.store.lock().set_offset(session_id, offset + consumed as u64);
        Ok(())
    }
}

/// The agent's transcript directory root, `~/.claude/projects`.
pub fn default_projects_root() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_owned());
    Path::new(&home).join(".claude").join("projects")
}

/// The per-project transcript directory for a working directory: the CLI
/// munges the absolute cwd by turning every non-alphanumeric character
/// into `-`.
pub fn project_dir(root: &Path, cwd: &str) -> PathBuf {
    let munged: String =
        cwd.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '-' }).collect();
    root.join(munged)
}

/// Resolve one session's transcript path.
pub fn transcript_path(root: &Path, cwd: &str, session_id: &str) -> PathBuf {
    project_dir(root, cwd).join(format!("{session_id}.jsonl"))
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
