// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routing state hub.
//!
//! Single point of mutation for topic↔window bindings, chat locations, read
//! cursors, and display names. The forward map `(user, topic) → window` and
//! the eagerly maintained reverse index `(user, window) → topic` always
//! agree: every mutating operation takes the hub lock, updates both, and
//! persists `state.json` atomically before releasing.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::mux::WindowInfo;
use crate::session_map::SessionMap;

/// Everything the bridge knows about one live window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    /// Absent until the SessionStart hook writes the session map entry.
    pub session_id: Option<String>,
    pub cwd: String,
    pub window_name: String,
}

/// A delivery target for one agent session's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub user_id: u64,
    pub topic_id: i32,
    pub chat_id: i64,
    pub window_id: String,
}

/// Serialized shape of `state.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HubState {
    #[serde(default)]
    window_states: HashMap<String, WindowState>,
    /// `"<user>:<topic>" → window_id`.
    #[serde(default)]
    thread_bindings: HashMap<String, String>,
    /// `"<user>:<topic>" → chat_id`.
    #[serde(default)]
    group_chat_ids: HashMap<String, i64>,
    /// `"<user>:<window>" → last delivered byte offset`.
    #[serde(default)]
    user_window_offsets: HashMap<String, u64>,
    #[serde(default)]
    window_display_names: HashMap<String, String>,
}

struct Inner {
    state: HubState,
    /// `(user, window) → topic`, rebuilt from the forward map on load.
    reverse: HashMap<(u64, String), i32>,
}

pub struct Hub {
    path: PathBuf,
    inner: Mutex<Inner>,
}

fn topic_key(user_id: u64, topic_id: i32) -> String {
    format!("{user_id}:{topic_id}")
}

fn cursor_key(user_id: u64, window_id: &str) -> String {
    format!("{user_id}:{window_id}")
}

fn parse_topic_key(key: &str) -> Option<(u64, i32)> {
    let (user, topic) = key.split_once(':')?;
    Some((user.parse().ok()?, topic.parse().ok()?))
}

impl Hub {
    /// Load persisted state; a missing file starts empty. The reverse index
    /// is derived from the forward map, so the two cannot disagree on load.
    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        let state: HubState = crate::persist::read_json(&path)?.unwrap_or_default();
        let mut reverse = HashMap::new();
        for (key, window_id) in &state.thread_bindings {
            if let Some((user_id, topic_id)) = parse_topic_key(key) {
                reverse.insert((user_id, window_id.clone()), topic_id);
            }
        }
        Ok(Self { path, inner: Mutex::new(Inner { state, reverse }) })
    }

    /// Bind a topic to a window, capturing the chat location for later
    /// background sends. Fails if either side of the bijection is taken.
    pub fn bind(
        &self,
        user_id: u64,
        topic_id: i32,
        window: &WindowInfo,
        chat_id: i64,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let key = topic_key(user_id, topic_id);

        if let Some(existing) = inner.state.thread_bindings.get(&key) {
            if *existing != window.window_id {
                return Err(BridgeError::new(
                    crate::error::ErrorKind::Constraint,
                    format!("topic is already bound to {existing}"),
                )
                .into());
            }
        }
        let taken = inner
            .state
            .thread_bindings
            .iter()
            .any(|(k, w)| *w == window.window_id && *k != key);
        if taken {
            return Err(BridgeError::already_bound(&window.window_id).into());
        }

        inner.state.thread_bindings.insert(key.clone(), window.window_id.clone());
        inner.state.group_chat_ids.insert(key, chat_id);
        inner.reverse.insert((user_id, window.window_id.clone()), topic_id);
        inner
            .state
            .window_states
            .entry(window.window_id.clone())
            .and_modify(|s| {
                s.cwd = window.cwd.clone();
                s.window_name = window.name.clone();
            })
            .or_insert_with(|| WindowState {
                session_id: None,
                cwd: window.cwd.clone(),
                window_name: window.name.clone(),
            });
        inner
            .state
            .window_display_names
            .insert(window.window_id.clone(), window.name.clone());

        self.save(&inner)?;
        debug!(user_id, topic_id, window_id = %window.window_id, "bound topic");
        Ok(())
    }

    /// Remove a binding and its dependent entries (chat location, read
    /// cursor). Does not kill the window; the caller decides that.
    pub fn unbind(&self, user_id: u64, topic_id: i32) -> anyhow::Result<Option<String>> {
        let mut inner = self.inner.lock();
        let key = topic_key(user_id, topic_id);
        let Some(window_id) = inner.state.thread_bindings.remove(&key) else {
            return Ok(None);
        };
        inner.state.group_chat_ids.remove(&key);
        inner.state.user_window_offsets.remove(&cursor_key(user_id, &window_id));
        inner.reverse.remove(&(user_id, window_id.clone()));
        self.save(&inner)?;
        debug!(user_id, topic_id, window_id = %window_id, "unbound topic");
        Ok(Some(window_id))
    }

    /// Forget a window that no longer exists (killed or never started).
    pub fn remove_window(&self, window_id: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let changed = inner.state.window_states.remove(window_id).is_some()
            | inner.state.window_display_names.remove(window_id).is_some();
        if changed {
            self.save(&inner)?;
        }
        Ok(())
    }

    /// Record the hook-written session for a window.
    pub fn sync_window(&self, window_id: &str, session_id: &str, cwd: &str, name: &str) {
        let mut inner = self.inner.lock();
        let state = inner.state.window_states.entry(window_id.to_owned()).or_default();
        let changed = state.session_id.as_deref() != Some(session_id)
            || state.cwd != cwd
            || state.window_name != name;
        if changed {
            state.session_id = Some(session_id.to_owned());
            state.cwd = cwd.to_owned();
            state.window_name = name.to_owned();
            if let Err(e) = self.save(&inner) {
                warn!("failed to persist window sync: {e:#}");
            }
        }
    }

    pub fn resolve_topic(&self, user_id: u64, topic_id: i32) -> Option<String> {
        self.inner.lock().state.thread_bindings.get(&topic_key(user_id, topic_id)).cloned()
    }

    pub fn topic_for(&self, user_id: u64, window_id: &str) -> Option<i32> {
        self.inner.lock().reverse.get(&(user_id, window_id.to_owned())).copied()
    }

    pub fn chat_for(&self, user_id: u64, topic_id: i32) -> Option<i64> {
        self.inner.lock().state.group_chat_ids.get(&topic_key(user_id, topic_id)).copied()
    }

    pub fn window_state(&self, window_id: &str) -> Option<WindowState> {
        self.inner.lock().state.window_states.get(window_id).cloned()
    }

    /// Everyone whose bound window currently maps to this agent session,
    /// sorted for deterministic delivery order.
    pub fn find_subscribers(
        &self,
        session_map: &SessionMap,
        mux_session: &str,
        agent_session_id: &str,
    ) -> Vec<Subscriber> {
        let Some(window_id) = session_map.window_for_session(mux_session, agent_session_id)
        else {
            return Vec::new();
        };
        let inner = self.inner.lock();
        let mut subs: Vec<Subscriber> = inner
            .state
            .thread_bindings
            .iter()
            .filter(|(_, w)| w.as_str() == window_id)
            .filter_map(|(key, w)| {
                let (user_id, topic_id) = parse_topic_key(key)?;
                let chat_id = *inner.state.group_chat_ids.get(key)?;
                Some(Subscriber { user_id, topic_id, chat_id, window_id: w.clone() })
            })
            .collect();
        subs.sort_by_key(|s| (s.user_id, s.topic_id));
        subs
    }

    /// Current bindings, sorted, for the status poller.
    pub fn bound_windows(&self) -> Vec<Subscriber> {
        let inner = self.inner.lock();
        let mut subs: Vec<Subscriber> = inner
            .state
            .thread_bindings
            .iter()
            .filter_map(|(key, window_id)| {
                let (user_id, topic_id) = parse_topic_key(key)?;
                let chat_id = *inner.state.group_chat_ids.get(key)?;
                Some(Subscriber { user_id, topic_id, chat_id, window_id: window_id.clone() })
            })
            .collect();
        subs.sort_by_key(|s| (s.user_id, s.topic_id));
        subs
    }

    /// Re-resolve bindings whose window ids did not survive a tmux server
    /// restart, using the persisted display name as a secondary key.
    ///
    /// Runs once at startup. When two live windows share a display name the
    /// first in enumeration order wins; bindings that cannot be matched are
    /// dropped. Running this twice is identical to running it once.
    pub fn resolve_stale_ids(&self, live: &[WindowInfo]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let live_ids: HashSet<&str> = live.iter().map(|w| w.window_id.as_str()).collect();

        // Window ids already referenced by surviving bindings are not
        // available as rebind targets.
        let mut claimed: HashSet<String> = inner
            .state
            .thread_bindings
            .values()
            .filter(|w| live_ids.contains(w.as_str()))
            .cloned()
            .collect();

        let mut keys: Vec<String> = inner.state.thread_bindings.keys().cloned().collect();
        keys.sort();

        let mut dirty = false;
        for key in keys {
            let Some(old_id) = inner.state.thread_bindings.get(&key).cloned() else {
                continue;
            };
            if live_ids.contains(old_id.as_str()) {
                continue;
            }

            // First name match in enumeration order, even when tmux briefly
            // allows duplicates. A claimed match means another binding got
            // there first; the loser is dropped rather than given the spare.
            let display_name = inner.state.window_display_names.get(&old_id).cloned();
            let replacement = display_name
                .as_deref()
                .and_then(|name| live.iter().find(|w| w.name == name))
                .filter(|w| !claimed.contains(&w.window_id));

            let Some((user_id, topic_id)) = parse_topic_key(&key) else {
                continue;
            };

            match replacement {
                Some(window) => {
                    let new_id = window.window_id.clone();
                    debug!(%old_id, %new_id, key = %key, "re-resolved stale window id");
                    inner.state.thread_bindings.insert(key.clone(), new_id.clone());
                    inner.reverse.remove(&(user_id, old_id.clone()));
                    inner.reverse.insert((user_id, new_id.clone()), topic_id);

                    if let Some(state) = inner.state.window_states.remove(&old_id) {
                        inner.state.window_states.insert(new_id.clone(), state);
                    }
                    if let Some(name) = inner.state.window_display_names.remove(&old_id) {
                        inner.state.window_display_names.insert(new_id.clone(), name);
                    }
                    let old_cursor = cursor_key(user_id, &old_id);
                    if let Some(offset) = inner.state.user_window_offsets.remove(&old_cursor) {
                        inner
                            .state
                            .user_window_offsets
                            .insert(cursor_key(user_id, &new_id), offset);
                    }
                    claimed.insert(new_id);
                }
                None => {
                    warn!(%old_id, key = %key, "dropping binding: window gone and no name match");
                    inner.state.thread_bindings.remove(&key);
                    inner.state.group_chat_ids.remove(&key);
                    inner.reverse.remove(&(user_id, old_id.clone()));
                    inner.state.user_window_offsets.remove(&cursor_key(user_id, &old_id));
                    inner.state.window_states.remove(&old_id);
                    inner.state.window_display_names.remove(&old_id);
                }
            }
            dirty = true;
        }

        if dirty {
            self.save(&inner)?;
        }
        Ok(())
    }

    /// Advance a user's delivered-content cursor. Monotonic: attempts to
    /// move backward are no-ops.
    pub fn advance_cursor(&self, user_id: u64, window_id: &str, new_offset: u64) {
        let mut inner = self.inner.lock();
        let key = cursor_key(user_id, window_id);
        let current = inner.state.user_window_offsets.get(&key).copied().unwrap_or(0);
        if new_offset <= current {
            return;
        }
        inner.state.user_window_offsets.insert(key, new_offset);
        if let Err(e) = self.save(&inner) {
            warn!("failed to persist read cursor: {e:#}");
        }
    }

    pub fn cursor(&self, user_id: u64, window_id: &str) -> u64 {
        self.inner
            .lock()
            .state
            .user_window_offsets
            .get(&cursor_key(user_id, window_id))
            .copied()
            .unwrap_or(0)
    }

    fn save(&self, inner: &Inner) -> anyhow::Result<()> {
        crate::persist::write_json(&self.path, &inner.state)
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
