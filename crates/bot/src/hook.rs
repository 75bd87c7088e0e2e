// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SessionStart hook plumbing.
//!
//! `ccbot hook` runs inside the agent's tmux window whenever a session
//! starts (or rotates after `/clear`). It reads the hook payload from stdin,
//! asks tmux which window it is sitting in, and rewrites that window's
//! session-map entry. The long-running bridge never writes the session map;
//! this one-shot process is its single writer.
//!
//! `ccbot hook --install` merges the hook declaration into the agent's
//! settings file, idempotently.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::session_map::{upsert_entry, SessionMapEntry};

/// The SessionStart payload the agent pipes to hooks.
#[derive(Debug, Clone, Deserialize)]
pub struct HookPayload {
    pub session_id: String,
    pub cwd: String,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub hook_event_name: Option<String>,
}

/// Consume one payload from stdin and write the session-map entry.
/// Exits quietly when the surrounding window is not in the bridge session.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let mut input = String::new();
    std::io::Read::read_to_string(&mut std::io::stdin(), &mut input)?;
    let payload: HookPayload = serde_json::from_str(&input)?;

    let Ok(pane) = std::env::var("TMUX_PANE") else {
        debug!("not inside tmux, nothing to record");
        return Ok(());
    };
    let Some((session_name, window_id, window_name)) = locate_window(&pane).await? else {
        return Ok(());
    };
    if session_name != config.tmux_session {
        debug!(session_name, "window belongs to another tmux session, skipping");
        return Ok(());
    }

    apply_payload(&config.session_map_path(), &config.tmux_session, &window_id, &window_name, &payload)
}

/// Ask tmux which window the given pane lives in.
async fn locate_window(pane: &str) -> anyhow::Result<Option<(String, String, String)>> {
    let output = tokio::process::Command::new("tmux")
        .args([
            "display-message",
            "-p",
            "-t",
            pane,
            "#{session_name}\t#{window_id}\t#{window_name}",
        ])
        .output()
        .await?;
    if !output.status.success() {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&output.stdout);
    let mut fields = line.trim_end().split('\t');
    let (Some(session), Some(window_id), Some(window_name)) =
        (fields.next(), fields.next(), fields.next())
    else {
        return Ok(None);
    };
    Ok(Some((session.to_owned(), window_id.to_owned(), window_name.to_owned())))
}

/// Validate and persist one hook payload for a resolved window.
pub fn apply_payload(
    map_path: &Path,
    tmux_session: &str,
    window_id: &str,
    window_name: &str,
    payload: &HookPayload,
) -> anyhow::Result<()> {
    // Session ids are UUIDs; anything else is a malformed payload.
    uuid::Uuid::parse_str(&payload.session_id)
        .map_err(|_| anyhow::anyhow!("invalid session id: {}", payload.session_id))?;
    if !payload.cwd.starts_with('/') {
        anyhow::bail!("hook payload cwd is not absolute: {}", payload.cwd);
    }

    upsert_entry(
        map_path,
        tmux_session,
        window_id,
        SessionMapEntry {
            session_id: payload.session_id.clone(),
            cwd: payload.cwd.clone(),
            window_name: window_name.to_owned(),
        },
    )
}

/// The hook command written into the agent's settings.
const HOOK_COMMAND: &str = "ccbot hook";

/// Merge the SessionStart hook declaration into the agent settings file.
/// Returns `true` when the file changed.
pub fn install(settings_path: &Path) -> anyhow::Result<bool> {
    let existing: Value =
        crate::persist::read_json(settings_path)?.unwrap_or_else(|| json!({}));
    let (merged, changed) = merge_hook_settings(existing);
    if changed {
        crate::persist::write_json(settings_path, &merged)?;
    }
    Ok(changed)
}

/// Default location of the agent settings file.
pub fn default_settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_owned());
    Path::new(&home).join(".claude").join("settings.json")
}

/// Pure merge: append our hook to `hooks.SessionStart` unless any declared
/// command already invokes it.
pub fn merge_hook_settings(mut settings: Value) -> (Value, bool) {
    if !settings.is_object() {
        settings = json!({});
    }

    let already_installed = settings
        .get("hooks")
        .and_then(|h| h.get("SessionStart"))
        .map(|s| s.to_string().contains(HOOK_COMMAND))
        .unwrap_or(false);
    if already_installed {
        return (settings, false);
    }

    let declaration = json!({
        "matcher": "",
        "hooks": [{ "type": "command", "command": HOOK_COMMAND }]
    });

    let root = match settings.as_object_mut() {
        Some(obj) => obj,
        None => return (json!({}), false),
    };
    let hooks = root
        .entry("hooks")
        .or_insert_with(|| json!({}));
    if !hooks.is_object() {
        *hooks = json!({});
    }
    if let Some(hooks_obj) = hooks.as_object_mut() {
        let session_start = hooks_obj
            .entry("SessionStart")
            .or_insert_with(|| json!([]));
        if !session_start.is_array() {
            *session_start = json!([]);
        }
        if let Some(arr) = session_start.as_array_mut() {
            arr.push(declaration);
        }
    }
    (settings, true)
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
