// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tmux control plane.
//!
//! One persistent tmux session hosts every agent window. The bridge shells
//! out to the `tmux` binary for all operations; nothing here keeps local
//! state, so the multiplexer stays the source of truth. Every call can block
//! on subprocess I/O and must be awaited off the hot path.

use tokio::process::Command;
use tracing::debug;

use crate::error::BridgeError;

/// Name of the placeholder window kept alive so the session never exits.
/// Excluded from all enumeration.
const HOME_WINDOW: &str = "home";

/// Field separator for tmux format strings. Tab never appears in the
/// formats we request.
const SEP: char = '\t';

/// One live tmux window, as reported by `list-windows`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    /// Opaque tmux handle, e.g. `@12`. Stable for the window's lifetime,
    /// not across tmux server restarts.
    pub window_id: String,
    pub name: String,
    pub cwd: String,
    pub pane_command: String,
}

/// Handle to the bridge's tmux session.
#[derive(Debug, Clone)]
pub struct Mux {
    session: String,
}

impl Mux {
    pub fn new(session: impl Into<String>) -> Self {
        Self { session: session.into() }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Ensure the bridge session exists, creating it (detached, with the
    /// home window) if needed. Called once at startup; failure is fatal.
    pub async fn ensure_session(&self) -> anyhow::Result<()> {
        if self.exec(&["has-session", "-t", &self.session]).await.is_ok() {
            return Ok(());
        }
        self.exec(&["new-session", "-d", "-s", &self.session, "-n", HOME_WINDOW])
            .await
            .map(|_| ())
    }

    /// Enumerate all windows in the session, excluding the home window.
    pub async fn list_windows(&self) -> anyhow::Result<Vec<WindowInfo>> {
        let format =
            "#{window_id}\t#{window_name}\t#{pane_current_path}\t#{pane_current_command}";
        let out = self.exec(&["list-windows", "-t", &self.session, "-F", format]).await?;
        Ok(out.lines().filter_map(parse_window_line).filter(|w| w.name != HOME_WINDOW).collect())
    }

    pub async fn find_by_id(&self, window_id: &str) -> anyhow::Result<Option<WindowInfo>> {
        Ok(self.list_windows().await?.into_iter().find(|w| w.window_id == window_id))
    }

    pub async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<WindowInfo>> {
        Ok(self.list_windows().await?.into_iter().find(|w| w.name == name))
    }

    /// Create a window at `cwd`, start the agent command in it, and return
    /// `(window_id, final_name)`. On a name collision the name gets a `-2`,
    /// `-3`, … suffix until unique.
    pub async fn create_window(
        &self,
        cwd: &str,
        desired_name: &str,
        start_command: &str,
    ) -> anyhow::Result<(String, String)> {
        let mut taken: Vec<String> =
            self.list_windows().await?.into_iter().map(|w| w.name).collect();
        taken.push(HOME_WINDOW.to_owned());
        let name = unique_name(&taken, desired_name);

        let out = self
            .exec(&[
                "new-window",
                "-t",
                &self.session,
                "-n",
                &name,
                "-c",
                cwd,
                "-P",
                "-F",
                "#{window_id}",
            ])
            .await?;
        let window_id = out.trim().to_owned();
        if window_id.is_empty() {
            anyhow::bail!("tmux new-window returned no window id");
        }

        self.send_keys(&window_id, start_command, true, false).await?;
        debug!(window_id, name, cwd, "created window");
        Ok((window_id, name))
    }

    /// Kill a window. Idempotent: a window that is already gone is success.
    pub async fn kill_window(&self, window_id: &str) -> anyhow::Result<()> {
        match self.exec(&["kill-window", "-t", window_id]).await {
            Ok(_) => Ok(()),
            Err(e) if is_missing_window(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Send keystrokes to a window's active pane.
    ///
    /// `literal` suppresses tmux key-name interpretation (`-l`), so the text
    /// arrives byte-for-byte. The trailing Enter is a second `send-keys`
    /// call, issued only after the content was delivered.
    pub async fn send_keys(
        &self,
        window_id: &str,
        keys: &str,
        append_enter: bool,
        literal: bool,
    ) -> anyhow::Result<()> {
        if !keys.is_empty() {
            if literal {
                self.exec(&["send-keys", "-t", window_id, "-l", "--", keys]).await?;
            } else {
                self.exec(&["send-keys", "-t", window_id, "--", keys]).await?;
            }
        }
        if append_enter {
            self.exec(&["send-keys", "-t", window_id, "Enter"]).await?;
        }
        Ok(())
    }

    /// Capture the visible pane content. `with_ansi` keeps SGR escape
    /// sequences (`-e`).
    pub async fn capture_pane(&self, window_id: &str, with_ansi: bool) -> anyhow::Result<String> {
        let mut args = vec!["capture-pane", "-p"];
        if with_ansi {
            args.push("-e");
        }
        args.extend_from_slice(&["-t", window_id]);
        self.exec(&args).await
    }

    /// Run one tmux command, returning stdout. Non-zero exit is mapped to a
    /// typed error: a missing window/pane becomes `NotFound` (the routing
    /// fabric treats it as an external kill), everything else `TransientIo`.
    async fn exec(&self, args: &[&str]) -> anyhow::Result<String> {
        let output = Command::new("tmux").args(args).output().await?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        if stderr_is_missing_window(&stderr) {
            let target = args
                .iter()
                .position(|a| *a == "-t")
                .and_then(|i| args.get(i + 1))
                .copied()
                .unwrap_or("?");
            return Err(BridgeError::window_not_found(target).into());
        }
        Err(BridgeError::new(
            crate::error::ErrorKind::TransientIo,
            format!("tmux {} failed: {stderr}", args.first().unwrap_or(&"")),
        )
        .into())
    }
}

/// Parse one `list-windows` output line in the bridge's format.
fn parse_window_line(line: &str) -> Option<WindowInfo> {
    let mut fields = line.split(SEP);
    let window_id = fields.next()?.to_owned();
    let name = fields.next()?.to_owned();
    let cwd = fields.next()?.to_owned();
    let pane_command = fields.next().unwrap_or("").to_owned();
    if !window_id.starts_with('@') {
        return None;
    }
    Some(WindowInfo { window_id, name, cwd, pane_command })
}

/// Resolve a desired window name against the taken set by appending `-2`,
/// `-3`, … until unique.
fn unique_name(taken: &[String], desired: &str) -> String {
    if !taken.iter().any(|t| t == desired) {
        return desired.to_owned();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{desired}-{n}");
        if !taken.iter().any(|t| *t == candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn stderr_is_missing_window(stderr: &str) -> bool {
    stderr.contains("can't find window") || stderr.contains("can't find pane")
}

fn is_missing_window(err: &anyhow::Error) -> bool {
    crate::error::classify(err) == crate::error::ErrorKind::NotFound
}

#[cfg(test)]
#[path = "mux_tests.rs"]
mod tests;
