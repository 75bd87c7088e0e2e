// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound topic message routing.
//!
//! Every message a user types in a topic lands here. Bound topics forward to
//! the window as keystrokes (with slash-command translation and `!` shell
//! capture on the way); the first message in an unbound topic starts the
//! window selection flow and is held until binding succeeds, then forwarded
//! as the agent's first input.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::chat::ChatTransport;
use crate::error::ErrorKind;
use crate::event::{ContentType, MessageTask};
use crate::hub::Hub;
use crate::mux::{Mux, WindowInfo};
use crate::queue::UserQueues;
use crate::skills::Skills;

/// Wall-clock budget for one `!` shell command.
const SHELL_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-stream output cap for `!` shell commands.
const SHELL_MAX_BYTES: usize = 64 * 1024;

/// Chunk size for relayed shell output, below the merge ceiling.
const SHELL_CHUNK_CHARS: usize = 3500;

/// Pane lines relayed by `/history`.
const HISTORY_LINES: usize = 40;

/// Commands the bridge executes itself instead of forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCommand {
    Start,
    History,
    Resume(Option<String>),
    Screenshot,
    Esc,
}

/// What to do with a `/command` message in a bound topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    Native(NativeCommand),
    /// Keystrokes to forward verbatim (possibly alias-rewritten).
    Forward(String),
}

/// Split `/name args` and decide who handles it. Skill aliases are
/// rewritten to their native slash commands; unknown names forward as-is.
pub fn classify_command(skills: &Skills, text: &str) -> CommandAction {
    let body = text.trim_start_matches('/');
    let (raw_name, args) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    // Telegram appends @botname to commands in groups.
    let name = raw_name.split('@').next().unwrap_or(raw_name);

    if let Some(entry) = skills.translate(name) {
        return CommandAction::Forward(join_command(&entry.command, args));
    }

    match name {
        "start" => CommandAction::Native(NativeCommand::Start),
        "history" => CommandAction::Native(NativeCommand::History),
        "screenshot" => CommandAction::Native(NativeCommand::Screenshot),
        "esc" => CommandAction::Native(NativeCommand::Esc),
        "resume" => CommandAction::Native(NativeCommand::Resume(
            (!args.is_empty()).then(|| args.to_owned()),
        )),
        _ => CommandAction::Forward(join_command(&format!("/{name}"), args)),
    }
}

fn join_command(command: &str, args: &str) -> String {
    if args.is_empty() {
        command.to_owned()
    } else {
        format!("{command} {args}")
    }
}

/// A first message waiting for its topic to be bound.
#[derive(Debug, Clone)]
struct PendingTopic {
    held_text: String,
    options: Vec<WindowInfo>,
}

pub struct CommandRouter {
    hub: Arc<Hub>,
    mux: Mux,
    queues: Arc<UserQueues>,
    transport: Arc<dyn ChatTransport>,
    skills: Skills,
    agent_command: String,
    pending_first: Mutex<HashMap<(u64, i32), PendingTopic>>,
}

impl CommandRouter {
    pub fn new(
        hub: Arc<Hub>,
        mux: Mux,
        queues: Arc<UserQueues>,
        transport: Arc<dyn ChatTransport>,
        skills: Skills,
        agent_command: String,
    ) -> Self {
        Self {
            hub,
            mux,
            queues,
            transport,
            skills,
            agent_command,
            pending_first: Mutex::new(HashMap::new()),
        }
    }

    /// Entry point for every allowed inbound topic message.
    pub async fn handle_message(
        &self,
        user_id: u64,
        chat_id: i64,
        topic_id: i32,
        text: &str,
    ) {
        let result = match self.hub.resolve_topic(user_id, topic_id) {
            Some(window_id) => {
                self.handle_bound(user_id, chat_id, topic_id, &window_id, text).await
            }
            None => self.handle_unbound(user_id, chat_id, topic_id, text).await,
        };

        if let Err(e) = result {
            match crate::error::classify(&e) {
                ErrorKind::NotFound => {
                    self.window_gone(user_id, chat_id, topic_id).await;
                }
                _ => {
                    warn!(user_id, topic_id, "command failed: {e:#}");
                    self.reply(chat_id, topic_id, format!("⚠️ {e:#}")).await;
                }
            }
        }
    }

    /// The topic's window was killed externally: unbind, flush, tell the
    /// user once.
    pub async fn window_gone(&self, user_id: u64, chat_id: i64, topic_id: i32) {
        if let Ok(Some(window_id)) = self.hub.unbind(user_id, topic_id) {
            let _ = self.hub.remove_window(&window_id);
            self.queues.purge_window(user_id, &window_id, chat_id, topic_id);
            self.reply(chat_id, topic_id, "⚠️ The window is gone; this topic is now unbound.")
                .await;
        }
    }

    /// Topic closed or deleted: kill the window and clean up everything.
    pub async fn topic_closed(&self, user_id: u64, topic_id: i32) {
        let chat_id = self.hub.chat_for(user_id, topic_id).unwrap_or(0);
        let Ok(Some(window_id)) = self.hub.unbind(user_id, topic_id) else {
            return;
        };
        debug!(user_id, topic_id, window_id, "topic closed, killing window");
        if let Err(e) = self.mux.kill_window(&window_id).await {
            warn!("kill on topic close failed: {e:#}");
        }
        let _ = self.hub.remove_window(&window_id);
        self.queues.purge_window(user_id, &window_id, chat_id, topic_id);
    }

    async fn handle_bound(
        &self,
        user_id: u64,
        chat_id: i64,
        topic_id: i32,
        window_id: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        if let Some(shell) = text.strip_prefix('!') {
            return self.run_shell(user_id, chat_id, topic_id, window_id, shell).await;
        }
        if text.starts_with('/') {
            return self
                .run_command(user_id, chat_id, topic_id, window_id, text)
                .await;
        }
        self.mux.send_keys(window_id, text, true, true).await
    }

    async fn run_command(
        &self,
        user_id: u64,
        chat_id: i64,
        topic_id: i32,
        window_id: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        match classify_command(&self.skills, text) {
            CommandAction::Forward(keys) => self.mux.send_keys(window_id, &keys, true, true).await,
            CommandAction::Native(NativeCommand::Esc) => {
                self.mux.send_keys(window_id, "Escape", false, false).await
            }
            CommandAction::Native(NativeCommand::Start) => {
                self.mux.send_keys(window_id, &self.agent_command, true, true).await
            }
            CommandAction::Native(NativeCommand::History) => {
                let pane = self.mux.capture_pane(window_id, false).await?;
                let tail: Vec<&str> = pane
                    .lines()
                    .rev()
                    .take(HISTORY_LINES)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                self.enqueue_block(user_id, chat_id, topic_id, window_id, &tail.join("\n"));
                Ok(())
            }
            CommandAction::Native(NativeCommand::Screenshot) => {
                // The image renderer is a separate subsystem; the bridge's
                // own behavior is the monospace capture.
                let pane = self.mux.capture_pane(window_id, false).await?;
                self.enqueue_block(user_id, chat_id, topic_id, window_id, pane.trim_end());
                Ok(())
            }
            CommandAction::Native(NativeCommand::Resume(arg)) => match arg {
                Some(session_id) => {
                    let keys = format!("{} --resume {session_id}", self.agent_command);
                    self.mux.send_keys(window_id, &keys, true, true).await
                }
                None => {
                    let listing = self.list_resumable(window_id)?;
                    self.reply(chat_id, topic_id, listing).await;
                    Ok(())
                }
            },
        }
    }

    fn list_resumable(&self, window_id: &str) -> anyhow::Result<String> {
        let Some(state) = self.hub.window_state(window_id) else {
            return Ok("No recorded working directory for this window.".to_owned());
        };
        let dir =
            crate::monitor::project_dir(&crate::monitor::default_projects_root(), &state.cwd);

        let mut sessions: Vec<(std::time::SystemTime, String)> = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::UNIX_EPOCH);
                sessions.push((modified, stem.to_owned()));
            }
        }
        if sessions.is_empty() {
            return Ok("No previous sessions found for this directory.".to_owned());
        }
        sessions.sort_by(|a, b| b.0.cmp(&a.0));
        let mut lines = vec!["Recent sessions (reply /resume <id>):".to_owned()];
        for (_, id) in sessions.into_iter().take(5) {
            lines.push(format!("• `{id}`"));
        }
        Ok(lines.join("\n"))
    }

    /// Execute `!command` in the window's recorded cwd with a restricted
    /// environment, relaying capped stdout/stderr through the pipeline.
    async fn run_shell(
        &self,
        user_id: u64,
        chat_id: i64,
        topic_id: i32,
        window_id: &str,
        command: &str,
    ) -> anyhow::Result<()> {
        let cwd = self
            .hub
            .window_state(window_id)
            .map(|s| s.cwd)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow::anyhow!("no recorded cwd for {window_id}"))?;

        let mut child = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .env_clear()
            .envs(restricted_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let capture = async {
            // Both pipes are drained concurrently so a chatty stderr cannot
            // deadlock a full stdout pipe. Past the cap the adapter is
            // dropped, closing the pipe under the child.
            let out_fut = async {
                let mut buf = Vec::new();
                if let Some(pipe) = stdout {
                    let _ = pipe.take(SHELL_MAX_BYTES as u64).read_to_end(&mut buf).await;
                }
                buf
            };
            let err_fut = async {
                let mut buf = Vec::new();
                if let Some(pipe) = stderr {
                    let _ = pipe.take(SHELL_MAX_BYTES as u64).read_to_end(&mut buf).await;
                }
                buf
            };
            let (out, err) = tokio::join!(out_fut, err_fut);
            let status = child.wait().await;
            (out, err, status)
        };

        let (out, err, status) = match tokio::time::timeout(SHELL_TIMEOUT, capture).await {
            Ok(result) => result,
            Err(_) => {
                self.reply(chat_id, topic_id, "⚠️ shell command timed out").await;
                return Ok(());
            }
        };

        let mut text = String::from_utf8_lossy(&out).into_owned();
        let err_text = String::from_utf8_lossy(&err);
        if !err_text.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(err_text.trim_end());
        }
        if text.trim().is_empty() {
            text = "(no output)".to_owned();
        }
        if let Ok(status) = status {
            if !status.success() {
                text.push_str(&format!("\n(exit {})", status.code().unwrap_or(-1)));
            }
        }

        for chunk in chunk_output(&text, SHELL_CHUNK_CHARS) {
            self.enqueue_block(user_id, chat_id, topic_id, window_id, &chunk);
        }
        Ok(())
    }

    /// First message in an unbound topic: either a selection reply or the
    /// start of the picker flow.
    async fn handle_unbound(
        &self,
        user_id: u64,
        chat_id: i64,
        topic_id: i32,
        text: &str,
    ) -> anyhow::Result<()> {
        let pending = self.pending_first.lock().get(&(user_id, topic_id)).cloned();

        if let Some(pending_topic) = pending {
            // Numbered reply picks from the offered windows.
            if let Ok(n) = text.trim().parse::<usize>() {
                if let Some(window) = pending_topic.options.get(n.saturating_sub(1)) {
                    return self
                        .finish_binding(user_id, chat_id, topic_id, window.clone(), &pending_topic)
                        .await;
                }
                self.reply(chat_id, topic_id, "No such entry; pick a number from the list.")
                    .await;
                return Ok(());
            }
            if let Some(rest) = text.strip_prefix("/new ") {
                let mut parts = rest.trim().splitn(2, char::is_whitespace);
                let path = parts.next().unwrap_or("").to_owned();
                if !path.starts_with('/') {
                    self.reply(chat_id, topic_id, "Give an absolute path: /new /path [name]")
                        .await;
                    return Ok(());
                }
                let desired = parts
                    .next()
                    .map(str::to_owned)
                    .or_else(|| {
                        std::path::Path::new(&path)
                            .file_name()
                            .and_then(|n| n.to_str())
                            .map(str::to_owned)
                    })
                    .unwrap_or_else(|| "agent".to_owned());
                let (window_id, name) =
                    self.mux.create_window(&path, &desired, &self.agent_command).await?;
                let window = WindowInfo {
                    window_id,
                    name,
                    cwd: path,
                    pane_command: self.agent_command.clone(),
                };
                return self
                    .finish_binding(user_id, chat_id, topic_id, window, &pending_topic)
                    .await;
            }
            // Anything else restarts the flow with the new text held.
        }

        let bound: std::collections::HashSet<String> =
            self.hub.bound_windows().into_iter().map(|s| s.window_id).collect();
        let unbound: Vec<WindowInfo> = self
            .mux
            .list_windows()
            .await?
            .into_iter()
            .filter(|w| !bound.contains(&w.window_id))
            .collect();

        let prompt = if unbound.is_empty() {
            "No free windows. Reply `/new /absolute/path [name]` to start one.".to_owned()
        } else {
            let mut lines = vec!["Pick a window by number, or `/new /path [name]`:".to_owned()];
            for (i, w) in unbound.iter().enumerate() {
                lines.push(format!("{}. {} — {}", i + 1, w.name, w.cwd));
            }
            lines.join("\n")
        };

        self.pending_first
            .lock()
            .insert((user_id, topic_id), PendingTopic { held_text: text.to_owned(), options: unbound });
        self.reply(chat_id, topic_id, prompt).await;
        Ok(())
    }

    async fn finish_binding(
        &self,
        user_id: u64,
        chat_id: i64,
        topic_id: i32,
        window: WindowInfo,
        pending: &PendingTopic,
    ) -> anyhow::Result<()> {
        self.hub.bind(user_id, topic_id, &window, chat_id)?;
        self.pending_first.lock().remove(&(user_id, topic_id));

        if !pending.held_text.is_empty() {
            self.mux.send_keys(&window.window_id, &pending.held_text, true, true).await?;
        }
        self.reply(chat_id, topic_id, format!("Bound to *{}* ({}).", window.name, window.cwd))
            .await;
        Ok(())
    }

    fn enqueue_block(
        &self,
        user_id: u64,
        chat_id: i64,
        topic_id: i32,
        window_id: &str,
        text: &str,
    ) {
        let task = MessageTask::content(
            window_id,
            chat_id,
            topic_id,
            ContentType::Text,
            format!("```\n{text}\n```"),
        );
        self.queues.enqueue_content(user_id, task);
    }

    async fn reply(&self, chat_id: i64, topic_id: i32, text: impl Into<String>) {
        if let Err(e) = self.transport.send(chat_id, topic_id, text.into()).await {
            warn!("reply failed: {e:#}");
        }
    }
}

/// Minimal environment for `!` shell commands: enough to run common tools,
/// nothing inherited from the bridge process beyond these.
fn restricted_env() -> Vec<(String, String)> {
    ["PATH", "HOME", "LANG", "TERM", "USER"]
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|v| ((*key).to_owned(), v)))
        .collect()
}

/// Split relayed output into chunks the merge layer will accept.
fn chunk_output(text: &str, chunk_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        // A single oversized line is split hard.
        let mut line = line;
        while line.chars().count() > chunk_chars {
            let split_at = line.char_indices().nth(chunk_chars).map(|(i, _)| i).unwrap_or(line.len());
            let (head, rest) = line.split_at(split_at);
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(head.to_owned());
            line = rest;
        }
        if current.chars().count() + line.chars().count() + 1 > chunk_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
