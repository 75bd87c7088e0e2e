// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user outbound delivery.
//!
//! One FIFO queue and one worker task per user, spawned on first enqueue and
//! torn down only at shutdown. The worker owns all pacing decisions: merging
//! adjacent small messages, collapsing a live status message into the next
//! content send, editing tool-call messages in place when their results
//! arrive, and keeping at least [`DeliveryConfig::min_gap`] between any two
//! platform operations for the same user. A stall or failure in one user's
//! worker never touches another user.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chat::ChatTransport;
use crate::event::{ContentType, MessageTask, TaskKind};

/// Pacing and bounding knobs for the delivery pipeline.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Minimum wall-clock gap between two outbound operations per user.
    pub min_gap: Duration,
    /// Merged payload ceiling, below the platform's 4096 limit with headroom.
    pub merge_limit: usize,
    /// Content tasks allowed in a queue before compaction kicks in.
    pub queue_cap: usize,
    /// Newest content tasks kept by compaction (plus the oldest one).
    pub keep_tail: usize,
    /// Per-user drain budget at shutdown.
    pub drain_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            min_gap: Duration::from_millis(1100),
            merge_limit: 3800,
            queue_cap: 5,
            keep_tail: 3,
            drain_timeout: Duration::from_secs(2),
        }
    }
}

/// How long an unanswered tool call keeps its edit target alive.
const PENDING_TOOL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A delivered tool-call message awaiting its result.
#[derive(Debug, Clone)]
pub struct PendingTool {
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
    inserted: Instant,
}

/// Map of `tool_use_id → delivered message`, shared between workers.
///
/// Unbounded in principle; entries older than the TTL are evicted on each
/// insert so a long-running session cannot leak the map.
#[derive(Default)]
pub struct PendingTools {
    inner: Mutex<HashMap<String, PendingTool>>,
}

impl PendingTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tool_use_id: &str, chat_id: i64, message_id: i32, text: String) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.retain(|_, p| now.duration_since(p.inserted) < PENDING_TOOL_TTL);
        inner.insert(
            tool_use_id.to_owned(),
            PendingTool { chat_id, message_id, text, inserted: now },
        );
    }

    pub fn take(&self, tool_use_id: &str) -> Option<PendingTool> {
        self.inner.lock().remove(tool_use_id)
    }

    pub fn contains(&self, tool_use_id: &str) -> bool {
        self.inner.lock().contains_key(tool_use_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

struct QueueState {
    tasks: Mutex<VecDeque<MessageTask>>,
    wake: Notify,
}

struct UserHandle {
    state: Arc<QueueState>,
    worker: JoinHandle<()>,
}

/// The per-user delivery pipeline.
pub struct UserQueues {
    transport: Arc<dyn ChatTransport>,
    pending: Arc<PendingTools>,
    cfg: DeliveryConfig,
    users: Mutex<HashMap<u64, UserHandle>>,
    shutdown: CancellationToken,
}

impl UserQueues {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        pending: Arc<PendingTools>,
        cfg: DeliveryConfig,
    ) -> Self {
        Self {
            transport,
            pending,
            cfg,
            users: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Append a content task, compacting the queue when it overflows.
    pub fn enqueue_content(&self, user_id: u64, task: MessageTask) {
        let state = self.ensure_worker(user_id);
        {
            let mut tasks = state.tasks.lock();
            tasks.push_back(task);
            compact(&mut tasks, self.cfg.queue_cap, self.cfg.keep_tail);
        }
        state.wake.notify_one();
    }

    /// Append a status update, first dropping any queued-but-unsent status
    /// for the same window: only the newest phrase matters.
    pub fn enqueue_status_update(&self, user_id: u64, task: MessageTask) {
        let state = self.ensure_worker(user_id);
        {
            let mut tasks = state.tasks.lock();
            tasks.retain(|t| {
                !(t.kind == TaskKind::StatusUpdate && t.window_id == task.window_id)
            });
            tasks.push_back(task);
        }
        state.wake.notify_one();
    }

    /// Ask the worker to delete the displayed status message, if any.
    pub fn enqueue_status_clear(&self, user_id: u64, task: MessageTask) {
        let state = self.ensure_worker(user_id);
        state.tasks.lock().push_back(task);
        state.wake.notify_one();
    }

    /// Drop everything queued for a window (topic closed) and schedule a
    /// status clear so the displayed status message goes away too.
    pub fn purge_window(&self, user_id: u64, window_id: &str, chat_id: i64, topic_id: i32) {
        let state = self.ensure_worker(user_id);
        {
            let mut tasks = state.tasks.lock();
            tasks.retain(|t| t.window_id != window_id);
            tasks.push_back(MessageTask::status_clear(window_id, chat_id, topic_id));
        }
        state.wake.notify_one();
    }

    /// Cancel all workers and wait for each to drain within its budget.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<(u64, UserHandle)> = self.users.lock().drain().collect();
        for (user_id, handle) in handles {
            let budget = self.cfg.drain_timeout + Duration::from_secs(1);
            if tokio::time::timeout(budget, handle.worker).await.is_err() {
                warn!(user_id, "delivery worker did not drain in time, dropping");
            }
        }
    }

    fn ensure_worker(&self, user_id: u64) -> Arc<QueueState> {
        let mut users = self.users.lock();
        if let Some(handle) = users.get(&user_id) {
            return Arc::clone(&handle.state);
        }

        let state = Arc::new(QueueState {
            tasks: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
        });
        let worker = tokio::spawn(worker_loop(
            user_id,
            Arc::clone(&state),
            Arc::clone(&self.transport),
            Arc::clone(&self.pending),
            self.cfg.clone(),
            self.shutdown.clone(),
        ));
        users.insert(user_id, UserHandle { state: Arc::clone(&state), worker });
        debug!(user_id, "spawned delivery worker");
        state
    }
}

/// Keep the oldest content task for context and the newest `keep_tail`,
/// replacing the discarded middle with one synthetic notice.
fn compact(tasks: &mut VecDeque<MessageTask>, cap: usize, keep_tail: usize) {
    let content_idx: Vec<usize> = tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.kind == TaskKind::Content)
        .map(|(i, _)| i)
        .collect();
    if content_idx.len() <= cap {
        return;
    }

    let cut_from = 1;
    let cut_to = content_idx.len() - keep_tail;
    let dropped = cut_to - cut_from;
    let drop_set: Vec<usize> = content_idx[cut_from..cut_to].to_vec();

    let template = &tasks[drop_set[0]];
    let notice = MessageTask::content(
        &template.window_id,
        template.chat_id,
        template.topic_id,
        ContentType::Text,
        format!("… {dropped} messages dropped …"),
    );

    let mut rebuilt = VecDeque::with_capacity(tasks.len() - dropped + 1);
    for (i, task) in tasks.drain(..).enumerate() {
        if drop_set.contains(&i) {
            continue;
        }
        rebuilt.push_back(task);
        if i == content_idx[0] {
            rebuilt.push_back(notice.clone());
        }
    }
    *tasks = rebuilt;
}

/// Pop the head task, folding in as many mergeable successors as fit.
///
/// Merging never crosses a tool boundary: a head that carries a
/// `tool_use_id` (call or result) goes out alone so pairing edits stay
/// precise, and a tool task at the frontier ends the chain.
fn pop_merged(state: &QueueState, cfg: &DeliveryConfig) -> Option<MessageTask> {
    let mut tasks = state.tasks.lock();
    let mut head = tasks.pop_front()?;

    if head.kind != TaskKind::Content
        || head.tool_use_id.is_some()
        || !head.content_type.mergeable()
    {
        return Some(head);
    }

    while let Some(next) = tasks.front() {
        let fits = next.kind == TaskKind::Content
            && next.tool_use_id.is_none()
            && next.content_type.mergeable()
            && next.window_id == head.window_id
            && next.topic_id == head.topic_id
            && head.merged_len() + 2 + next.merged_len() <= cfg.merge_limit;
        if !fits {
            break;
        }
        let Some(mut next) = tasks.pop_front() else {
            break;
        };
        head.parts.append(&mut next.parts);
    }
    Some(head)
}

async fn worker_loop(
    user_id: u64,
    state: Arc<QueueState>,
    transport: Arc<dyn ChatTransport>,
    pending: Arc<PendingTools>,
    cfg: DeliveryConfig,
    shutdown: CancellationToken,
) {
    // window_id → displayed status message.
    let mut status_msgs: HashMap<String, (i64, i32)> = HashMap::new();
    let mut last_op: Option<Instant> = None;

    loop {
        let task = loop {
            if let Some(task) = pop_merged(&state, &cfg) {
                break Some(task);
            }
            tokio::select! {
                _ = state.wake.notified() => {}
                _ = shutdown.cancelled() => break None,
            }
        };

        let Some(task) = task else {
            // Shutdown: drain what is left within the budget.
            let deadline = Instant::now() + cfg.drain_timeout;
            while let Some(task) = pop_merged(&state, &cfg) {
                if Instant::now() >= deadline {
                    debug!(user_id, "drain deadline reached, dropping remaining tasks");
                    break;
                }
                deliver(&task, &transport, &pending, &cfg, &mut status_msgs, &mut last_op)
                    .await;
            }
            return;
        };

        deliver(&task, &transport, &pending, &cfg, &mut status_msgs, &mut last_op).await;
    }
}

async fn deliver(
    task: &MessageTask,
    transport: &Arc<dyn ChatTransport>,
    pending: &Arc<PendingTools>,
    cfg: &DeliveryConfig,
    status_msgs: &mut HashMap<String, (i64, i32)>,
    last_op: &mut Option<Instant>,
) {
    match task.kind {
        TaskKind::StatusClear => {
            if let Some((chat_id, message_id)) = status_msgs.remove(&task.window_id) {
                pace(last_op, cfg.min_gap).await;
                if let Err(e) = transport.delete(chat_id, message_id).await {
                    debug!("status delete failed: {e:#}");
                }
                *last_op = Some(Instant::now());
            }
        }
        TaskKind::StatusUpdate => {
            let line = task.parts.join(" ");
            match status_msgs.get(&task.window_id).copied() {
                Some((chat_id, message_id)) => {
                    pace(last_op, cfg.min_gap).await;
                    if let Err(e) = transport.edit(chat_id, message_id, line).await {
                        debug!("status edit failed: {e:#}");
                        status_msgs.remove(&task.window_id);
                    }
                    *last_op = Some(Instant::now());
                }
                None => {
                    pace(last_op, cfg.min_gap).await;
                    match transport.send(task.chat_id, task.topic_id, line).await {
                        Ok(message_id) => {
                            status_msgs
                                .insert(task.window_id.clone(), (task.chat_id, message_id));
                        }
                        Err(e) => warn!("status send failed: {e:#}"),
                    }
                    *last_op = Some(Instant::now());
                }
            }
        }
        TaskKind::Content => {
            let text = task.parts.join("\n\n");

            // A result pairs with its delivered call: edit in place.
            if matches!(task.content_type, ContentType::ToolResult | ContentType::ToolError) {
                if let Some(id) = task.tool_use_id.as_deref() {
                    if let Some(p) = pending.take(id) {
                        pace(last_op, cfg.min_gap).await;
                        let combined = format!("{}\n\n{text}", p.text);
                        if let Err(e) =
                            transport.edit(p.chat_id, p.message_id, combined).await
                        {
                            warn!("tool result edit failed: {e:#}");
                        }
                        *last_op = Some(Instant::now());
                        return;
                    }
                }
            }

            // First content while a status is displayed: reuse its message.
            if let Some((chat_id, message_id)) = status_msgs.remove(&task.window_id) {
                pace(last_op, cfg.min_gap).await;
                match transport.edit(chat_id, message_id, text.clone()).await {
                    Ok(()) => {
                        *last_op = Some(Instant::now());
                        record_pending(task, pending, chat_id, message_id, &text);
                        return;
                    }
                    Err(e) => {
                        // The status message may have been deleted externally;
                        // fall through to a fresh send.
                        debug!("status collapse edit failed: {e:#}");
                        *last_op = Some(Instant::now());
                    }
                }
            }

            pace(last_op, cfg.min_gap).await;
            match transport.send(task.chat_id, task.topic_id, text.clone()).await {
                Ok(message_id) => {
                    record_pending(task, pending, task.chat_id, message_id, &text);
                }
                Err(e) => warn!("content send failed: {e:#}"),
            }
            *last_op = Some(Instant::now());
        }
    }
}

fn record_pending(
    task: &MessageTask,
    pending: &Arc<PendingTools>,
    chat_id: i64,
    message_id: i32,
    text: &str,
) {
    if task.content_type == ContentType::ToolUse {
        if let Some(id) = task.tool_use_id.as_deref() {
            pending.insert(id, chat_id, message_id, text.to_owned());
        }
    }
}

async fn pace(last_op: &Option<Instant>, min_gap: Duration) {
    if let Some(prev) = last_op {
        let elapsed = prev.elapsed();
        if elapsed < min_gap {
            tokio::time::sleep(min_gap - elapsed).await;
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
