// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::chat::{ChatTransport, TransportFuture};
use crate::event::{ContentType, MessageTask};

use super::{DeliveryConfig, PendingTools, UserQueues};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Send { chat_id: i64, topic_id: i32, text: String },
    Edit { message_id: i32, text: String },
    Delete { message_id: i32 },
}

#[derive(Default)]
struct FakeTransport {
    ops: Mutex<Vec<(Instant, Op)>>,
    next_id: AtomicI32,
}

impl FakeTransport {
    fn ops(&self) -> Vec<Op> {
        self.ops.lock().iter().map(|(_, op)| op.clone()).collect()
    }

    fn timestamps(&self) -> Vec<Instant> {
        self.ops.lock().iter().map(|(t, _)| *t).collect()
    }
}

impl ChatTransport for FakeTransport {
    fn send(&self, chat_id: i64, topic_id: i32, text: String) -> TransportFuture<'_, i32> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            self.ops.lock().push((Instant::now(), Op::Send { chat_id, topic_id, text }));
            Ok(id)
        })
    }

    fn edit(&self, _chat_id: i64, message_id: i32, text: String) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.ops.lock().push((Instant::now(), Op::Edit { message_id, text }));
            Ok(())
        })
    }

    fn delete(&self, _chat_id: i64, message_id: i32) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.ops.lock().push((Instant::now(), Op::Delete { message_id }));
            Ok(())
        })
    }
}

fn pipeline() -> (Arc<FakeTransport>, Arc<PendingTools>, UserQueues) {
    let transport = Arc::new(FakeTransport::default());
    let pending = Arc::new(PendingTools::new());
    let queues = UserQueues::new(
        Arc::clone(&transport) as Arc<dyn ChatTransport>,
        Arc::clone(&pending),
        DeliveryConfig::default(),
    );
    (transport, pending, queues)
}

fn text_task(text: &str) -> MessageTask {
    MessageTask::content("@3", -100, 7, ContentType::Text, text.to_owned())
}

async fn settle() {
    // Paused-clock runtimes auto-advance through the rate limiter sleeps.
    tokio::time::sleep(Duration::from_secs(60)).await;
}

#[tokio::test(start_paused = true)]
async fn tool_result_edits_the_delivered_tool_use() {
    let (transport, _pending, queues) = pipeline();

    let mut call = MessageTask::content("@3", -100, 7, ContentType::ToolUse, "*Read* a.rs".into());
    call.tool_use_id = Some("toolu_1".to_owned());
    queues.enqueue_content(42, call);
    settle().await;

    let mut result =
        MessageTask::content("@3", -100, 7, ContentType::ToolResult, "Read 50 lines".into());
    result.tool_use_id = Some("toolu_1".to_owned());
    queues.enqueue_content(42, result);
    settle().await;

    let ops = transport.ops();
    assert_eq!(ops.len(), 2);
    assert!(matches!(&ops[0], Op::Send { text, .. } if text == "*Read* a.rs"));
    match &ops[1] {
        Op::Edit { message_id, text } => {
            assert_eq!(*message_id, 1);
            assert_eq!(text, "*Read* a.rs\n\nRead 50 lines");
        }
        other => unreachable!("expected edit, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn result_without_pending_call_sends_fresh() {
    let (transport, _pending, queues) = pipeline();

    let mut result =
        MessageTask::content("@3", -100, 7, ContentType::ToolResult, "orphan result".into());
    result.tool_use_id = Some("toolu_gone".to_owned());
    queues.enqueue_content(42, result);
    settle().await;

    assert!(matches!(&transport.ops()[..], [Op::Send { .. }]));
}

#[tokio::test(start_paused = true)]
async fn status_collapses_into_first_content() {
    let (transport, _pending, queues) = pipeline();

    queues.enqueue_status_update(42, MessageTask::status_update("@3", -100, 7, "Thinking…".into()));
    queues.enqueue_content(42, text_task("Here is the answer."));
    settle().await;

    let ops = transport.ops();
    assert_eq!(ops.len(), 2);
    assert!(matches!(&ops[0], Op::Send { text, .. } if text == "Thinking…"));
    assert!(matches!(&ops[1], Op::Edit { message_id: 1, text } if text == "Here is the answer."));
}

#[tokio::test(start_paused = true)]
async fn queued_status_updates_deduplicate_per_window() {
    let (transport, _pending, queues) = pipeline();

    queues.enqueue_status_update(42, MessageTask::status_update("@3", -100, 7, "Reading…".into()));
    queues.enqueue_status_update(42, MessageTask::status_update("@3", -100, 7, "Writing…".into()));
    queues
        .enqueue_status_update(42, MessageTask::status_update("@9", -100, 8, "Elsewhere…".into()));
    settle().await;

    let ops = transport.ops();
    assert_eq!(ops.len(), 2);
    assert!(matches!(&ops[0], Op::Send { text, .. } if text == "Writing…"));
    assert!(matches!(&ops[1], Op::Send { text, .. } if text == "Elsewhere…"));
}

#[tokio::test(start_paused = true)]
async fn status_clear_deletes_the_status_message() {
    let (transport, _pending, queues) = pipeline();

    queues.enqueue_status_update(42, MessageTask::status_update("@3", -100, 7, "Thinking…".into()));
    settle().await;
    queues.enqueue_status_clear(42, MessageTask::status_clear("@3", -100, 7));
    settle().await;

    let ops = transport.ops();
    assert_eq!(ops.len(), 2);
    assert!(matches!(&ops[1], Op::Delete { message_id: 1 }));
}

#[tokio::test(start_paused = true)]
async fn consecutive_sends_respect_the_rate_limit() {
    let (transport, _pending, queues) = pipeline();

    // Tool results never merge, so five queued at once mean five sends.
    for i in 0..5 {
        let mut t = text_task(&format!("msg {i}"));
        t.content_type = ContentType::ToolResult;
        queues.enqueue_content(42, t);
    }
    settle().await;

    let times = transport.timestamps();
    assert_eq!(times.len(), 5);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(1100));
    }
}

#[tokio::test(start_paused = true)]
async fn adjacent_texts_merge_up_to_the_limit() {
    let (transport, _pending, queues) = pipeline();

    let part = "x".repeat(1800);
    queues.enqueue_content(42, text_task(&part));
    queues.enqueue_content(42, text_task(&part));
    queues.enqueue_content(42, text_task(&part));
    settle().await;

    let ops = transport.ops();
    assert_eq!(ops.len(), 2);
    match &ops[0] {
        Op::Send { text, .. } => {
            assert_eq!(text.chars().count(), 1800 * 2 + 2);
            assert!(text.contains("\n\n"));
        }
        other => unreachable!("expected send, got {other:?}"),
    }
    assert!(matches!(&ops[1], Op::Send { text, .. } if text.chars().count() == 1800));
}

#[tokio::test(start_paused = true)]
async fn merge_never_crosses_a_tool_use() {
    let (transport, _pending, queues) = pipeline();

    queues.enqueue_content(42, text_task("before"));
    let mut call = MessageTask::content("@3", -100, 7, ContentType::ToolUse, "*Bash* ls".into());
    call.tool_use_id = Some("toolu_9".to_owned());
    queues.enqueue_content(42, call);
    queues.enqueue_content(42, text_task("after"));
    settle().await;

    let ops = transport.ops();
    assert_eq!(ops.len(), 3);
    assert!(matches!(&ops[0], Op::Send { text, .. } if text == "before"));
    assert!(matches!(&ops[1], Op::Send { text, .. } if text == "*Bash* ls"));
    assert!(matches!(&ops[2], Op::Send { text, .. } if text == "after"));
}

#[tokio::test(start_paused = true)]
async fn merging_requires_same_window_and_topic() {
    let (transport, _pending, queues) = pipeline();

    queues.enqueue_content(42, text_task("one"));
    queues.enqueue_content(
        42,
        MessageTask::content("@9", -100, 8, ContentType::Text, "two".to_owned()),
    );
    settle().await;

    assert_eq!(transport.ops().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn overflow_compacts_to_oldest_plus_tail() {
    let (transport, _pending, queues) = pipeline();

    // Enqueue 9 one-off tasks before the worker gets to run; tool results
    // are unmergeable so each would be its own send.
    for i in 0..9 {
        let mut t = text_task(&format!("msg {i}"));
        t.content_type = ContentType::ToolResult;
        queues.enqueue_content(42, t);
    }
    settle().await;

    let texts: Vec<String> = transport
        .ops()
        .iter()
        .filter_map(|op| match op {
            Op::Send { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(texts.first().map(String::as_str), Some("msg 0"));
    assert!(texts.iter().any(|t| t.contains("messages dropped")));
    assert_eq!(texts.last().map(String::as_str), Some("msg 8"));
    // Oldest + notice + newest three.
    assert_eq!(texts.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn purge_drops_queued_tasks_for_a_window() {
    let (transport, _pending, queues) = pipeline();

    queues.enqueue_content(42, text_task("never delivered"));
    queues.purge_window(42, "@3", -100, 7);
    settle().await;

    // Nothing was ever sent for the purged window and there was no status
    // message to delete.
    assert!(transport.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_drains_queued_tasks() {
    let (transport, _pending, queues) = pipeline();

    queues.enqueue_content(42, {
        let mut t = text_task("first");
        t.content_type = ContentType::ToolResult;
        t
    });
    queues.enqueue_content(42, {
        let mut t = text_task("second");
        t.content_type = ContentType::ToolResult;
        t
    });
    queues.shutdown().await;

    assert_eq!(transport.ops().len(), 2);
}
