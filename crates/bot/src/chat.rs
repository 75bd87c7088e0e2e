// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat platform contract.
//!
//! The delivery pipeline talks to the platform through this object-safe
//! trait; the production implementation lives in [`crate::telegram`], tests
//! substitute a recording fake. Three operations cover everything the bridge
//! does: send into a topic, edit in place, delete.

use std::future::Future;
use std::pin::Pin;

use crate::event::{ContentType, NewMessage};

pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

pub trait ChatTransport: Send + Sync {
    /// Send a message into a topic, returning the platform message id.
    fn send(&self, chat_id: i64, topic_id: i32, text: String) -> TransportFuture<'_, i32>;

    /// Replace a previously sent message's text.
    fn edit(&self, chat_id: i64, message_id: i32, text: String) -> TransportFuture<'_, ()>;

    /// Delete a previously sent message.
    fn delete(&self, chat_id: i64, message_id: i32) -> TransportFuture<'_, ()>;
}

/// Render a monitor event for the chat platform.
///
/// Tool-call headers arrive already formatted by the parser; this adds the
/// per-type dressing: thinking becomes an expandable quote, local commands
/// are shown as code, tool errors get a warning marker.
pub fn render_message(msg: &NewMessage) -> String {
    match msg.content_type {
        ContentType::Thinking => expandable_quote(&msg.text),
        ContentType::LocalCommand => format!("`{}`", msg.text),
        ContentType::ToolError => format!("⚠️ {}", msg.text),
        ContentType::ToolResult => format!("→ {}", msg.text),
        ContentType::Text
        | ContentType::ToolUse
        | ContentType::User
        | ContentType::InteractivePrompt => msg.text.clone(),
    }
}

/// MarkdownV2 expandable blockquote.
fn expandable_quote(text: &str) -> String {
    let mut quoted = String::from("**>");
    let mut lines = text.lines();
    if let Some(first) = lines.next() {
        quoted.push_str(first);
    }
    for line in lines {
        quoted.push_str("\n>");
        quoted.push_str(line);
    }
    quoted.push_str("||");
    quoted
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
