// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// Semantic class of a mirrored message.
///
/// The full domain of content the bridge can deliver to a topic. Matching on
/// this enum is how downstream layers (filter, merge policy, rendering)
/// branch — there are no free-form type strings anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Thinking,
    ToolUse,
    ToolResult,
    ToolError,
    LocalCommand,
    User,
    InteractivePrompt,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Thinking => "thinking",
            Self::ToolUse => "tool_use",
            Self::ToolResult => "tool_result",
            Self::ToolError => "tool_error",
            Self::LocalCommand => "local_command",
            Self::User => "user",
            Self::InteractivePrompt => "interactive_prompt",
        }
    }

    /// Whether adjacent tasks of this type may be concatenated into one send.
    ///
    /// Tool calls and results are excluded: a `tool_use` must keep its own
    /// message id so the matching result can edit it later.
    pub fn mergeable(&self) -> bool {
        matches!(self, Self::Text | Self::Thinking | Self::User | Self::LocalCommand)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed entry decoded from a transcript line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub role: Role,
    pub content_type: ContentType,
    pub text: String,
    pub timestamp: Option<String>,
    pub tool_use_id: Option<String>,
    pub tool_name: Option<String>,
}

/// Event emitted by the transcript monitor for each decoded entry.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub agent_session_id: String,
    pub content_type: ContentType,
    pub text: String,
    pub role: Role,
    pub is_complete: bool,
    pub tool_use_id: Option<String>,
    pub tool_name: Option<String>,
}

/// Kind of a delivery work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Content,
    StatusUpdate,
    StatusClear,
}

/// A unit of outbound work for one user's delivery worker.
#[derive(Debug, Clone)]
pub struct MessageTask {
    pub kind: TaskKind,
    pub window_id: String,
    pub chat_id: i64,
    pub topic_id: i32,
    pub parts: Vec<String>,
    pub content_type: ContentType,
    pub tool_use_id: Option<String>,
    /// When set, the task edits this message instead of sending a new one.
    pub target_message_id: Option<i32>,
}

impl MessageTask {
    pub fn content(
        window_id: &str,
        chat_id: i64,
        topic_id: i32,
        content_type: ContentType,
        text: String,
    ) -> Self {
        Self {
            kind: TaskKind::Content,
            window_id: window_id.to_owned(),
            chat_id,
            topic_id,
            parts: vec![text],
            content_type,
            tool_use_id: None,
            target_message_id: None,
        }
    }

    pub fn status_update(window_id: &str, chat_id: i64, topic_id: i32, line: String) -> Self {
        Self {
            kind: TaskKind::StatusUpdate,
            window_id: window_id.to_owned(),
            chat_id,
            topic_id,
            parts: vec![line],
            content_type: ContentType::Text,
            tool_use_id: None,
            target_message_id: None,
        }
    }

    pub fn status_clear(window_id: &str, chat_id: i64, topic_id: i32) -> Self {
        Self {
            kind: TaskKind::StatusClear,
            window_id: window_id.to_owned(),
            chat_id,
            topic_id,
            parts: Vec::new(),
            content_type: ContentType::Text,
            tool_use_id: None,
            target_message_id: None,
        }
    }

    /// Total character length of all parts plus the blank-line separators
    /// a merged send would insert between them.
    pub fn merged_len(&self) -> usize {
        let sep = if self.parts.is_empty() { 0 } else { (self.parts.len() - 1) * 2 };
        self.parts.iter().map(|p| p.chars().count()).sum::<usize>() + sep
    }
}
