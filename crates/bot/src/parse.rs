// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transcript line decoding.
//!
//! Each line of an agent session log is one JSON entry. A line can fan out
//! into several typed entries (an assistant turn may carry thinking, text,
//! and tool calls in one message). Nothing here truncates payloads — large
//! content is the send layer's problem — with the single exception of
//! thinking text, which is clamped for display.

use serde_json::Value;

use crate::event::{ContentType, ParsedEntry, Role};

/// Display budget for thinking blocks.
const THINKING_LIMIT: usize = 500;

/// Argument-summary budget for tool-call headers.
const TOOL_SUMMARY_LIMIT: usize = 200;

/// Keys tried, in order, for a one-line tool argument summary.
const SUMMARY_KEYS: &[&str] =
    &["command", "file_path", "path", "pattern", "url", "query", "description", "prompt"];

/// Decode one transcript line into zero or more typed entries.
///
/// Entries the bridge does not mirror (system, summary, meta) decode to an
/// empty vector. A line that is not valid JSON is an error; the monitor
/// logs it, skips it, and advances past it.
pub fn parse_line(line: &str) -> anyhow::Result<Vec<ParsedEntry>> {
    let json: Value = serde_json::from_str(line)?;
    let timestamp = json.get("timestamp").and_then(|v| v.as_str()).map(str::to_owned);

    match json.get("type").and_then(|v| v.as_str()) {
        Some("assistant") => Ok(parse_assistant(&json, timestamp)),
        Some("user") => Ok(parse_user(&json, timestamp)),
        _ => Ok(Vec::new()),
    }
}

fn parse_assistant(json: &Value, timestamp: Option<String>) -> Vec<ParsedEntry> {
    let Some(content) =
        json.get("message").and_then(|m| m.get("content")).and_then(|c| c.as_array())
    else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for block in content {
        match block.get("type").and_then(|v| v.as_str()) {
            Some("thinking") => {
                let Some(text) = block.get("thinking").and_then(|v| v.as_str()) else {
                    continue;
                };
                entries.push(ParsedEntry {
                    role: Role::Assistant,
                    content_type: ContentType::Thinking,
                    text: clamp(text, THINKING_LIMIT),
                    timestamp: timestamp.clone(),
                    tool_use_id: None,
                    tool_name: None,
                });
            }
            Some("text") => {
                let Some(text) = block.get("text").and_then(|v| v.as_str()) else {
                    continue;
                };
                if text.is_empty() {
                    continue;
                }
                entries.push(ParsedEntry {
                    role: Role::Assistant,
                    content_type: ContentType::Text,
                    text: text.to_owned(),
                    timestamp: timestamp.clone(),
                    tool_use_id: None,
                    tool_name: None,
                });
            }
            Some("tool_use") => {
                let name = block.get("name").and_then(|v| v.as_str()).unwrap_or("tool");
                let input = block.get("input").cloned().unwrap_or(Value::Null);
                entries.push(ParsedEntry {
                    role: Role::Assistant,
                    content_type: ContentType::ToolUse,
                    text: format_tool_use(name, &input),
                    timestamp: timestamp.clone(),
                    tool_use_id: block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .map(str::to_owned),
                    tool_name: Some(name.to_owned()),
                });
            }
            _ => {}
        }
    }
    entries
}

fn parse_user(json: &Value, timestamp: Option<String>) -> Vec<ParsedEntry> {
    // Meta entries (hook echoes, caveats) are bookkeeping, not conversation.
    if json.get("isMeta").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Vec::new();
    }

    let Some(content) = json.get("message").and_then(|m| m.get("content")) else {
        return Vec::new();
    };

    // Plain-string form of a user message.
    if let Some(text) = content.as_str() {
        return classify_user_text(text, timestamp).into_iter().collect();
    }

    let Some(blocks) = content.as_array() else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|v| v.as_str()) {
            Some("tool_result") => {
                let text = tool_result_text(block.get("content"));
                let content_type = if is_error_payload(&text) {
                    ContentType::ToolError
                } else {
                    ContentType::ToolResult
                };
                entries.push(ParsedEntry {
                    role: Role::User,
                    content_type,
                    text,
                    timestamp: timestamp.clone(),
                    tool_use_id: block
                        .get("tool_use_id")
                        .and_then(|v| v.as_str())
                        .map(str::to_owned),
                    tool_name: None,
                });
            }
            Some("text") => {
                if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
                    entries.extend(classify_user_text(text, timestamp.clone()));
                }
            }
            _ => {}
        }
    }
    entries
}

/// A user entry is either a local slash command (the CLI logs these with
/// XML-ish command tags), a command's captured stdout, or a plain message.
fn classify_user_text(text: &str, timestamp: Option<String>) -> Option<ParsedEntry> {
    if let Some(name) = extract_tag(text, "command-name") {
        let args = extract_tag(text, "command-args").unwrap_or_default();
        let rendered =
            if args.is_empty() { name } else { format!("{name} {args}") };
        return Some(ParsedEntry {
            role: Role::User,
            content_type: ContentType::LocalCommand,
            text: rendered,
            timestamp,
            tool_use_id: None,
            tool_name: None,
        });
    }
    if let Some(stdout) = extract_tag(text, "local-command-stdout") {
        if stdout.trim().is_empty() {
            return None;
        }
        return Some(ParsedEntry {
            role: Role::User,
            content_type: ContentType::LocalCommand,
            text: stdout.trim_end().to_owned(),
            timestamp,
            tool_use_id: None,
            tool_name: None,
        });
    }
    if text.trim().is_empty() {
        return None;
    }
    Some(ParsedEntry {
        role: Role::User,
        content_type: ContentType::User,
        text: text.to_owned(),
        timestamp,
        tool_use_id: None,
        tool_name: None,
    })
}

/// Flatten a tool_result payload: either a bare string or an array of text
/// blocks joined by newlines.
fn tool_result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(|v| v.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|v| v.as_str()))
                .collect();
            texts.join("\n")
        }
        _ => String::new(),
    }
}

/// Error sentinel match: an `Error:` prefix or the CLI's interrupt marker.
fn is_error_payload(text: &str) -> bool {
    text.trim_start().starts_with("Error:") || text.contains("[Request interrupted")
}

/// Render a tool call as a bold name plus a compact one-line argument
/// summary.
fn format_tool_use(name: &str, input: &Value) -> String {
    let summary = tool_summary(input);
    if summary.is_empty() {
        format!("*{name}*")
    } else {
        format!("*{name}* {summary}")
    }
}

fn tool_summary(input: &Value) -> String {
    let Some(obj) = input.as_object() else {
        return String::new();
    };

    for key in SUMMARY_KEYS {
        if let Some(value) = obj.get(*key).and_then(|v| v.as_str()) {
            return clamp(&one_line(value), TOOL_SUMMARY_LIMIT);
        }
    }

    // No well-known key: fall back to the first few key=value pairs.
    let pairs: Vec<String> = obj
        .iter()
        .take(3)
        .map(|(k, v)| match v.as_str() {
            Some(s) => format!("{k}={}", one_line(s)),
            None => format!("{k}={v}"),
        })
        .collect();
    clamp(&pairs.join(" "), TOOL_SUMMARY_LIMIT)
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clamp(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let mut clipped: String = text.chars().take(limit).collect();
    clipped.push('…');
    clipped
}

fn extract_tag(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim().to_owned())
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
