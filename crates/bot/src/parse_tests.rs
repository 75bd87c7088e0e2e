// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::event::{ContentType, Role};

use super::parse_line;

#[test]
fn assistant_text_block() -> anyhow::Result<()> {
    let line = r#"{"type":"assistant","timestamp":"2026-01-02T03:04:05Z","message":{"role":"assistant","content":[{"type":"text","text":"Here is the answer."}]}}"#;
    let entries = parse_line(line)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content_type, ContentType::Text);
    assert_eq!(entries[0].role, Role::Assistant);
    assert_eq!(entries[0].text, "Here is the answer.");
    assert_eq!(entries[0].timestamp.as_deref(), Some("2026-01-02T03:04:05Z"));
    Ok(())
}

#[test]
fn one_line_fans_out_into_multiple_entries() -> anyhow::Result<()> {
    let line = r#"{"type":"assistant","message":{"content":[
        {"type":"thinking","thinking":"hmm"},
        {"type":"text","text":"ok"},
        {"type":"tool_use","id":"toolu_1","name":"Bash","input":{"command":"ls -la"}}
    ]}}"#;
    let entries = parse_line(line)?;
    let types: Vec<ContentType> = entries.iter().map(|e| e.content_type).collect();
    assert_eq!(types, vec![ContentType::Thinking, ContentType::Text, ContentType::ToolUse]);
    Ok(())
}

#[test]
fn thinking_is_clamped_with_ellipsis() -> anyhow::Result<()> {
    let long = "x".repeat(600);
    let line = format!(
        r#"{{"type":"assistant","message":{{"content":[{{"type":"thinking","thinking":"{long}"}}]}}}}"#
    );
    let entries = parse_line(&line)?;
    assert_eq!(entries[0].text.chars().count(), 501);
    assert!(entries[0].text.ends_with('…'));
    Ok(())
}

#[test]
fn tool_use_renders_bold_name_and_summary() -> anyhow::Result<()> {
    let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"toolu_2","name":"Read","input":{"file_path":"/tmp/a.rs","limit":40}}]}}"#;
    let entries = parse_line(line)?;
    assert_eq!(entries[0].text, "*Read* /tmp/a.rs");
    assert_eq!(entries[0].tool_use_id.as_deref(), Some("toolu_2"));
    assert_eq!(entries[0].tool_name.as_deref(), Some("Read"));
    Ok(())
}

#[test]
fn tool_result_carries_pairing_id() -> anyhow::Result<()> {
    let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"toolu_2","content":"Read 50 lines"}]}}"#;
    let entries = parse_line(line)?;
    assert_eq!(entries[0].content_type, ContentType::ToolResult);
    assert_eq!(entries[0].tool_use_id.as_deref(), Some("toolu_2"));
    assert_eq!(entries[0].text, "Read 50 lines");
    Ok(())
}

#[test]
fn tool_result_array_content_is_joined() -> anyhow::Result<()> {
    let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t","content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}]}}"#;
    let entries = parse_line(line)?;
    assert_eq!(entries[0].text, "a\nb");
    Ok(())
}

#[test]
fn error_prefix_reclassifies_to_tool_error() -> anyhow::Result<()> {
    let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t","content":"Error: no such file"}]}}"#;
    let entries = parse_line(line)?;
    assert_eq!(entries[0].content_type, ContentType::ToolError);
    Ok(())
}

#[test]
fn interrupt_marker_reclassifies_to_tool_error() -> anyhow::Result<()> {
    let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t","content":"[Request interrupted by user]"}]}}"#;
    let entries = parse_line(line)?;
    assert_eq!(entries[0].content_type, ContentType::ToolError);
    Ok(())
}

#[test]
fn plain_user_message_string_form() -> anyhow::Result<()> {
    let line = r#"{"type":"user","message":{"content":"fix the tests"}}"#;
    let entries = parse_line(line)?;
    assert_eq!(entries[0].content_type, ContentType::User);
    assert_eq!(entries[0].text, "fix the tests");
    Ok(())
}

#[test]
fn local_command_extracts_name_and_args() -> anyhow::Result<()> {
    let line = r#"{"type":"user","message":{"content":"<command-name>/clear</command-name><command-message>clear</command-message><command-args>now</command-args>"}}"#;
    let entries = parse_line(line)?;
    assert_eq!(entries[0].content_type, ContentType::LocalCommand);
    assert_eq!(entries[0].text, "/clear now");
    Ok(())
}

#[test]
fn empty_command_stdout_is_dropped() -> anyhow::Result<()> {
    let line = r#"{"type":"user","message":{"content":"<local-command-stdout></local-command-stdout>"}}"#;
    assert!(parse_line(line)?.is_empty());
    Ok(())
}

#[test]
fn system_and_summary_lines_produce_nothing() -> anyhow::Result<()> {
    assert!(parse_line(r#"{"type":"system","subtype":"init"}"#)?.is_empty());
    assert!(parse_line(r#"{"type":"summary","summary":"compacted"}"#)?.is_empty());
    Ok(())
}

#[test]
fn meta_user_entries_are_skipped() -> anyhow::Result<()> {
    let line = r#"{"type":"user","isMeta":true,"message":{"content":"caveat text"}}"#;
    assert!(parse_line(line)?.is_empty());
    Ok(())
}

#[test]
fn malformed_line_is_an_error() {
    assert!(parse_line("{truncated").is_err());
}

#[test]
fn tool_summary_falls_back_to_key_value_pairs() -> anyhow::Result<()> {
    let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t","name":"Custom","input":{"alpha":"one two","beta":3}}]}}"#;
    let entries = parse_line(line)?;
    assert!(entries[0].text.starts_with("*Custom* "));
    assert!(entries[0].text.contains("alpha=one two"));
    Ok(())
}
