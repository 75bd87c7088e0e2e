// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::event::ContentType;

use super::NotifyFilter;

#[test]
fn creates_all_on_file_when_missing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("notify.json");

    let filter = NotifyFilter::load_or_create(path.clone())?;
    assert!(path.exists());
    assert!(filter.allows(ContentType::Text, false));
    assert!(filter.allows(ContentType::Thinking, false));
    assert!(filter.allows(ContentType::ToolUse, false));
    Ok(())
}

#[test]
fn muted_types_are_filtered() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("notify.json");

    let mut filter = NotifyFilter::load_or_create(path.clone())?;
    filter.set(ContentType::Thinking, false)?;
    assert!(!filter.allows(ContentType::Thinking, false));

    // The change persists.
    let reloaded = NotifyFilter::load_or_create(path)?;
    assert!(!reloaded.allows(ContentType::Thinking, false));
    assert!(reloaded.allows(ContentType::Text, false));
    Ok(())
}

#[test]
fn pairing_edits_bypass_the_filter() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut filter = NotifyFilter::load_or_create(dir.path().join("notify.json"))?;
    filter.set(ContentType::ToolResult, false)?;

    assert!(!filter.allows(ContentType::ToolResult, false));
    assert!(filter.allows(ContentType::ToolResult, true));
    Ok(())
}

#[test]
fn interactive_prompts_always_pass() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let filter = NotifyFilter::load_or_create(dir.path().join("notify.json"))?;
    assert!(filter.allows(ContentType::InteractivePrompt, false));
    Ok(())
}

#[test]
fn partial_files_default_missing_types_to_on() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("notify.json");
    std::fs::write(&path, r#"{"thinking": false}"#)?;

    let filter = NotifyFilter::load_or_create(path)?;
    assert!(!filter.allows(ContentType::Thinking, false));
    assert!(filter.allows(ContentType::Text, false));
    Ok(())
}
