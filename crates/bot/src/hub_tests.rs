// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use crate::mux::WindowInfo;
use crate::session_map::{SessionMap, SessionMapEntry};

use super::Hub;

fn window(id: &str, name: &str) -> WindowInfo {
    WindowInfo {
        window_id: id.to_owned(),
        name: name.to_owned(),
        cwd: format!("/tmp/{name}"),
        pane_command: "claude".to_owned(),
    }
}

fn hub_in(dir: &tempfile::TempDir) -> anyhow::Result<Hub> {
    Hub::load(dir.path().join("state.json"))
}

#[test]
fn bind_resolve_unbind_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hub = hub_in(&dir)?;

    hub.bind(42, 7, &window("@3", "proj"), -100123)?;
    assert_eq!(hub.resolve_topic(42, 7).as_deref(), Some("@3"));
    assert_eq!(hub.topic_for(42, "@3"), Some(7));
    assert_eq!(hub.chat_for(42, 7), Some(-100123));

    assert_eq!(hub.unbind(42, 7)?.as_deref(), Some("@3"));
    assert_eq!(hub.resolve_topic(42, 7), None);
    assert_eq!(hub.topic_for(42, "@3"), None);
    Ok(())
}

#[test]
fn a_window_binds_to_at_most_one_topic() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hub = hub_in(&dir)?;

    hub.bind(42, 7, &window("@3", "proj"), -1)?;
    let err = hub.bind(42, 8, &window("@3", "proj"), -1);
    assert!(err.is_err());

    // Re-binding the same pair to the same window is idempotent.
    assert!(hub.bind(42, 7, &window("@3", "proj"), -1).is_ok());
    Ok(())
}

#[test]
fn a_topic_binds_to_at_most_one_window() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hub = hub_in(&dir)?;

    hub.bind(42, 7, &window("@3", "proj"), -1)?;
    assert!(hub.bind(42, 7, &window("@5", "other"), -1).is_err());
    Ok(())
}

#[test]
fn bindings_survive_reload() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let hub = hub_in(&dir)?;
        hub.bind(42, 7, &window("@3", "proj"), -100)?;
        hub.advance_cursor(42, "@3", 512);
    }
    let hub = hub_in(&dir)?;
    assert_eq!(hub.resolve_topic(42, 7).as_deref(), Some("@3"));
    assert_eq!(hub.topic_for(42, "@3"), Some(7));
    assert_eq!(hub.cursor(42, "@3"), 512);
    Ok(())
}

#[test]
fn cursor_is_monotonic() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hub = hub_in(&dir)?;
    hub.bind(1, 1, &window("@1", "w"), -1)?;

    hub.advance_cursor(1, "@1", 100);
    hub.advance_cursor(1, "@1", 40);
    assert_eq!(hub.cursor(1, "@1"), 100);
    hub.advance_cursor(1, "@1", 101);
    assert_eq!(hub.cursor(1, "@1"), 101);
    Ok(())
}

#[test]
fn unbind_clears_the_cursor() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hub = hub_in(&dir)?;
    hub.bind(1, 1, &window("@1", "w"), -1)?;
    hub.advance_cursor(1, "@1", 64);

    hub.unbind(1, 1)?;
    assert_eq!(hub.cursor(1, "@1"), 0);
    Ok(())
}

#[test]
fn subscribers_resolve_through_the_session_map() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hub = hub_in(&dir)?;
    hub.bind(42, 7, &window("@3", "proj"), -100)?;
    hub.bind(99, 2, &window("@5", "other"), -200)?;

    let mut entries = HashMap::new();
    entries.insert(
        "ccbot:@3".to_owned(),
        SessionMapEntry {
            session_id: "sess-a".to_owned(),
            cwd: "/tmp/proj".to_owned(),
            window_name: "proj".to_owned(),
        },
    );
    let map = SessionMap::from_entries(entries);

    let subs = hub.find_subscribers(&map, "ccbot", "sess-a");
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].user_id, 42);
    assert_eq!(subs[0].topic_id, 7);
    assert_eq!(subs[0].chat_id, -100);
    assert_eq!(subs[0].window_id, "@3");

    assert!(hub.find_subscribers(&map, "ccbot", "sess-unknown").is_empty());
    Ok(())
}

#[test]
fn stale_ids_rebind_by_display_name() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hub = hub_in(&dir)?;
    hub.bind(42, 7, &window("@3", "proj"), -100)?;
    hub.advance_cursor(42, "@3", 256);

    // tmux restarted: same window name, new id.
    let live = vec![window("@11", "proj")];
    hub.resolve_stale_ids(&live)?;

    assert_eq!(hub.resolve_topic(42, 7).as_deref(), Some("@11"));
    assert_eq!(hub.topic_for(42, "@11"), Some(7));
    assert_eq!(hub.topic_for(42, "@3"), None);
    assert_eq!(hub.cursor(42, "@11"), 256);
    Ok(())
}

#[test]
fn stale_ids_drop_unmatched_bindings() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hub = hub_in(&dir)?;
    hub.bind(42, 7, &window("@3", "proj"), -100)?;

    hub.resolve_stale_ids(&[window("@11", "unrelated")])?;
    assert_eq!(hub.resolve_topic(42, 7), None);
    assert!(hub.bound_windows().is_empty());
    Ok(())
}

#[test]
fn stale_id_resolution_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hub = hub_in(&dir)?;
    hub.bind(42, 7, &window("@3", "proj"), -100)?;
    hub.bind(42, 9, &window("@4", "gone"), -100)?;

    let live = vec![window("@11", "proj"), window("@12", "spare")];
    hub.resolve_stale_ids(&live)?;
    let first = hub.bound_windows();

    hub.resolve_stale_ids(&live)?;
    assert_eq!(hub.bound_windows(), first);
    assert_eq!(hub.resolve_topic(42, 7).as_deref(), Some("@11"));
    assert_eq!(hub.resolve_topic(42, 9), None);
    Ok(())
}

#[test]
fn duplicate_display_names_first_match_wins() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hub = hub_in(&dir)?;
    hub.bind(1, 1, &window("@3", "proj"), -1)?;
    hub.bind(1, 2, &window("@4", "proj"), -1)?;

    // Two live windows named "proj": both bindings match the first one;
    // the loser is dropped rather than handed the spare.
    let live = vec![window("@20", "proj"), window("@21", "proj")];
    hub.resolve_stale_ids(&live)?;

    assert_eq!(hub.resolve_topic(1, 1).as_deref(), Some("@20"));
    assert_eq!(hub.resolve_topic(1, 2), None);
    Ok(())
}
