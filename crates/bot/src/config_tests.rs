// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use super::Config;

fn parse(args: &[&str]) -> Config {
    let mut full = vec!["ccbot"];
    full.extend_from_slice(args);
    match Config::try_parse_from(full) {
        Ok(c) => c,
        Err(e) => unreachable!("args failed to parse: {e}"),
    }
}

#[test]
fn defaults_match_documented_values() {
    let config = parse(&[]);
    assert_eq!(config.tmux_session, "ccbot");
    assert_eq!(config.agent_command, "claude");
    assert_eq!(config.config_dir, "~/.ccbot");
    assert!((config.poll_interval - 2.0).abs() < f64::EPSILON);
    assert!((config.status_poll_interval - 1.0).abs() < f64::EPSILON);
}

#[test]
fn validate_requires_token_and_allowlist() {
    let config = parse(&[]);
    assert!(config.validate().is_err());

    let config = parse(&["--token", "123:abc"]);
    assert!(config.validate().is_err());

    let config = parse(&["--token", "123:abc", "--allowed-users", "42"]);
    assert!(config.validate().is_ok());
}

#[test]
fn allowlist_parses_and_trims() -> anyhow::Result<()> {
    let config = parse(&["--allowed-users", "42, 7,1000,"]);
    assert_eq!(config.allowed_user_ids()?, vec![42, 7, 1000]);
    Ok(())
}

#[test]
fn allowlist_rejects_non_numeric_entries() {
    let config = parse(&["--allowed-users", "42,bob"]);
    assert!(config.allowed_user_ids().is_err());
}

#[test]
fn validate_rejects_zero_poll_interval() {
    let config = parse(&["--token", "t", "--allowed-users", "1", "--poll-interval", "0"]);
    assert!(config.validate().is_err());
}

#[test]
fn state_paths_live_under_config_dir() {
    let config = parse(&["--config-dir", "/tmp/ccbot-test"]);
    assert_eq!(config.state_path(), std::path::Path::new("/tmp/ccbot-test/state.json"));
    assert_eq!(
        config.monitor_state_path(),
        std::path::Path::new("/tmp/ccbot-test/monitor_state.json")
    );
    assert_eq!(
        config.session_map_path(),
        std::path::Path::new("/tmp/ccbot-test/session_map.json")
    );
}

#[test]
fn poll_interval_converts_to_duration() {
    let config = parse(&["--poll-interval", "0.5"]);
    assert_eq!(config.poll_interval(), std::time::Duration::from_millis(500));
}
