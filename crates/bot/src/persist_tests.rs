// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use super::{read_json, write_json};

#[test]
fn round_trips_a_map() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.json");

    let mut map = HashMap::new();
    map.insert("@1".to_owned(), 42u64);
    write_json(&path, &map)?;

    let loaded: Option<HashMap<String, u64>> = read_json(&path)?;
    assert_eq!(loaded, Some(map));
    Ok(())
}

#[test]
fn missing_file_reads_as_none() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let loaded: Option<HashMap<String, u64>> = read_json(&dir.path().join("absent.json"))?;
    assert!(loaded.is_none());
    Ok(())
}

#[test]
fn overwrite_replaces_whole_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.json");

    write_json(&path, &vec![1, 2, 3])?;
    write_json(&path, &vec![9])?;

    let loaded: Option<Vec<u64>> = read_json(&path)?;
    assert_eq!(loaded, Some(vec![9]));
    Ok(())
}

#[test]
fn malformed_file_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{not json")?;

    let result: anyhow::Result<Option<Vec<u64>>> = read_json(&path);
    assert!(result.is_err());
    Ok(())
}
