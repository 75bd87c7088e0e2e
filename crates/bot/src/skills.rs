// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skill aliases — telegram-safe names for the agent's native slash commands.
//!
//! Telegram command names cannot contain `:` or `-`, so `/gsd:progress`
//! becomes the alias `gsd_progress`. The table lives in `skills.json` and is
//! (re)generated by `ccbot sync <project_dir>`, which scans the project's
//! `.claude/commands/` tree for command files with YAML frontmatter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Commands the bridge handles itself; aliases may not shadow these.
pub const NATIVE_COMMANDS: &[&str] =
    &["start", "history", "resume", "screenshot", "esc", "use", "new"];

/// One alias row in `skills.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillEntry {
    /// The native slash command, e.g. `/gsd:progress`.
    pub command: String,
    pub description: String,
}

/// The loaded alias table.
#[derive(Debug, Default)]
pub struct Skills {
    entries: HashMap<String, SkillEntry>,
}

impl Skills {
    /// Load `skills.json`; a missing file is an empty table. Rows with
    /// invalid or shadowing names are dropped with a warning rather than
    /// poisoning the whole table.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw: HashMap<String, SkillEntry> =
            crate::persist::read_json(path)?.unwrap_or_default();
        let mut entries = HashMap::new();
        for (name, entry) in raw {
            if !is_valid_name(&name) {
                warn!(name, "skipping skill with invalid name");
                continue;
            }
            if NATIVE_COMMANDS.contains(&name.as_str()) {
                warn!(name, "skipping skill that shadows a native command");
                continue;
            }
            entries.insert(name, entry);
        }
        Ok(Self { entries })
    }

    /// Resolve an alias to its native command.
    pub fn translate(&self, name: &str) -> Option<&SkillEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `[a-z][a-z0-9_]{0,31}`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_lowercase()
        && name.len() <= 32
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// YAML frontmatter of a command file.
#[derive(Debug, Deserialize)]
struct CommandMeta {
    #[serde(default)]
    description: String,
}

/// Scan `<project_dir>/.claude/commands/` and write the alias table.
///
/// A top-level `foo.md` maps to `/foo`; one directory of nesting maps to a
/// namespaced command, `gsd/progress.md` → `/gsd:progress` with alias
/// `gsd_progress`. Returns the number of rows written.
pub fn sync(project_dir: &Path, out_path: &Path) -> anyhow::Result<usize> {
    let commands_dir = project_dir.join(".claude").join("commands");
    if !commands_dir.is_dir() {
        anyhow::bail!("no commands directory at {}", commands_dir.display());
    }

    let mut entries: HashMap<String, SkillEntry> = HashMap::new();
    for (native, file) in command_files(&commands_dir)? {
        let alias = alias_for(&native);
        if !is_valid_name(&alias) {
            warn!(native, alias, "skipping command: alias not telegram-safe");
            continue;
        }
        if NATIVE_COMMANDS.contains(&alias.as_str()) {
            warn!(native, alias, "skipping command: alias shadows a native command");
            continue;
        }

        let contents = std::fs::read_to_string(&file)?;
        let description = parse_frontmatter(&contents)
            .map(|m| m.description)
            .unwrap_or_default();
        entries.insert(alias, SkillEntry { command: format!("/{native}"), description });
    }

    crate::persist::write_json(out_path, &entries)?;
    Ok(entries.len())
}

/// Collect `(native_name, path)` pairs, descending one directory level.
fn command_files(dir: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let Some(ns) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned)
            else {
                continue;
            };
            for nested in std::fs::read_dir(&path)? {
                let nested = nested?.path();
                if let Some(stem) = md_stem(&nested) {
                    found.push((format!("{ns}:{stem}"), nested));
                }
            }
        } else if let Some(stem) = md_stem(&path) {
            found.push((stem, path));
        }
    }
    found.sort();
    Ok(found)
}

fn md_stem(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("md") {
        return None;
    }
    path.file_stem().and_then(|s| s.to_str()).map(str::to_owned)
}

/// Derive the telegram-safe alias from a native command name.
fn alias_for(native: &str) -> String {
    native
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .collect()
}

/// Extract the YAML block between `---` delimiters, if present.
fn parse_frontmatter(contents: &str) -> Option<CommandMeta> {
    let rest = contents.strip_prefix("---")?;
    let end = rest.find("\n---")?;
    serde_yaml::from_str(&rest[..end]).ok()
}

#[cfg(test)]
#[path = "skills_tests.rs"]
mod tests;
