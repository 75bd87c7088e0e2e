// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-content-type notification filter.
//!
//! `notify.json` holds one boolean per mirrored content type so a user can
//! mute e.g. thinking or tool chatter. The file is created all-on when
//! missing. Interactive prompts and in-place pairing edits always go
//! through: muting a tool result would break the visual call/result pair.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::event::ContentType;

/// Content types the filter covers, in file order.
const FILTERABLE: &[ContentType] = &[
    ContentType::Text,
    ContentType::Thinking,
    ContentType::ToolUse,
    ContentType::ToolResult,
    ContentType::ToolError,
    ContentType::LocalCommand,
    ContentType::User,
];

#[derive(Debug)]
pub struct NotifyFilter {
    path: PathBuf,
    enabled: HashMap<ContentType, bool>,
}

impl NotifyFilter {
    /// Load the filter, creating the all-on default file if absent.
    pub fn load_or_create(path: PathBuf) -> anyhow::Result<Self> {
        let stored: Option<HashMap<String, bool>> = crate::persist::read_json(&path)?;
        let mut enabled = HashMap::new();
        match stored {
            Some(map) => {
                for ct in FILTERABLE {
                    enabled.insert(*ct, map.get(ct.as_str()).copied().unwrap_or(true));
                }
            }
            None => {
                for ct in FILTERABLE {
                    enabled.insert(*ct, true);
                }
                let default: HashMap<&str, bool> =
                    FILTERABLE.iter().map(|ct| (ct.as_str(), true)).collect();
                crate::persist::write_json(&path, &default)?;
            }
        }
        Ok(Self { path, enabled })
    }

    /// Whether a message of this type should be delivered.
    ///
    /// `has_pending_pair` marks a tool result that will edit an existing
    /// message; those bypass the filter, as do interactive prompts.
    pub fn allows(&self, content_type: ContentType, has_pending_pair: bool) -> bool {
        if content_type == ContentType::InteractivePrompt || has_pending_pair {
            return true;
        }
        self.enabled.get(&content_type).copied().unwrap_or(true)
    }

    pub fn set(&mut self, content_type: ContentType, on: bool) -> anyhow::Result<()> {
        self.enabled.insert(content_type, on);
        let stored: HashMap<&str, bool> =
            self.enabled.iter().map(|(ct, on)| (ct.as_str(), *on)).collect();
        crate::persist::write_json(&self.path, &stored)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
