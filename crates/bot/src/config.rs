// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Telegram-to-tmux bridge for AI coding agents.
#[derive(Debug, Clone, Parser)]
#[command(name = "ccbot", version, about)]
pub struct Config {
    /// Telegram bot token.
    #[arg(long, env = "CCBOT_TOKEN")]
    pub token: Option<String>,

    /// Comma-separated numeric Telegram user IDs allowed to use the bridge.
    /// Everyone else is rejected silently.
    #[arg(long, env = "CCBOT_ALLOWED_USERS")]
    pub allowed_users: Option<String>,

    /// Directory for persistent state files.
    #[arg(long, env = "CCBOT_CONFIG_DIR", default_value = "~/.ccbot")]
    pub config_dir: String,

    /// tmux session hosting all agent windows.
    #[arg(long, env = "CCBOT_TMUX_SESSION", default_value = "ccbot")]
    pub tmux_session: String,

    /// Command started in each new agent window.
    #[arg(long, env = "CCBOT_AGENT_COMMAND", default_value = "claude")]
    pub agent_command: String,

    /// Transcript monitor tick in seconds.
    #[arg(long, env = "CCBOT_POLL_INTERVAL", default_value = "2.0")]
    pub poll_interval: f64,

    /// Pane status poll tick in seconds.
    #[arg(long, env = "CCBOT_STATUS_POLL_INTERVAL", default_value = "1.0")]
    pub status_poll_interval: f64,

    /// Log format (json or text).
    #[arg(long, env = "CCBOT_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CCBOT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration for `run` mode.
    ///
    /// Subcommands (`hook`, `sync`) have their own, smaller requirements and
    /// skip this.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("CCBOT_TOKEN is required");
        }
        let users = self.allowed_user_ids()?;
        if users.is_empty() {
            anyhow::bail!("CCBOT_ALLOWED_USERS must list at least one numeric user id");
        }
        if self.poll_interval <= 0.0 || self.status_poll_interval <= 0.0 {
            anyhow::bail!("poll intervals must be positive");
        }
        Ok(())
    }

    /// Parse the allowlist into numeric IDs. Empty input yields an empty list.
    pub fn allowed_user_ids(&self) -> anyhow::Result<Vec<u64>> {
        let raw = self.allowed_users.as_deref().unwrap_or("");
        let mut ids = Vec::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let id: u64 = part
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid user id in allowlist: {part}"))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// The state directory with `~` expanded against `$HOME`.
    pub fn config_dir(&self) -> PathBuf {
        expand_home(&self.config_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        self.config_dir().join("state.json")
    }

    pub fn session_map_path(&self) -> PathBuf {
        self.config_dir().join("session_map.json")
    }

    pub fn monitor_state_path(&self) -> PathBuf {
        self.config_dir().join("monitor_state.json")
    }

    pub fn skills_path(&self) -> PathBuf {
        self.config_dir().join("skills.json")
    }

    pub fn notify_path(&self) -> PathBuf {
        self.config_dir().join("notify.json")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.status_poll_interval)
    }
}

/// Apply dotenv files first-wins: the process environment beats `./.env`,
/// which beats `<config_dir>/.env`. `dotenvy` never overrides variables that
/// are already set, so load order is priority order.
pub fn load_dotenv() {
    let _ = dotenvy::from_path("./.env");
    if let Ok(raw_dir) = std::env::var("CCBOT_CONFIG_DIR") {
        let _ = dotenvy::from_path(expand_home(&raw_dir).join(".env"));
    } else {
        let _ = dotenvy::from_path(expand_home("~/.ccbot").join(".env"));
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_owned());
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(raw)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
