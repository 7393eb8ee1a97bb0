// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Local supervisor for long-running AI-CLI terminal sessions.
#[derive(Debug, Clone, Parser)]
#[command(name = "claudeman", version, about)]
pub struct Config {
    /// Base URL advertised to children via CLAUDEMAN_API_URL.
    #[arg(long, env = "CLAUDEMAN_API_URL", default_value = "http://127.0.0.1:3001")]
    pub api_url: String,

    /// State directory (registry, settings, capture files).
    /// Defaults to ~/.claudeman.
    #[arg(long, env = "CLAUDEMAN_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Window name prefix for managed sessions.
    #[arg(long, env = "CLAUDEMAN_WINDOW_PREFIX", default_value = "cm-")]
    pub window_prefix: String,

    /// Per-session output history ring size in bytes.
    #[arg(long, env = "CLAUDEMAN_RING_SIZE", default_value = "102400")]
    pub ring_size: usize,

    /// Agent-mode command line (claude CLI).
    #[arg(
        long,
        env = "CLAUDEMAN_AGENT_CMD",
        default_value = "claude --dangerously-skip-permissions"
    )]
    pub agent_cmd: String,

    /// Process stats sampling interval in seconds (0 = disabled).
    #[arg(long, env = "CLAUDEMAN_STATS_INTERVAL", default_value = "2")]
    pub stats_interval: u64,

    /// Periodic reconcile interval in seconds (0 = startup only).
    #[arg(long, env = "CLAUDEMAN_RECONCILE_INTERVAL", default_value = "15")]
    pub reconcile_interval: u64,

    /// Disable tracker auto-enable for all sessions.
    #[arg(long, env = "CLAUDEMAN_NO_AUTO_ENABLE", default_value = "false")]
    pub no_auto_enable: bool,

    /// Log format (json or text).
    #[arg(long, env = "CLAUDEMAN_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CLAUDEMAN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ring_size == 0 {
            anyhow::bail!("--ring-size must be non-zero");
        }
        if self.window_prefix.is_empty()
            || !self.window_prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!("--window-prefix must be non-empty [A-Za-z0-9_-]");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    /// Resolved state directory (`--state-dir`, else `~/.claudeman`).
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".claudeman")
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        // Parse with no args so clap fills in every default/env value.
        Self::parse_from(["claudeman"])
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
