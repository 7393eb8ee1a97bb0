// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Session entity: the supervisor's durable record for one window.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::respawn::RespawnConfig;

/// What the window runs: an agent CLI or a plain shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Agent,
    Shell,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Shell => "shell",
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One supervised window. Serialized as-is into `screens.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque unique id (UUID, or `restored-<suffix>` for adopted windows).
    pub id: String,
    /// Derived window name: prefix + id prefix. Unique across restarts.
    pub window_name: String,
    /// Pid of the window-managing process (not the child). Updated on
    /// reconcile.
    pub pid: u32,
    /// Creation time, epoch milliseconds.
    pub created_at: u64,
    pub working_dir: PathBuf,
    pub mode: SessionMode,
    /// True when the window was alive at the last liveness check.
    pub attached: bool,
    /// Human-editable display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respawn_config: Option<RespawnConfig>,
    #[serde(default)]
    pub ralph_enabled: bool,
}

/// Request to create a new session.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub working_dir: PathBuf,
    pub mode: SessionMode,
    pub name: Option<String>,
    pub nice: Option<i32>,
}

impl CreateSession {
    pub fn new(working_dir: impl Into<PathBuf>, mode: SessionMode) -> Self {
        Self { working_dir: working_dir.into(), mode, name: None, nice: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_nice(mut self, nice: i32) -> Self {
        self.nice = Some(nice);
        self
    }
}

/// Derive the window name for a session id: the fixed prefix plus the first
/// eight id characters.
pub fn window_name_for(prefix: &str, id: &str) -> String {
    let suffix: String = id.chars().take(8).collect();
    format!("{prefix}{suffix}")
}

/// Current time as epoch milliseconds.
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Inputs for composing the shell command line a window runs.
#[derive(Debug, Clone)]
pub struct CommandSpec<'a> {
    pub session_id: &'a str,
    pub window_name: &'a str,
    pub working_dir: &'a Path,
    pub mode: SessionMode,
    pub api_url: &'a str,
    pub agent_cmd: &'a str,
    pub nice: Option<i32>,
    /// Extra PATH entries prepended before the child resolves its command.
    pub path_prepend: Option<&'a str>,
}

/// Compose the full command line per the child-invocation contract:
/// `cd` into the working directory, export the four CLAUDEMAN variables,
/// then exec the mode's command (optionally under `nice`).
pub fn compose_command(spec: &CommandSpec<'_>) -> String {
    let mut parts = vec![format!("cd \"{}\"", spec.working_dir.display())];

    if let Some(prepend) = spec.path_prepend {
        parts.push(format!("export PATH={prepend}:$PATH"));
    }

    parts.push(format!(
        "export CLAUDEMAN_SCREEN=1 CLAUDEMAN_SESSION_ID={} CLAUDEMAN_SCREEN_NAME={} CLAUDEMAN_API_URL={}",
        spec.session_id, spec.window_name, spec.api_url
    ));

    let cmd = match spec.mode {
        SessionMode::Agent => spec.agent_cmd.to_string(),
        SessionMode::Shell => std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string()),
    };
    let cmd = match spec.nice {
        Some(nice) => format!("nice -n {} {cmd}", nice.clamp(-20, 19)),
        None => cmd,
    };
    parts.push(cmd);

    parts.join(" && ")
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
