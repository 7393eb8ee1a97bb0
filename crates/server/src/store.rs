// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable JSON state under the user's state directory.
//!
//! `screens.json` is the session registry: read once at startup, rewritten
//! whole on every mutation (dozens of records at most). Writes go through a
//! temp file + rename so a crash never leaves a half-written registry.
//! `state-inner.json` and `settings.json` are auxiliary files for TUI
//! readers; all parse failures degrade to empty state with a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SupervisorError};
use crate::session::Session;
use crate::tracker::{LoopSnapshot, Todo};

/// Checkpoint of one session's tracker state for external readers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerCheckpoint {
    #[serde(rename = "loop")]
    pub loop_state: Option<LoopSnapshot>,
    #[serde(default)]
    pub todos: Vec<Todo>,
}

/// User settings persisted across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_case: Option<String>,
}

/// File-backed store rooted at the state directory.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Open (and create) the state directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| SupervisorError::Persistence(e.to_string()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn sessions_path(&self) -> PathBuf {
        self.dir.join("screens.json")
    }

    fn inner_state_path(&self) -> PathBuf {
        self.dir.join("state-inner.json")
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.join("settings.json")
    }

    /// Load the session registry. Missing file → empty; malformed → warn +
    /// empty (the registry is rebuilt by reconciliation).
    pub fn load_sessions(&self) -> Vec<Session> {
        load_or_default(&self.sessions_path())
    }

    /// Replace the session registry on disk.
    pub fn save_sessions(&self, sessions: &[Session]) -> Result<()> {
        write_replace(&self.sessions_path(), sessions)
    }

    /// Load all tracker checkpoints.
    pub fn load_tracker_checkpoints(&self) -> HashMap<String, TrackerCheckpoint> {
        load_or_default(&self.inner_state_path())
    }

    /// Upsert one session's tracker checkpoint (read-modify-write).
    pub fn save_tracker_checkpoint(
        &self,
        session_id: &str,
        checkpoint: &TrackerCheckpoint,
    ) -> Result<()> {
        let mut all = self.load_tracker_checkpoints();
        all.insert(session_id.to_string(), checkpoint.clone());
        write_replace(&self.inner_state_path(), &all)
    }

    /// Remove a session's tracker checkpoint.
    pub fn remove_tracker_checkpoint(&self, session_id: &str) -> Result<()> {
        let mut all = self.load_tracker_checkpoints();
        if all.remove(session_id).is_some() {
            write_replace(&self.inner_state_path(), &all)?;
        }
        Ok(())
    }

    pub fn load_settings(&self) -> Settings {
        load_or_default(&self.settings_path())
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        write_replace(&self.settings_path(), settings)
    }
}

fn load_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), "state read failed: {e}");
            return T::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), "malformed state file, treating as empty: {e}");
            T::default()
        }
    }
}

/// Write-through replace: serialize to `<path>.tmp`, then rename into place.
fn write_replace<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| SupervisorError::Persistence(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| SupervisorError::Persistence(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| SupervisorError::Persistence(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
