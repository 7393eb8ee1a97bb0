// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end supervisor flows.
//!
//! Drives the public library API against the in-memory fake window tool:
//! the same reader, dispatcher, tracker, and respawn paths as production,
//! minus the external `screen` binary.

use std::sync::Arc;
use std::time::Duration;

use claudeman::event::SupervisorEvent;
use claudeman::session::{CreateSession, Session, SessionMode};
use claudeman::store::Store;
use claudeman::supervisor::{Supervisor, SupervisorConfig};
use claudeman::test_support::FakeWindowTool;
use claudeman::window::WindowTool;
use tokio::sync::broadcast;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// One supervisor over a temp state dir and a fake window tool.
pub struct World {
    pub supervisor: Supervisor,
    pub tool: Arc<FakeWindowTool>,
    pub store: Store,
    dir: tempfile::TempDir,
}

impl World {
    pub fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let tool = Arc::new(FakeWindowTool::new(dir.path().join("capture")));
        let store = Store::open(dir.path().join("state"))
            .map_err(|e| anyhow::anyhow!("store open failed: {e}"))?;
        let config = SupervisorConfig {
            window_prefix: "cm-".to_string(),
            ring_size: 16 * 1024,
            api_url: "http://127.0.0.1:3001".to_string(),
            agent_cmd: "claude --dangerously-skip-permissions".to_string(),
            auto_enable: true,
        };
        let supervisor =
            Supervisor::new(config, Arc::clone(&tool) as Arc<dyn WindowTool>, store.clone());
        Ok(Self { supervisor, tool, store, dir })
    }

    /// A fresh supervisor over the same store and tool (server restart).
    pub fn restart(&self) -> Supervisor {
        let config = SupervisorConfig {
            window_prefix: "cm-".to_string(),
            ring_size: 16 * 1024,
            api_url: "http://127.0.0.1:3001".to_string(),
            agent_cmd: "claude --dangerously-skip-permissions".to_string(),
            auto_enable: true,
        };
        Supervisor::new(
            config,
            Arc::clone(&self.tool) as Arc<dyn WindowTool>,
            self.store.clone(),
        )
    }

    pub fn workdir(&self) -> std::path::PathBuf {
        self.dir.path().to_path_buf()
    }

    pub async fn agent_session(&self) -> anyhow::Result<Session> {
        self.supervisor
            .create_session(CreateSession::new(self.workdir(), SessionMode::Agent))
            .await
            .map_err(|e| anyhow::anyhow!("create failed: {e}"))
    }

    /// Feed child output through the window capture path.
    pub fn child_says(&self, session: &Session, text: &str) {
        self.tool.emit_output(&session.window_name, text.as_bytes());
    }
}

/// Receive events until one matches, failing after [`EVENT_TIMEOUT`].
pub async fn wait_event<F: Fn(&SupervisorEvent) -> bool>(
    rx: &mut broadcast::Receiver<SupervisorEvent>,
    pred: F,
) -> anyhow::Result<SupervisorEvent> {
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, rx.recv()).await??;
        if pred(&event) {
            return Ok(event);
        }
    }
}
