// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test fixtures: an in-memory [`WindowTool`] fake that maintains a
//! windows map, records injected keystrokes in order, simulates alive/dead,
//! and writes capture files so the real reader path is exercised.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Result, SupervisorError};
use crate::window::kill::{KillReport, KillStage};
use crate::window::{sanitize_snapshot, validate_window_name, CreateWindow, WindowInfo, WindowTool};

/// One simulated window.
#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub pid: u32,
    pub alive: bool,
    pub command: String,
    pub sent_keys: Vec<String>,
    pub kill_requested: bool,
}

/// In-memory [`WindowTool`] implementation for tests.
pub struct FakeWindowTool {
    windows: Mutex<HashMap<String, FakeWindow>>,
    next_pid: AtomicU32,
    capture_dir: PathBuf,
    pub available: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_send_keys: AtomicBool,
    /// Make `send_keys` fail with a non-transient error class.
    pub fail_send_keys_fatal: AtomicBool,
}

impl FakeWindowTool {
    pub fn new(capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            next_pid: AtomicU32::new(40_000),
            capture_dir: capture_dir.into(),
            available: AtomicBool::new(true),
            fail_create: AtomicBool::new(false),
            fail_send_keys: AtomicBool::new(false),
            fail_send_keys_fatal: AtomicBool::new(false),
        }
    }

    /// Append bytes to a window's capture file, as the real multiplexer's
    /// logging would.
    pub fn emit_output(&self, name: &str, bytes: &[u8]) {
        let path = self.capture_path(name);
        if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            let _ = file.write_all(bytes);
            let _ = file.flush();
        }
    }

    /// Snapshot of a window's record.
    pub fn window(&self, name: &str) -> Option<FakeWindow> {
        self.windows.lock().get(name).cloned()
    }

    /// Ordered log of keystroke payloads injected into a window.
    pub fn sent_keys(&self, name: &str) -> Vec<String> {
        self.windows.lock().get(name).map(|w| w.sent_keys.clone()).unwrap_or_default()
    }

    /// Simulate the window dying out-of-band.
    pub fn mark_dead(&self, name: &str) {
        if let Some(window) = self.windows.lock().get_mut(name) {
            window.alive = false;
        }
    }

    /// Register a pre-existing window (for adoption/discovery tests).
    pub fn add_orphan(&self, name: &str) -> u32 {
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        self.windows.lock().insert(
            name.to_string(),
            FakeWindow {
                pid,
                alive: true,
                command: String::new(),
                sent_keys: vec![],
                kill_requested: false,
            },
        );
        pid
    }

    pub fn window_count(&self) -> usize {
        self.windows.lock().len()
    }
}

#[async_trait]
impl WindowTool for FakeWindowTool {
    async fn available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    async fn create(&self, req: &CreateWindow) -> Result<u32> {
        validate_window_name(&req.name)?;
        if !self.available.load(Ordering::Relaxed) {
            return Err(SupervisorError::Unavailable("window tool not installed".into()));
        }
        if self.fail_create.load(Ordering::Relaxed) {
            return Err(SupervisorError::WindowCreate {
                name: req.name.clone(),
                detail: "scripted failure".into(),
            });
        }
        std::fs::create_dir_all(&self.capture_dir)
            .map_err(|e| SupervisorError::Persistence(e.to_string()))?;
        // Touch the capture file so reader tasks find it immediately.
        let _ = std::fs::write(self.capture_path(&req.name), b"");

        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        self.windows.lock().insert(
            req.name.clone(),
            FakeWindow {
                pid,
                alive: true,
                command: req.command.clone(),
                sent_keys: vec![],
                kill_requested: false,
            },
        );
        Ok(pid)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<WindowInfo>> {
        if !self.available.load(Ordering::Relaxed) {
            return Err(SupervisorError::Unavailable("window tool not installed".into()));
        }
        let windows = self.windows.lock();
        let mut out: Vec<WindowInfo> = windows
            .iter()
            .filter(|(name, w)| w.alive && name.starts_with(prefix))
            .map(|(name, w)| WindowInfo { pid: w.pid, name: name.clone() })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn send_keys(&self, name: &str, text: &str) -> Result<()> {
        if self.fail_send_keys_fatal.load(Ordering::Relaxed) {
            return Err(SupervisorError::Validation {
                what: "window name",
                detail: format!("{name} rejected by script"),
            });
        }
        if self.fail_send_keys.load(Ordering::Relaxed) {
            return Err(SupervisorError::Inject { name: name.to_string(), attempts: 3 });
        }
        let mut windows = self.windows.lock();
        match windows.get_mut(name) {
            Some(window) if window.alive => {
                window.sent_keys.push(text.to_string());
                Ok(())
            }
            _ => Err(SupervisorError::Inject { name: name.to_string(), attempts: 1 }),
        }
    }

    async fn snapshot(&self, name: &str) -> Result<Vec<u8>> {
        let raw = std::fs::read(self.capture_path(name)).unwrap_or_default();
        Ok(sanitize_snapshot(&raw, false))
    }

    async fn kill(&self, name: &str, pid: u32) -> Result<KillReport> {
        let mut windows = self.windows.lock();
        if let Some(window) = windows.get_mut(name) {
            window.alive = false;
            window.kill_requested = true;
        }
        let _ = pid;
        Ok(KillReport { stages_run: vec![KillStage::TermDescendants], clean: true, survivors: vec![] })
    }

    fn alive(&self, pid: u32) -> bool {
        self.windows.lock().values().any(|w| w.pid == pid && w.alive)
    }

    fn capture_path(&self, name: &str) -> PathBuf {
        self.capture_dir.join(format!("{name}.log"))
    }
}
