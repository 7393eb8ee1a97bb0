// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GNU `screen` implementation of [`WindowTool`].
//!
//! Windows are detached `screen` sessions created with `-dmS`. Output
//! capture uses screen's `-L -Logfile` flags so the supervisor's reader task
//! can tail a per-window file instead of polling hardcopies.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{kill as nix_kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, SupervisorError};
use crate::stats::{descendants_leaf_first, parse_pid_table};

use super::kill::{escalate, KillOps, KillReport, KillSignal};
use super::{
    sanitize_snapshot, validate_window_name, validate_working_dir, CreateWindow, WindowInfo,
    WindowTool, TOOL_TIMEOUT,
};

/// Grace period for the created window to appear in `screen -ls`.
const CREATE_GRACE: Duration = Duration::from_secs(2);
/// Poll interval while waiting for the window to appear.
const CREATE_POLL: Duration = Duration::from_millis(100);
/// Pause between the text payload and the Return keystroke.
const RETURN_DELAY: Duration = Duration::from_millis(100);
/// Back-off schedule for Return injection retries.
const RETURN_BACKOFF: [Duration; 3] =
    [Duration::from_millis(150), Duration::from_millis(300), Duration::from_millis(600)];

/// Production [`WindowTool`] backed by GNU `screen`.
pub struct ScreenTool {
    capture_dir: PathBuf,
    substitute_emoji: bool,
    available: OnceLock<bool>,
}

impl ScreenTool {
    /// Create a tool writing capture files under `capture_dir`.
    pub fn new(capture_dir: impl Into<PathBuf>) -> Self {
        Self { capture_dir: capture_dir.into(), substitute_emoji: true, available: OnceLock::new() }
    }

    /// Disable the emoji→ASCII substitution in snapshots (for hosts whose
    /// `screen` build passes multibyte sequences through cleanly).
    pub fn without_emoji_substitution(mut self) -> Self {
        self.substitute_emoji = false;
        self
    }

    fn probe_available(&self) -> bool {
        *self.available.get_or_init(|| {
            std::process::Command::new("screen")
                .arg("-v")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok()
        })
    }

    /// Run `screen` with the given args, tolerating non-zero exit.
    async fn run_screen(&self, args: &[&str]) -> Result<(bool, String)> {
        let result = tokio::time::timeout(
            TOOL_TIMEOUT,
            Command::new("screen").args(args).stdin(Stdio::null()).output(),
        )
        .await;
        match result {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok((output.status.success(), text))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SupervisorError::Unavailable("screen binary not found".into()))
            }
            Ok(Err(e)) => Err(SupervisorError::Internal(format!("screen invocation failed: {e}"))),
            Err(_) => {
                Err(SupervisorError::Internal(format!("screen {args:?} exceeded {TOOL_TIMEOUT:?}")))
            }
        }
    }

    async fn find_window(&self, name: &str) -> Result<Option<WindowInfo>> {
        Ok(self.list(name).await?.into_iter().find(|w| w.name == name))
    }
}

/// Parse `screen -ls` output lines of the form `\t<pid>.<name>\t(...)`.
pub fn parse_screen_list(text: &str, prefix: &str) -> Vec<WindowInfo> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim_start();
        // Session entries start with "<pid>.<name>"; headers/footers don't.
        let Some(entry) = line.split_whitespace().next() else { continue };
        let Some((pid, name)) = entry.split_once('.') else { continue };
        let Ok(pid) = pid.parse::<u32>() else { continue };
        if name.starts_with(prefix) {
            out.push(WindowInfo { pid, name: name.to_string() });
        }
    }
    out
}

#[async_trait]
impl WindowTool for ScreenTool {
    async fn available(&self) -> bool {
        self.probe_available()
    }

    async fn create(&self, req: &CreateWindow) -> Result<u32> {
        validate_window_name(&req.name)?;
        validate_working_dir(&req.working_dir)?;
        if !self.probe_available() {
            return Err(SupervisorError::Unavailable("screen binary not found".into()));
        }
        std::fs::create_dir_all(&self.capture_dir)
            .map_err(|e| SupervisorError::Persistence(e.to_string()))?;

        let capture = self.capture_path(&req.name);
        let capture_arg = capture.to_string_lossy().into_owned();
        let (ok, output) = self
            .run_screen(&[
                "-dmS",
                &req.name,
                "-L",
                "-Logfile",
                &capture_arg,
                "sh",
                "-c",
                &req.command,
            ])
            .await?;
        if !ok {
            return Err(SupervisorError::WindowCreate {
                name: req.name.clone(),
                detail: output.trim().to_string(),
            });
        }

        // screen -dmS returns before the session registers; poll the list
        // for the grace period to resolve the multiplexer pid.
        let deadline = tokio::time::Instant::now() + CREATE_GRACE;
        loop {
            if let Some(info) = self.find_window(&req.name).await? {
                debug!(name = %req.name, pid = info.pid, "window created");
                return Ok(info.pid);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SupervisorError::WindowCreate {
                    name: req.name.clone(),
                    detail: "window did not appear within grace period".into(),
                });
            }
            tokio::time::sleep(CREATE_POLL).await;
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<WindowInfo>> {
        if !self.probe_available() {
            return Err(SupervisorError::Unavailable("screen binary not found".into()));
        }
        // `screen -ls` exits non-zero when no sessions exist; parse anyway.
        let (_, output) = self.run_screen(&["-ls"]).await?;
        Ok(parse_screen_list(&output, prefix))
    }

    async fn send_keys(&self, name: &str, text: &str) -> Result<()> {
        validate_window_name(name)?;
        let (ok, _) = self.run_screen(&["-S", name, "-p", "0", "-X", "stuff", text]).await?;
        if !ok {
            return Err(SupervisorError::Inject { name: name.to_string(), attempts: 0 });
        }
        debug!(name, bytes = text.len(), "injected payload");
        tokio::time::sleep(RETURN_DELAY).await;

        // Return is injected separately and retried with back-off: screen
        // occasionally drops the terminator when the child is mid-redraw.
        let mut attempts = 0u32;
        for backoff in RETURN_BACKOFF {
            attempts += 1;
            let (ok, _) = self.run_screen(&["-S", name, "-p", "0", "-X", "stuff", "\r"]).await?;
            if ok {
                return Ok(());
            }
            tokio::time::sleep(backoff).await;
        }
        Err(SupervisorError::Inject { name: name.to_string(), attempts })
    }

    async fn snapshot(&self, name: &str) -> Result<Vec<u8>> {
        validate_window_name(name)?;
        std::fs::create_dir_all(&self.capture_dir)
            .map_err(|e| SupervisorError::Persistence(e.to_string()))?;
        let tmp = self.capture_dir.join(format!(".{name}.hardcopy"));
        let tmp_arg = tmp.to_string_lossy().into_owned();

        let (ok, output) =
            self.run_screen(&["-S", name, "-p", "0", "-X", "hardcopy", &tmp_arg]).await?;
        if !ok {
            return Err(SupervisorError::Internal(format!(
                "hardcopy failed for {name}: {}",
                output.trim()
            )));
        }
        let raw = std::fs::read(&tmp).unwrap_or_default();
        let _ = std::fs::remove_file(&tmp);
        Ok(sanitize_snapshot(&raw, self.substitute_emoji))
    }

    async fn kill(&self, name: &str, pid: u32) -> Result<KillReport> {
        validate_window_name(name)?;
        let ops = ScreenKillOps { tool: self };
        let report = escalate(&ops, name, pid).await;
        if !report.clean {
            warn!(name, pid, survivors = ?report.survivors, "kill returned best-effort");
        }
        Ok(report)
    }

    fn alive(&self, pid: u32) -> bool {
        pid_alive(pid)
    }

    fn capture_path(&self, name: &str) -> PathBuf {
        self.capture_dir.join(format!("{name}.log"))
    }
}

/// Signal-0 liveness probe.
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    nix_kill(Pid::from_raw(pid), None).is_ok()
}

struct ScreenKillOps<'a> {
    tool: &'a ScreenTool,
}

#[async_trait]
impl KillOps for ScreenKillOps<'_> {
    fn descendants(&self, pid: u32) -> Vec<u32> {
        let Ok(output) = std::process::Command::new("ps")
            .args(["-Ao", "pid=,ppid="])
            .stdin(Stdio::null())
            .output()
        else {
            return vec![];
        };
        let table = parse_pid_table(&String::from_utf8_lossy(&output.stdout));
        descendants_leaf_first(&table, pid)
    }

    fn signal(&self, pid: u32, sig: KillSignal) -> bool {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        let sig = match sig {
            KillSignal::Term => Signal::SIGTERM,
            KillSignal::Kill => Signal::SIGKILL,
        };
        nix_kill(Pid::from_raw(pid), sig).is_ok()
    }

    async fn quit_window(&self, name: &str) -> bool {
        matches!(self.tool.run_screen(&["-S", name, "-X", "quit"]).await, Ok((true, _)))
    }

    fn alive(&self, pid: u32) -> bool {
        pid_alive(pid)
    }
}

#[cfg(test)]
#[path = "screen_tests.rs"]
mod tests;
