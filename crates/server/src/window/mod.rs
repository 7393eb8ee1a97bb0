// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin contract over the external terminal-multiplexer tool.
//!
//! The supervisor only ever talks to windows through [`WindowTool`]; the
//! production implementation shells out to GNU `screen`
//! ([`screen::ScreenTool`]), and tests use the in-memory fake in
//! `test_support`.

pub mod kill;
pub mod screen;

pub use kill::{KillOps, KillReport, KillStage};
pub use screen::ScreenTool;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Result, SupervisorError};

/// Maximum window-tool invocation time before the call is abandoned.
pub const TOOL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// A window visible to the multiplexer tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub pid: u32,
    pub name: String,
}

/// Request to create a detached named window running a shell command.
#[derive(Debug, Clone)]
pub struct CreateWindow {
    pub name: String,
    pub working_dir: PathBuf,
    /// Full shell command line (already composed with cd/export prefixes).
    pub command: String,
}

/// Abstraction over the external window tool.
///
/// Each call is independent and short-lived; implementations must bound
/// external invocations by [`TOOL_TIMEOUT`].
#[async_trait]
pub trait WindowTool: Send + Sync {
    /// True when the tool binary is present on this host.
    async fn available(&self) -> bool;

    /// Spawn a detached named window. Returns the multiplexer process pid.
    async fn create(&self, req: &CreateWindow) -> Result<u32>;

    /// Enumerate visible windows whose names start with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<WindowInfo>>;

    /// Inject a key sequence followed by Return (sent separately, retried).
    async fn send_keys(&self, name: &str, text: &str) -> Result<()>;

    /// Textual snapshot of the window's visible buffer, sanitized.
    async fn snapshot(&self, name: &str) -> Result<Vec<u8>>;

    /// Four-stage kill escalation; best-effort success with a warning when
    /// survivors remain after the final sweep.
    async fn kill(&self, name: &str, pid: u32) -> Result<KillReport>;

    /// Liveness probe (signal 0).
    fn alive(&self, pid: u32) -> bool;

    /// Path of the capture file the window's output is logged to.
    fn capture_path(&self, name: &str) -> PathBuf;
}

/// Validate a window name against the strict allowlist `[A-Za-z0-9._-]`,
/// 1–64 characters.
pub fn validate_window_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(SupervisorError::Validation {
            what: "window name",
            detail: format!("length {} outside 1..=64", name.len()),
        });
    }
    if let Some(bad) =
        name.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(SupervisorError::Validation {
            what: "window name",
            detail: format!("character {bad:?} not allowed"),
        });
    }
    Ok(())
}

/// Validate a working directory path: absolute, no shell metacharacters.
pub fn validate_working_dir(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(SupervisorError::Validation {
            what: "working directory",
            detail: format!("{} is not absolute", path.display()),
        });
    }
    let text = path.to_string_lossy();
    if let Some(bad) =
        text.chars().find(|c| matches!(c, ';' | '|' | '&' | '$' | '`' | '\'' | '"' | '\n' | '<' | '>'))
    {
        return Err(SupervisorError::Validation {
            what: "working directory",
            detail: format!("shell metacharacter {bad:?} not allowed"),
        });
    }
    Ok(())
}

/// Emoji → ASCII substitutions applied to snapshots, for tools known to
/// mangle multibyte sequences. Non-exhaustive.
const EMOJI_SUBST: &[(char, &str)] = &[
    ('✅', "[ok]"),
    ('❌', "[x]"),
    ('⚠', "[!]"),
    ('☐', "[ ]"),
    ('☒', "[x]"),
    ('◐', "[~]"),
    ('✔', "[v]"),
    ('🔄', "[~]"),
    ('⏺', "*"),
    ('●', "*"),
    ('○', "o"),
    ('→', "->"),
    ('…', "..."),
];

/// Sanitize a raw snapshot: lossy-decode UTF-8, drop replacement characters
/// and C0 controls except `\t \n \r`, and substitute known emoji.
pub fn sanitize_snapshot(raw: &[u8], substitute_emoji: bool) -> Vec<u8> {
    let text = String::from_utf8_lossy(raw);
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\u{fffd}' {
            continue;
        }
        if c.is_control() && !matches!(c, '\t' | '\n' | '\r') {
            continue;
        }
        if substitute_emoji {
            if let Some((_, sub)) = EMOJI_SUBST.iter().find(|(e, _)| *e == c) {
                out.push_str(sub);
                continue;
            }
        }
        out.push(c);
    }
    out.into_bytes()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
