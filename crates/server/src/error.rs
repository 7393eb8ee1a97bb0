// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Error taxonomy for the supervisor core, classified by cause.
///
/// External consumers map each variant to a wire code via
/// [`SupervisorError::code`]; callers inside the crate match on the variant
/// (or ask [`SupervisorError::is_transient`]) to pick a degradation path.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A caller-supplied value failed validation (window name, path, enum).
    #[error("invalid {what}: {detail}")]
    Validation { what: &'static str, detail: String },

    /// The window tool or an OS process query is missing on this host.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The window tool exited non-zero (or timed out) while creating a window.
    #[error("window create failed for {name}: {detail}")]
    WindowCreate { name: String, detail: String },

    /// Keystroke injection retries were exhausted.
    #[error("keystroke injection into {name} failed after {attempts} attempts")]
    Inject { name: String, attempts: u32 },

    /// Malformed status block, registry file, or `@fix_plan.md`.
    #[error("parse error: {0}")]
    Parse(String),

    /// The registry file could not be written.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Invariant violation inside the supervisor itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    /// Wire-format code for this error class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::WindowCreate { .. } => "WINDOW_CREATE",
            Self::Inject { .. } => "INJECT",
            Self::Parse(_) => "PARSE",
            Self::Persistence(_) => "PERSISTENCE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// True when the respawn controller should treat this as transient and
    /// return to watching after a cool-down instead of stopping.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Inject { .. } | Self::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
