// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer-facing event vocabulary.
//!
//! Every observable change in the supervisor is broadcast as a
//! [`SupervisorEvent`] on a single channel; transports (HTTP/SSE, TUI)
//! subscribe and serialize using the wire names below.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::respawn::RespawnEvent;
use crate::stats::ProcessStats;
use crate::tracker::TrackerEvent;

/// Cooperative callback events a managed child may POST back to the server
/// (`{event, sessionId}` to `/api/hook-event`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEventKind {
    IdlePrompt,
    PermissionPrompt,
    Stop,
}

impl HookEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdlePrompt => "idle_prompt",
            Self::PermissionPrompt => "permission_prompt",
            Self::Stop => "stop",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "idle_prompt" => Some(Self::IdlePrompt),
            "permission_prompt" => Some(Self::PermissionPrompt),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }
}

impl std::fmt::Display for HookEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON body of a hook callback POST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEventBody {
    pub event: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Everything the supervisor broadcasts to subscribers.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    SessionCreated { id: String },
    SessionDeleted { id: String },
    SessionRenamed { id: String, name: String },
    /// A chunk of captured output (also delivered per-session via the
    /// dispatcher; included here for single-channel consumers).
    SessionTerminal { id: String, data: Bytes },
    SessionClearTerminal { id: String },
    SessionExit { id: String },
    SessionIdle { id: String },
    SessionWorking { id: String },
    SessionCompletion { id: String, cost: Option<f64> },
    SessionError { id: String, error: String },
    SessionAutoClear { id: String },
    SessionDiscovered { id: String },
    ScreenCreated { id: String },
    ScreenKilled { id: String },
    ScreenDied { id: String },
    ScreenStatsUpdated { id: String, stats: ProcessStats },
    Respawn { id: String, event: RespawnEvent },
    Tracker { id: String, event: TrackerEvent },
}

impl SupervisorEvent {
    /// The wire-format event name used by SSE/TUI consumers.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session:created",
            Self::SessionDeleted { .. } => "session:deleted",
            Self::SessionRenamed { .. } => "session:renamed",
            Self::SessionTerminal { .. } => "session:terminal",
            Self::SessionClearTerminal { .. } => "session:clearTerminal",
            Self::SessionExit { .. } => "session:exit",
            Self::SessionIdle { .. } => "session:idle",
            Self::SessionWorking { .. } => "session:working",
            Self::SessionCompletion { .. } => "session:completion",
            Self::SessionError { .. } => "session:error",
            Self::SessionAutoClear { .. } => "session:autoClear",
            Self::SessionDiscovered { .. } => "session:discovered",
            Self::ScreenCreated { .. } => "screen:created",
            Self::ScreenKilled { .. } => "screen:killed",
            Self::ScreenDied { .. } => "screen:died",
            Self::ScreenStatsUpdated { .. } => "screen:statsUpdated",
            Self::Respawn { event, .. } => event.wire_name(),
            Self::Tracker { event, .. } => event.wire_name(),
        }
    }

    /// The session this event concerns.
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionCreated { id }
            | Self::SessionDeleted { id }
            | Self::SessionRenamed { id, .. }
            | Self::SessionTerminal { id, .. }
            | Self::SessionClearTerminal { id }
            | Self::SessionExit { id }
            | Self::SessionIdle { id }
            | Self::SessionWorking { id }
            | Self::SessionCompletion { id, .. }
            | Self::SessionError { id, .. }
            | Self::SessionAutoClear { id }
            | Self::SessionDiscovered { id }
            | Self::ScreenCreated { id }
            | Self::ScreenKilled { id }
            | Self::ScreenDied { id }
            | Self::ScreenStatsUpdated { id, .. }
            | Self::Respawn { id, .. }
            | Self::Tracker { id, .. } => id,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
