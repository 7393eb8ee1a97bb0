// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Respawn controller: the per-session state machine that watches tracker
//! events, idle time, and token thresholds, and drives a scripted
//! context-refresh sequence into the child without killing it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::{SessionChunk, Subscription};
use crate::error::Result;
use crate::event::SupervisorEvent;
use crate::session::epoch_ms;
use crate::tracker::TrackerEvent;
use crate::window::WindowTool;

fn default_idle_timeout_ms() -> u64 {
    5_000
}

fn default_inter_step_delay_ms() -> u64 {
    1_000
}

fn default_breaker_cooldown_ms() -> u64 {
    60_000
}

/// Token-threshold auto-clear settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoClear {
    pub enabled: bool,
    /// Total-token threshold that enqueues an auto-clear refresh.
    pub threshold: u64,
}

/// Persisted per-session respawn configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespawnConfig {
    /// Prompt text typed at the start of each refresh sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_prompt: Option<String>,
    /// Send `/clear` during the refresh sequence.
    #[serde(default)]
    pub send_clear: bool,
    /// Send `/init` during the refresh sequence.
    #[serde(default)]
    pub send_init: bool,
    /// Extra wait inserted at the end of the sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_ms: Option<u64>,
    /// No output from the child for this long counts as idle.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_inter_step_delay_ms")]
    pub inter_step_delay_ms: u64,
    /// Pause after the circuit breaker opens.
    #[serde(default = "default_breaker_cooldown_ms")]
    pub breaker_cooldown_ms: u64,
    /// Stop watching after this long, regardless of progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_clear: Option<AutoClear>,
}

impl Default for RespawnConfig {
    fn default() -> Self {
        Self {
            update_prompt: None,
            send_clear: false,
            send_init: false,
            wait_ms: None,
            idle_timeout_ms: default_idle_timeout_ms(),
            inter_step_delay_ms: default_inter_step_delay_ms(),
            breaker_cooldown_ms: default_breaker_cooldown_ms(),
            duration_minutes: None,
            auto_clear: None,
        }
    }
}

impl RespawnConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn inter_step_delay(&self) -> Duration {
        Duration::from_millis(self.inter_step_delay_ms)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_millis(self.breaker_cooldown_ms)
    }
}

/// Controller states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RespawnState {
    #[default]
    Stopped,
    Watching,
    IdleDetected,
    Refreshing,
    CoolingDown,
    Completed,
}

impl RespawnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Watching => "WATCHING",
            Self::IdleDetected => "IDLE_DETECTED",
            Self::Refreshing => "REFRESHING",
            Self::CoolingDown => "COOLING_DOWN",
            Self::Completed => "COMPLETED",
        }
    }
}

/// Live controller status, shared with API readers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespawnStatus {
    pub state: RespawnState,
    pub cycle_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<u64>,
}

/// Events the controller emits (wrapped into [`SupervisorEvent::Respawn`]).
#[derive(Debug, Clone, PartialEq)]
pub enum RespawnEvent {
    Started,
    Stopped,
    StateChanged { from: RespawnState, to: RespawnState },
    CycleStarted { cycle: u32 },
    StepSent { step: String },
    TimerStarted { kind: &'static str, duration_ms: u64 },
}

impl RespawnEvent {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Started => "respawn:started",
            Self::Stopped => "respawn:stopped",
            Self::StateChanged { .. } => "respawn:stateChanged",
            Self::CycleStarted { .. } => "respawn:cycleStarted",
            Self::StepSent { .. } => "respawn:stepSent",
            Self::TimerStarted { .. } => "respawn:timerStarted",
        }
    }
}

/// One step of the scripted refresh sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshStep {
    Keys(String),
    Wait(Duration),
}

/// Compose the refresh sequence for one cycle.
///
/// Order: update prompt, `/clear` (always included for an auto-clear
/// cycle), `/init`, optional wait.
pub fn build_refresh_steps(config: &RespawnConfig, auto_clear: bool) -> Vec<RefreshStep> {
    let mut steps = Vec::new();
    if let Some(ref prompt) = config.update_prompt {
        if !prompt.is_empty() {
            steps.push(RefreshStep::Keys(prompt.clone()));
        }
    }
    if config.send_clear || auto_clear {
        steps.push(RefreshStep::Keys("/clear".to_string()));
    }
    if config.send_init {
        steps.push(RefreshStep::Keys("/init".to_string()));
    }
    if let Some(wait_ms) = config.wait_ms {
        if wait_ms > 0 {
            steps.push(RefreshStep::Wait(Duration::from_millis(wait_ms)));
        }
    }
    steps
}

/// Control-plane commands for a running controller.
#[derive(Debug)]
pub enum RespawnCommand {
    Stop,
    UpdateConfig(RespawnConfig),
    /// Token accounting crossed the auto-clear threshold.
    TokensCrossed,
    /// External idle signal (child's `idle_prompt` hook callback).
    ExternalIdle,
}

/// Per-session respawn controller task.
pub struct RespawnController {
    session_id: String,
    window_name: String,
    config: RespawnConfig,
    tool: Arc<dyn WindowTool>,
    tracker_rx: broadcast::Receiver<TrackerEvent>,
    output_rx: Option<Subscription>,
    control_rx: mpsc::Receiver<RespawnCommand>,
    events_tx: broadcast::Sender<SupervisorEvent>,
    status: Arc<Mutex<RespawnStatus>>,
    shutdown: CancellationToken,
}

impl RespawnController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        window_name: String,
        config: RespawnConfig,
        tool: Arc<dyn WindowTool>,
        tracker_rx: broadcast::Receiver<TrackerEvent>,
        output_rx: Option<Subscription>,
        control_rx: mpsc::Receiver<RespawnCommand>,
        events_tx: broadcast::Sender<SupervisorEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            window_name,
            config,
            tool,
            tracker_rx,
            output_rx,
            control_rx,
            events_tx,
            status: Arc::new(Mutex::new(RespawnStatus::default())),
            shutdown,
        }
    }

    /// Shared status handle for API readers.
    pub fn status_handle(&self) -> Arc<Mutex<RespawnStatus>> {
        Arc::clone(&self.status)
    }

    fn emit(&self, event: RespawnEvent) {
        let _ = self.events_tx.send(SupervisorEvent::Respawn {
            id: self.session_id.clone(),
            event,
        });
    }

    /// Transition both the local mirror and the shared status, emitting a
    /// state-change event. The mirror exists so `select!` arm conditions can
    /// read the state without borrowing `self`.
    fn set_state(&self, state: &mut RespawnState, to: RespawnState) {
        let from = *state;
        *state = to;
        self.status.lock().state = to;
        if from != to {
            debug!(session = %self.session_id, from = from.as_str(), to = to.as_str(), "respawn state");
            self.emit(RespawnEvent::StateChanged { from, to });
        }
    }

    /// Drive the refresh sequence. Injection failures surface to the caller,
    /// which classifies them via `is_transient()`.
    async fn run_refresh(&mut self, state: &mut RespawnState, auto_clear: bool) -> Result<()> {
        let cycle = self.status.lock().cycle_count + 1;
        self.emit(RespawnEvent::CycleStarted { cycle });
        self.set_state(state, RespawnState::Refreshing);
        if auto_clear {
            let _ = self
                .events_tx
                .send(SupervisorEvent::SessionAutoClear { id: self.session_id.clone() });
        }

        let steps = build_refresh_steps(&self.config, auto_clear);
        let delay = self.config.inter_step_delay();
        for step in steps {
            match step {
                RefreshStep::Keys(keys) => {
                    self.tool.send_keys(&self.window_name, &keys).await?;
                    self.emit(RespawnEvent::StepSent { step: keys });
                }
                RefreshStep::Wait(duration) => {
                    self.emit(RespawnEvent::TimerStarted {
                        kind: "step_wait",
                        duration_ms: duration.as_millis() as u64,
                    });
                    tokio::time::sleep(duration).await;
                }
            }
            tokio::time::sleep(delay).await;
        }

        {
            let mut status = self.status.lock();
            status.cycle_count = cycle;
            status.last_cycle_at = Some(epoch_ms());
        }
        Ok(())
    }

    /// Run until stopped, completed, deadline, or shutdown.
    pub async fn run(mut self) {
        let started_at = epoch_ms();
        let deadline = self
            .config
            .duration_minutes
            .map(|minutes| tokio::time::Instant::now() + Duration::from_secs(minutes * 60));
        {
            let mut status = self.status.lock();
            status.started_at = Some(started_at);
            status.deadline_at =
                self.config.duration_minutes.map(|minutes| started_at + minutes * 60_000);
        }
        let mut state = RespawnState::Stopped;
        self.set_state(&mut state, RespawnState::Watching);
        self.emit(RespawnEvent::Started);
        if let Some(minutes) = self.config.duration_minutes {
            self.emit(RespawnEvent::TimerStarted {
                kind: "duration",
                duration_ms: minutes * 60_000,
            });
        }

        let mut last_activity = tokio::time::Instant::now();
        let mut cooldown_until: Option<tokio::time::Instant> = None;
        let mut pending_auto_clear = false;
        let mut pending_refresh = false;

        let reason = loop {
            // Run an enqueued refresh outside the select so steps are not
            // interleaved with new transitions.
            if pending_refresh {
                pending_refresh = false;
                self.set_state(&mut state, RespawnState::IdleDetected);
                let auto_clear = std::mem::take(&mut pending_auto_clear);
                match self.run_refresh(&mut state, auto_clear).await {
                    Ok(()) => {}
                    // Transient failures cool down and watch again, like a
                    // completed cycle.
                    Err(e) if e.is_transient() => {
                        info!(session = %self.session_id, "refresh failed, cooling down: {e}");
                    }
                    Err(e) => {
                        warn!(session = %self.session_id, "refresh failed: {e}");
                        break "refresh failed";
                    }
                }
                self.set_state(&mut state, RespawnState::CoolingDown);
                cooldown_until =
                    Some(tokio::time::Instant::now() + self.config.inter_step_delay());
                last_activity = tokio::time::Instant::now();
                continue;
            }

            let idle_timeout = self.config.idle_timeout();
            let idle_armed = state == RespawnState::Watching && self.config.idle_timeout_ms > 0;
            let output_armed = self.output_rx.is_some();

            tokio::select! {
                _ = self.shutdown.cancelled() => break "shutdown",

                command = self.control_rx.recv() => match command {
                    Some(RespawnCommand::Stop) | None => break "stopped",
                    Some(RespawnCommand::UpdateConfig(config)) => {
                        self.config = config;
                    }
                    Some(RespawnCommand::TokensCrossed) => {
                        let enabled =
                            self.config.auto_clear.map(|ac| ac.enabled).unwrap_or(false);
                        if enabled && state == RespawnState::Watching {
                            pending_auto_clear = true;
                            pending_refresh = true;
                        }
                    }
                    Some(RespawnCommand::ExternalIdle) => {
                        if state == RespawnState::Watching {
                            pending_refresh = true;
                        }
                    }
                },

                event = self.tracker_rx.recv() => match event {
                    Ok(TrackerEvent::CompletionDetected { .. })
                    | Ok(TrackerEvent::ExitGateMet { .. }) => {
                        // Completion wins from any state (a completion seen
                        // mid-refresh is handled once the steps finish).
                        self.set_state(&mut state, RespawnState::Completed);
                        break "completed";
                    }
                    Ok(TrackerEvent::IterationStallCritical { .. }) => {
                        if state == RespawnState::Watching {
                            pending_refresh = true;
                        }
                    }
                    Ok(TrackerEvent::CircuitBreakerUpdate(status)) => {
                        if status.state == crate::tracker::BreakerState::Open
                            && state == RespawnState::Watching
                        {
                            self.set_state(&mut state, RespawnState::CoolingDown);
                            let cooldown = self.config.breaker_cooldown();
                            self.emit(RespawnEvent::TimerStarted {
                                kind: "breaker_cooldown",
                                duration_ms: cooldown.as_millis() as u64,
                            });
                            cooldown_until = Some(tokio::time::Instant::now() + cooldown);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break "tracker gone",
                },

                chunk = async {
                    match self.output_rx.as_mut() {
                        Some(rx) => rx.next().await,
                        None => std::future::pending().await,
                    }
                }, if output_armed => match chunk {
                    SessionChunk::Data(_) => last_activity = tokio::time::Instant::now(),
                    SessionChunk::Dropped(_) => {}
                    SessionChunk::Closed => self.output_rx = None,
                },

                // Idle deadline while watching.
                _ = tokio::time::sleep_until(last_activity + idle_timeout), if idle_armed => {
                    debug!(session = %self.session_id, "idle deadline reached");
                    pending_refresh = true;
                },

                // Cool-down expiry.
                _ = async {
                    match cooldown_until {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                }, if cooldown_until.is_some() => {
                    cooldown_until = None;
                    last_activity = tokio::time::Instant::now();
                    self.set_state(&mut state, RespawnState::Watching);
                },

                // Overall duration deadline.
                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                }, if deadline.is_some() => {
                    break "deadline";
                },
            }
        };

        info!(session = %self.session_id, reason, "respawn controller stopping");
        self.set_state(&mut state, RespawnState::Stopped);
        self.emit(RespawnEvent::Stopped);
    }
}

#[cfg(test)]
#[path = "respawn_tests.rs"]
mod tests;
