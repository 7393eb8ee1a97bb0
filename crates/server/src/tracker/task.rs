// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session task that owns a [`RalphTracker`] and drives its timers.
//!
//! Bytes arrive over an mpsc channel from the session reader; commands
//! arrive from the supervisor API. Debounced emissions are drained
//! [`EVENT_DEBOUNCE`] after the triggering chunk, and the stall watcher
//! ticks every 60 seconds. All events go out on a broadcast channel, so
//! listeners can never re-enter the parser.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::fix_plan::PlanItem;
use super::{LoopSnapshot, RalphTracker, Todo, TrackerEvent, EVENT_DEBOUNCE};

/// Stall watcher tick interval.
pub const STALL_TICK: Duration = Duration::from_secs(60);

/// Control-plane commands for a running tracker task.
#[derive(Debug)]
pub enum TrackerCommand {
    Enable,
    SetAutoEnable(bool),
    StartLoop { phrase: Option<String>, max_iterations: Option<u32> },
    StopLoop,
    SetCompletionPhrase(String),
    AddAlternatePhrase(String),
    ImportPlan(Vec<PlanItem>),
    SetPlanAuthoritative(bool),
    ResetBreaker,
    Reset,
    FullReset,
    Clear,
    Flush,
    Snapshot(oneshot::Sender<(LoopSnapshot, Vec<Todo>)>),
}

/// Owns the tracker for one session.
pub struct TrackerTask {
    tracker: RalphTracker,
    bytes_rx: mpsc::Receiver<Bytes>,
    command_rx: mpsc::Receiver<TrackerCommand>,
    events_tx: broadcast::Sender<TrackerEvent>,
    shutdown: CancellationToken,
}

impl TrackerTask {
    pub fn new(
        tracker: RalphTracker,
        bytes_rx: mpsc::Receiver<Bytes>,
        command_rx: mpsc::Receiver<TrackerCommand>,
        events_tx: broadcast::Sender<TrackerEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { tracker, bytes_rx, command_rx, events_tx, shutdown }
    }

    fn emit(&self, events: Vec<TrackerEvent>) {
        for event in events {
            // Send errors just mean nobody is subscribed right now.
            let _ = self.events_tx.send(event);
        }
    }

    fn apply(&mut self, command: TrackerCommand) {
        let events = match command {
            TrackerCommand::Enable => self.tracker.enable(),
            TrackerCommand::SetAutoEnable(allowed) => {
                self.tracker.set_auto_enable(allowed);
                vec![]
            }
            TrackerCommand::StartLoop { phrase, max_iterations } => {
                self.tracker.start_loop(phrase, max_iterations)
            }
            TrackerCommand::StopLoop => self.tracker.stop_loop(),
            TrackerCommand::SetCompletionPhrase(phrase) => {
                self.tracker.set_completion_phrase(&phrase)
            }
            TrackerCommand::AddAlternatePhrase(phrase) => {
                self.tracker.add_alternate_phrase(&phrase);
                vec![]
            }
            TrackerCommand::ImportPlan(items) => self.tracker.import_plan(items),
            TrackerCommand::SetPlanAuthoritative(authoritative) => {
                self.tracker.set_plan_authoritative(authoritative);
                vec![]
            }
            TrackerCommand::ResetBreaker => self.tracker.reset_circuit_breaker(),
            TrackerCommand::Reset => {
                self.tracker.reset();
                vec![]
            }
            TrackerCommand::FullReset => {
                self.tracker.full_reset();
                vec![]
            }
            TrackerCommand::Clear => {
                self.tracker.clear();
                vec![]
            }
            TrackerCommand::Flush => self.tracker.flush(),
            TrackerCommand::Snapshot(reply) => {
                let _ = reply.send((self.tracker.loop_snapshot(), self.tracker.todos()));
                vec![]
            }
        };
        self.emit(events);
    }

    /// Run until shutdown or until both input channels close.
    pub async fn run(mut self) {
        let mut stall_tick = tokio::time::interval(STALL_TICK);
        stall_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut debounce_deadline: Option<tokio::time::Instant> = None;

        loop {
            // Arm the debounce timer whenever an emission is pending.
            if self.tracker.has_pending() && debounce_deadline.is_none() {
                debounce_deadline = Some(tokio::time::Instant::now() + EVENT_DEBOUNCE);
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                chunk = self.bytes_rx.recv() => {
                    match chunk {
                        Some(bytes) => {
                            let events = self.tracker.feed(&bytes);
                            self.emit(events);
                        }
                        None => break,
                    }
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.apply(command),
                        None => break,
                    }
                }

                _ = async {
                    match debounce_deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                }, if debounce_deadline.is_some() => {
                    debounce_deadline = None;
                    let events = self.tracker.flush();
                    self.emit(events);
                }

                _ = stall_tick.tick() => {
                    let events = self.tracker.check_stall();
                    self.emit(events);
                }
            }
        }

        // Final drain so late listeners see the terminal state.
        let events = self.tracker.flush();
        self.emit(events);
        debug!("tracker task stopped");
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
