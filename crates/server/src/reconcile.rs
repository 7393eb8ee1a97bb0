// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness reconciliation and orphan discovery.
//!
//! Runs at startup and periodically: every registered session is checked
//! against the live window list, and prefix-matching windows unknown to the
//! registry are adopted as restored sessions.

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::event::SupervisorEvent;
use crate::supervisor::Supervisor;

/// Outcome of one reconcile sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Sessions whose window disappeared since the last sweep.
    pub died: Vec<String>,
    /// Sessions adopted from orphaned windows.
    pub discovered: Vec<String>,
    /// Sessions whose pid changed (window restarted out-of-band).
    pub updated: Vec<String>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.died.is_empty() || !self.discovered.is_empty() || !self.updated.is_empty()
    }
}

impl Supervisor {
    /// One reconcile sweep.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let prefix = self.inner.config.window_prefix.clone();
        let windows = self.inner.tool.list(&prefix).await?;
        let live: HashMap<&str, u32> =
            windows.iter().map(|w| (w.name.as_str(), w.pid)).collect();

        let mut report = ReconcileReport::default();

        // Pass 1: settle liveness of registered sessions.
        let known: Vec<(String, String, u32, bool)> = {
            let sessions = self.inner.sessions.lock();
            sessions
                .values()
                .map(|h| {
                    (
                        h.session.id.clone(),
                        h.session.window_name.clone(),
                        h.session.pid,
                        h.session.attached,
                    )
                })
                .collect()
        };

        for (id, window_name, pid, was_attached) in known {
            match live.get(window_name.as_str()) {
                Some(&live_pid) => {
                    if !was_attached || pid != live_pid {
                        let mut sessions = self.inner.sessions.lock();
                        if let Some(handle) = sessions.get_mut(&id) {
                            handle.session.attached = true;
                            handle.session.pid = live_pid;
                        }
                        report.updated.push(id);
                    }
                }
                None => {
                    {
                        let mut sessions = self.inner.sessions.lock();
                        if let Some(handle) = sessions.get_mut(&id) {
                            handle.session.attached = false;
                        }
                    }
                    if was_attached {
                        info!(id = %id, window = %window_name, "window died");
                        let _ = self
                            .inner
                            .events_tx
                            .send(SupervisorEvent::ScreenDied { id: id.clone() });
                        let _ = self
                            .inner
                            .events_tx
                            .send(SupervisorEvent::SessionExit { id: id.clone() });
                        report.died.push(id);
                    }
                }
            }
        }

        // Pass 2: adopt prefix-matching windows unknown to the registry.
        let known_windows: Vec<String> = {
            let sessions = self.inner.sessions.lock();
            sessions.values().map(|h| h.session.window_name.clone()).collect()
        };
        for window in &windows {
            if known_windows.iter().any(|w| w == &window.name) {
                continue;
            }
            let session = self.adopt(window);
            report.discovered.push(session.id);
        }

        if report.changed() {
            debug!(
                died = report.died.len(),
                discovered = report.discovered.len(),
                updated = report.updated.len(),
                "reconcile applied changes"
            );
            self.persist();
        }
        Ok(report)
    }

    /// Periodic reconcile loop. `interval == 0` disables it (startup-only).
    pub fn spawn_reconcile_loop(&self, interval: Duration, shutdown: CancellationToken) {
        if interval.is_zero() {
            return;
        }
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(e) = supervisor.reconcile().await {
                            tracing::warn!("reconcile failed: {e}");
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
