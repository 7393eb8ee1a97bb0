// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Four-stage kill escalation for a window and its process tree.
//!
//! The child may be a process group with descendants that outlive any single
//! signal, and the tool's own quit semantics vary across versions, so each
//! stage is attempted in order with liveness re-checks in between. The
//! stages sit behind [`KillOps`] so tests can fail stage K and assert stage
//! K+1 runs.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Signals the escalation delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    Term,
    Kill,
}

/// Primitive operations the escalation is built from.
#[async_trait]
pub trait KillOps: Send + Sync {
    /// All live descendant pids of `pid`, leaf-first (children before
    /// parents), excluding `pid` itself.
    fn descendants(&self, pid: u32) -> Vec<u32>;

    /// Deliver a signal; returns false when delivery failed.
    fn signal(&self, pid: u32, sig: KillSignal) -> bool;

    /// Ask the tool to quit the named window; returns false on failure.
    async fn quit_window(&self, name: &str) -> bool;

    /// Liveness probe (signal 0).
    fn alive(&self, pid: u32) -> bool;
}

/// One stage of the escalation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillStage {
    TermDescendants,
    KillSurvivors,
    QuitCommand,
    KillWindowPid,
}

/// Outcome of a kill escalation.
#[derive(Debug, Clone)]
pub struct KillReport {
    /// Stages that were actually attempted.
    pub stages_run: Vec<KillStage>,
    /// True when the final liveness sweep found no survivors.
    pub clean: bool,
    /// Pids still alive after the final sweep (empty when clean).
    pub survivors: Vec<u32>,
}

/// Pause between TERM delivery and the KILL-survivors stage.
const TERM_GRACE: Duration = Duration::from_millis(200);
/// Total budget for the final liveness sweep.
const SWEEP_BUDGET: Duration = Duration::from_secs(2);
/// Poll interval inside the final sweep.
const SWEEP_POLL: Duration = Duration::from_millis(100);

/// Run the four-stage escalation against window `name` / pid `pid`.
///
/// Returns early as soon as a liveness check finds nothing alive; otherwise
/// all four stages run and the final sweep decides `clean`.
pub async fn escalate(ops: &dyn KillOps, name: &str, pid: u32) -> KillReport {
    let mut stages_run = Vec::new();
    let targets = |ops: &dyn KillOps| {
        let mut pids = ops.descendants(pid);
        pids.push(pid);
        pids
    };
    let all_dead =
        |ops: &dyn KillOps| targets(ops).iter().all(|&p| !ops.alive(p));

    // Stage 1: TERM all descendants, leaf-first.
    stages_run.push(KillStage::TermDescendants);
    let descendants = ops.descendants(pid);
    debug!(name, pid, count = descendants.len(), "kill: TERM descendants");
    for &child in &descendants {
        ops.signal(child, KillSignal::Term);
    }
    ops.signal(pid, KillSignal::Term);
    tokio::time::sleep(TERM_GRACE).await;
    if all_dead(ops) {
        return KillReport { stages_run, clean: true, survivors: vec![] };
    }

    // Stage 2: KILL survivors.
    stages_run.push(KillStage::KillSurvivors);
    for p in targets(ops) {
        if ops.alive(p) {
            ops.signal(p, KillSignal::Kill);
        }
    }
    if all_dead(ops) {
        return KillReport { stages_run, clean: true, survivors: vec![] };
    }

    // Stage 3: the tool's own quit command.
    stages_run.push(KillStage::QuitCommand);
    ops.quit_window(name).await;
    if all_dead(ops) {
        return KillReport { stages_run, clean: true, survivors: vec![] };
    }

    // Stage 4: KILL the window pid directly.
    stages_run.push(KillStage::KillWindowPid);
    ops.signal(pid, KillSignal::Kill);

    // Final sweep: poll liveness for up to SWEEP_BUDGET.
    let deadline = tokio::time::Instant::now() + SWEEP_BUDGET;
    loop {
        if all_dead(ops) {
            return KillReport { stages_run, clean: true, survivors: vec![] };
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(SWEEP_POLL).await;
    }

    let survivors: Vec<u32> = targets(ops).into_iter().filter(|&p| ops.alive(p)).collect();
    warn!(name, pid, ?survivors, "kill: survivors after full escalation, best-effort success");
    KillReport { stages_run, clean: false, survivors }
}

#[cfg(test)]
#[path = "kill_tests.rs"]
mod tests;
