// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::*;

/// Scripted [`KillOps`]: pids in `immune_to` survive the named signal/stage.
struct ScriptedOps {
    tree: Vec<(u32, Vec<u32>)>,
    alive: Mutex<HashSet<u32>>,
    term_immune: HashSet<u32>,
    kill_immune: HashSet<u32>,
    quit_kills: Vec<u32>,
    quit_calls: Mutex<u32>,
}

impl ScriptedOps {
    fn new(root: u32, children: Vec<u32>) -> Self {
        let mut alive = HashSet::new();
        alive.insert(root);
        alive.extend(&children);
        Self {
            tree: vec![(root, children)],
            alive: Mutex::new(alive),
            term_immune: HashSet::new(),
            kill_immune: HashSet::new(),
            quit_kills: vec![],
            quit_calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl KillOps for ScriptedOps {
    fn descendants(&self, pid: u32) -> Vec<u32> {
        let alive = self.alive.lock().unwrap();
        self.tree
            .iter()
            .filter(|(root, _)| *root == pid)
            .flat_map(|(_, kids)| kids.clone())
            .filter(|p| alive.contains(p))
            .collect()
    }

    fn signal(&self, pid: u32, sig: KillSignal) -> bool {
        let immune = match sig {
            KillSignal::Term => &self.term_immune,
            KillSignal::Kill => &self.kill_immune,
        };
        if !immune.contains(&pid) {
            self.alive.lock().unwrap().remove(&pid);
        }
        true
    }

    async fn quit_window(&self, _name: &str) -> bool {
        *self.quit_calls.lock().unwrap() += 1;
        let mut alive = self.alive.lock().unwrap();
        for pid in &self.quit_kills {
            alive.remove(pid);
        }
        !self.quit_kills.is_empty()
    }

    fn alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }
}

#[tokio::test(start_paused = true)]
async fn clean_tree_dies_at_stage_one() {
    let ops = ScriptedOps::new(100, vec![101, 102]);
    let report = escalate(&ops, "cm-test", 100).await;
    assert!(report.clean);
    assert_eq!(report.stages_run, vec![KillStage::TermDescendants]);
    assert_eq!(*ops.quit_calls.lock().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn term_immune_child_reaches_kill_stage() {
    let mut ops = ScriptedOps::new(100, vec![101]);
    ops.term_immune.insert(101);
    let report = escalate(&ops, "cm-test", 100).await;
    assert!(report.clean);
    assert_eq!(report.stages_run, vec![KillStage::TermDescendants, KillStage::KillSurvivors]);
}

#[tokio::test(start_paused = true)]
async fn kill_immune_window_reaches_quit_stage() {
    let mut ops = ScriptedOps::new(100, vec![]);
    ops.term_immune.insert(100);
    ops.kill_immune.insert(100);
    ops.quit_kills = vec![100];
    let report = escalate(&ops, "cm-test", 100).await;
    assert!(report.clean);
    assert_eq!(
        report.stages_run,
        vec![KillStage::TermDescendants, KillStage::KillSurvivors, KillStage::QuitCommand]
    );
    assert_eq!(*ops.quit_calls.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn immortal_pid_yields_best_effort_report() {
    let mut ops = ScriptedOps::new(100, vec![]);
    ops.term_immune.insert(100);
    ops.kill_immune.insert(100);
    let report = escalate(&ops, "cm-test", 100).await;
    assert!(!report.clean);
    assert_eq!(report.survivors, vec![100]);
    assert_eq!(
        report.stages_run,
        vec![
            KillStage::TermDescendants,
            KillStage::KillSurvivors,
            KillStage::QuitCommand,
            KillStage::KillWindowPid,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn term_immune_window_cleared_by_kill_stage() {
    let mut ops = ScriptedOps::new(100, vec![101]);
    ops.term_immune.insert(100);
    let report = escalate(&ops, "cm-test", 100).await;
    assert!(report.clean);
    assert_eq!(report.stages_run, vec![KillStage::TermDescendants, KillStage::KillSurvivors]);
    assert_eq!(*ops.quit_calls.lock().unwrap(), 0);
}
