// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::tracker::RalphTracker;

const PLAN: &str = "\
# Fix Plan

## High Priority (P0)
- [ ] patch the credential leak
- [-] rotate the signing keys

## Standard (P1)
- [x] reproduce the flaky timeout

## Nice to Have (P2)
- [ ] tidy the error messages

## Tasks
- [ ] sweep unused dependencies

## Completed
- [x] archive the old dashboards
";

#[test]
fn parses_sections_statuses_and_priorities() {
    let items = parse_fix_plan(PLAN);
    assert_eq!(items.len(), 6);

    assert_eq!(items[0].content, "patch the credential leak");
    assert_eq!(items[0].priority, Some(TodoPriority::P0));
    assert_eq!(items[0].status, TodoStatus::Pending);

    assert_eq!(items[1].status, TodoStatus::InProgress);
    assert_eq!(items[2].priority, Some(TodoPriority::P1));
    assert_eq!(items[2].status, TodoStatus::Completed);
    assert_eq!(items[3].priority, Some(TodoPriority::P2));
    assert_eq!(items[4].priority, None);
    assert_eq!(items[4].status, TodoStatus::Pending);
    assert_eq!(items[5].priority, None);
    assert_eq!(items[5].status, TodoStatus::Completed);
}

#[test]
fn completed_section_forces_status() {
    let items = parse_fix_plan("## Completed\n- [ ] despite the open checkbox\n");
    assert_eq!(items[0].status, TodoStatus::Completed);
}

#[test]
fn non_item_lines_are_skipped() {
    let items = parse_fix_plan("# Title\nprose paragraph\n## Tasks\n- not a checkbox\n- [ ] real one\n");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].content, "real one");
}

/// import(export(todos)) must equal todos as multisets of
/// (content, status, priority).
#[test]
fn export_import_round_trips() {
    let mut tracker = RalphTracker::new();
    tracker.enable();
    tracker.import_plan(parse_fix_plan(PLAN));
    let todos = tracker.todos();

    let rendered = render_fix_plan(&todos);
    let reimported = parse_fix_plan(&rendered);

    let mut original: Vec<(String, TodoStatus, Option<TodoPriority>)> =
        todos.into_iter().map(|t| (t.content, t.status, t.priority)).collect();
    let mut round_tripped: Vec<(String, TodoStatus, Option<TodoPriority>)> =
        reimported.into_iter().map(|i| (i.content, i.status, i.priority)).collect();
    original.sort();
    round_tripped.sort();
    assert_eq!(original, round_tripped);
}

#[test]
fn import_makes_plan_authoritative() {
    let mut tracker = RalphTracker::new();
    tracker.enable();
    tracker.import_plan(parse_fix_plan(PLAN));
    assert_eq!(tracker.todos().len(), 6);

    // Stream heuristics are suppressed while authoritative.
    tracker.feed(b"- [ ] a todo from the terminal stream\n");
    tracker.feed(b"all tasks complete\n");
    let todos = tracker.todos();
    assert_eq!(todos.len(), 6);
    assert!(todos.iter().any(|t| t.status != TodoStatus::Completed));

    // Releasing authority resumes stream parsing.
    tracker.set_plan_authoritative(false);
    tracker.feed(b"- [ ] a todo from the terminal stream\n");
    assert_eq!(tracker.todos().len(), 7);
}

#[test]
fn reimport_preserves_detected_at_for_kept_items() {
    let mut tracker = RalphTracker::new();
    tracker.enable();
    tracker.import_plan(parse_fix_plan(PLAN));
    let before: Vec<_> = tracker.todos();

    std::thread::sleep(Duration::from_millis(5));
    tracker.import_plan(parse_fix_plan(PLAN));
    let after = tracker.todos();
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.detected_at, a.detected_at, "{}", b.content);
    }
}

#[tokio::test]
async fn watcher_loads_and_detects_changes() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = FixPlanWatcher::new(dir.path());
    assert!(!watcher.exists());
    assert!(watcher.load().is_none());

    std::fs::write(watcher.path(), "## Tasks\n- [ ] from the file\n").unwrap();
    assert!(watcher.exists());
    let items = watcher.load().unwrap();
    assert_eq!(items.len(), 1);

    // Run the watcher and overwrite the file; the change must arrive.
    let (tx, mut rx) = mpsc::channel(4);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(FixPlanWatcher::new(dir.path()).run(tx, shutdown.clone()));

    // First poll tick delivers the initial content.
    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("initial plan delivery timed out")
        .unwrap();
    assert_eq!(first.len(), 1);

    std::fs::write(dir.path().join(FIX_PLAN_FILE), "## Tasks\n- [ ] one\n- [ ] two item\n")
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("plan change delivery timed out")
        .unwrap();
    assert_eq!(second.len(), 2);

    shutdown.cancel();
    let _ = handle.await;
}
