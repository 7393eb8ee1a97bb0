// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::{Duration, Instant};

use proptest::prelude::*;

use super::*;

fn feed(tracker: &mut RalphTracker, text: &str) -> Vec<TrackerEvent> {
    tracker.feed(text.as_bytes())
}

fn status_block(files: u32, tasks: u32, status: &str, extra: &str) -> String {
    format!(
        "---RALPH_STATUS---\n\
         STATUS: {status}\n\
         FILES_MODIFIED: {files}\n\
         TASKS_COMPLETED_THIS_LOOP: {tasks}\n\
         {extra}---END_RALPH_STATUS---\n"
    )
}

fn breaker_states(events: &[TrackerEvent]) -> Vec<BreakerState> {
    events
        .iter()
        .filter_map(|e| match e {
            TrackerEvent::CircuitBreakerUpdate(status) => Some(status.state),
            _ => None,
        })
        .collect()
}

// -- Auto-enable --------------------------------------------------------------

#[test]
fn disabled_tracker_ignores_plain_output() {
    let mut tracker = RalphTracker::new();
    let events = feed(&mut tracker, "compiling foo v0.1\nwarning: unused variable\n");
    assert!(events.is_empty());
    assert!(!tracker.enabled());
}

#[test]
fn checkbox_auto_enables_and_tracks_todo() {
    let mut tracker = RalphTracker::new();
    let events = feed(&mut tracker, "- [ ] write docs\n");
    assert_eq!(events, vec![TrackerEvent::Enabled]);

    let flushed = tracker.flush();
    let todos: Vec<_> = flushed
        .iter()
        .filter_map(|e| match e {
            TrackerEvent::TodoUpdate(todos) => Some(todos.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].len(), 1);
    assert_eq!(todos[0][0].content, "write docs");
    assert_eq!(todos[0][0].status, TodoStatus::Pending);
}

#[test]
fn auto_enable_kill_switch_suppresses() {
    let mut tracker = RalphTracker::new();
    tracker.set_auto_enable(false);
    let events = feed(&mut tracker, "- [ ] write docs\nIteration 1/5\n");
    assert!(events.is_empty());
    assert!(!tracker.enabled());

    // Explicit API enable still works.
    assert_eq!(tracker.enable(), vec![TrackerEvent::Enabled]);
}

#[test]
fn various_markers_auto_enable() {
    for chunk in [
        "Iteration 2/10\n",
        "[3/7]\n",
        "<promise>SOME_LONG_PHRASE</promise>\n",
        "☐ first task\n",
        "✔ Task #1 created: do the thing\n",
        "---RALPH_STATUS---\n",
        "all tasks complete\n",
        "Starting Ralph loop\n",
    ] {
        let mut tracker = RalphTracker::new();
        let events = feed(&mut tracker, chunk);
        assert!(
            events.contains(&TrackerEvent::Enabled),
            "chunk {chunk:?} should auto-enable"
        );
    }
}

// -- Status blocks + circuit breaker ------------------------------------------

#[test]
fn no_progress_blocks_walk_the_breaker_open() {
    let mut tracker = RalphTracker::new();
    tracker.enable();

    let mut states = Vec::new();
    for _ in 0..5 {
        let events = feed(&mut tracker, &status_block(0, 0, "IN_PROGRESS", ""));
        states.extend(breaker_states(&events));
    }

    assert_eq!(states, vec![BreakerState::HalfOpen, BreakerState::Open]);
    assert_eq!(tracker.breaker_status().reason_code.as_deref(), Some("no_progress_open"));
}

#[test]
fn exit_gate_fires_once_after_two_complete_blocks() {
    let mut tracker = RalphTracker::new();
    tracker.enable();

    let first = feed(
        &mut tracker,
        &format!("Iteration 1/5\n{}", status_block(1, 1, "COMPLETE", "EXIT_SIGNAL: true\n")),
    );
    assert!(!first.iter().any(|e| matches!(e, TrackerEvent::ExitGateMet { .. })));

    let second = feed(
        &mut tracker,
        &format!("Iteration 2/5\n{}", status_block(1, 1, "COMPLETE", "EXIT_SIGNAL: true\n")),
    );
    let gates: Vec<_> = second
        .iter()
        .filter(|e| matches!(e, TrackerEvent::ExitGateMet { .. }))
        .collect();
    assert_eq!(gates.len(), 1);
    match gates[0] {
        TrackerEvent::ExitGateMet { completion_indicators, exit_signal } => {
            assert_eq!(*completion_indicators, 2);
            assert!(*exit_signal);
        }
        _ => unreachable!(),
    }

    // Gate is once-only.
    let third = feed(
        &mut tracker,
        &status_block(1, 1, "COMPLETE", "EXIT_SIGNAL: true\n"),
    );
    assert!(!third.iter().any(|e| matches!(e, TrackerEvent::ExitGateMet { .. })));
}

#[test]
fn status_block_interior_is_not_parsed_as_todos() {
    let mut tracker = RalphTracker::new();
    tracker.enable();
    feed(&mut tracker, &status_block(1, 0, "IN_PROGRESS", "RECOMMENDATION: fix tests (pending)\n"));
    assert!(tracker.todos().is_empty());
}

#[test]
fn malformed_block_preserves_prior_state() {
    let mut tracker = RalphTracker::new();
    tracker.enable();
    feed(&mut tracker, &status_block(2, 1, "IN_PROGRESS", ""));
    let before = tracker.total_files_modified;

    // Missing STATUS → discarded.
    feed(&mut tracker, "---RALPH_STATUS---\nFILES_MODIFIED: 9\n---END_RALPH_STATUS---\n");
    assert_eq!(tracker.total_files_modified, before);
    assert!(tracker.last_status_block().is_some());
}

// -- Iteration & stall --------------------------------------------------------

#[test]
fn iteration_advance_resets_breaker_counters() {
    let mut tracker = RalphTracker::new();
    tracker.enable();
    feed(&mut tracker, &status_block(0, 0, "IN_PROGRESS", ""));
    feed(&mut tracker, &status_block(0, 0, "IN_PROGRESS", ""));
    assert_eq!(tracker.breaker_status().state, BreakerState::HalfOpen);

    let events = feed(&mut tracker, "Iteration 2/10\n");
    assert_eq!(breaker_states(&events), vec![BreakerState::Closed]);
    assert_eq!(tracker.breaker_status().consecutive_no_progress, 0);
}

#[test]
fn stall_warning_once_then_critical_every_tick() {
    let mut tracker = RalphTracker::new();
    tracker.start_loop(None, None);
    let base = Instant::now();

    assert!(tracker.check_stall_at(base + Duration::from_secs(60)).is_empty());

    let warn = tracker.check_stall_at(base + STALL_WARNING + Duration::from_secs(1));
    assert!(matches!(warn[..], [TrackerEvent::IterationStallWarning { .. }]));
    // Warning fires once.
    assert!(tracker
        .check_stall_at(base + STALL_WARNING + Duration::from_secs(2))
        .is_empty());

    let crit1 = tracker.check_stall_at(base + STALL_CRITICAL + Duration::from_secs(1));
    assert!(matches!(crit1[..], [TrackerEvent::IterationStallCritical { .. }]));
    // Critical repeats on every tick.
    let crit2 = tracker.check_stall_at(base + STALL_CRITICAL + Duration::from_secs(61));
    assert!(matches!(crit2[..], [TrackerEvent::IterationStallCritical { .. }]));
}

#[test]
fn inactive_tracker_never_stalls() {
    let mut tracker = RalphTracker::new();
    tracker.enable();
    assert!(tracker.check_stall_at(Instant::now() + STALL_CRITICAL * 4).is_empty());
}

// -- Completion monotonicity --------------------------------------------------

#[test]
fn loop_start_marker_cannot_reactivate_after_completion() {
    let mut tracker = RalphTracker::new();
    tracker.start_loop(Some("WORK_ALL_SETTLED".to_string()), None);
    let events = feed(&mut tracker, "<promise>WORK_ALL_SETTLED</promise>\n");
    assert!(events.iter().any(|e| matches!(e, TrackerEvent::CompletionDetected { .. })));
    assert!(!tracker.active());

    feed(&mut tracker, "Starting Ralph loop\nIteration 9/10\n");
    assert!(!tracker.active());

    // A fresh explicit start re-arms everything.
    tracker.start_loop(None, None);
    assert!(tracker.active());
}

// -- Resets -------------------------------------------------------------------

#[test]
fn reset_preserves_enabled_and_breaker() {
    let mut tracker = RalphTracker::new();
    tracker.enable();
    for _ in 0..3 {
        feed(&mut tracker, &status_block(0, 0, "IN_PROGRESS", ""));
    }
    feed(&mut tracker, "- [ ] some pending work\n");
    assert_eq!(tracker.breaker_status().state, BreakerState::Open);

    tracker.reset();
    assert!(tracker.enabled());
    assert!(tracker.todos().is_empty());
    assert_eq!(tracker.cycle_count(), 0);
    // Breaker survives reset().
    assert_eq!(tracker.breaker_status().state, BreakerState::Open);
    // Late emissions are pending, not delivered synchronously.
    assert!(tracker.has_pending());

    tracker.full_reset();
    assert_eq!(tracker.breaker_status().state, BreakerState::Closed);
    assert!(tracker.enabled());

    tracker.clear();
    assert!(!tracker.enabled());
    assert!(!tracker.has_pending());
}

// -- Bounded memory -----------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn buffers_stay_bounded(chunks in prop::collection::vec(".{0,200}", 0..40)) {
        let mut tracker = RalphTracker::new();
        tracker.start_loop(None, None);
        for chunk in &chunks {
            tracker.feed(chunk.as_bytes());
            prop_assert!(tracker.line_buffer.len() <= MAX_LINE_BUFFER);
            prop_assert!(tracker.partial_promise.len() <= MAX_PARTIAL_PROMISE);
            prop_assert!(tracker.todos.len() <= MAX_TODOS);
            prop_assert!(tracker.phrase_counts.len() <= MAX_PHRASE_ENTRIES);
            prop_assert!(tracker.task_numbers.len() <= MAX_TASK_MAPPINGS);
        }
    }
}

#[test]
fn long_unterminated_line_is_truncated_not_grown() {
    let mut tracker = RalphTracker::new();
    tracker.enable();
    for _ in 0..10 {
        tracker.feed("y".repeat(20_000).as_bytes());
    }
    assert!(tracker.line_buffer.len() <= MAX_LINE_BUFFER);
}
