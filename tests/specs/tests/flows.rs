// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end flows through the public supervisor API: creation, output
//! pipeline, tracker semantics, respawn, restart recovery, and discovery.

use claudeman::dispatch::SessionChunk;
use claudeman::event::{HookEventKind, SupervisorEvent};
use claudeman::respawn::{RespawnConfig, RespawnEvent, RespawnState};
use claudeman::tracker::{BreakerState, TodoStatus, TrackerEvent};

use claudeman_specs::{wait_event, World};

#[tokio::test]
async fn full_loop_lifecycle_completes() -> anyhow::Result<()> {
    let world = World::new()?;
    let session = world.agent_session().await?;
    let mut events = world.supervisor.subscribe_events();

    // The child starts an autonomous loop with todos and iterations.
    world.child_says(
        &session,
        "Iteration 1/3\n- [ ] build the index\n- [ ] verify the index\n<promise>INDEX_REBUILD_SETTLED</promise>\n",
    );
    wait_event(&mut events, |e| {
        matches!(e, SupervisorEvent::Tracker { event: TrackerEvent::LoopUpdate(s), .. } if s.cycle_count == 1)
    })
    .await?;

    // Second occurrence of the sentinel completes the loop.
    world.child_says(&session, "Iteration 2/3\nwork...\n<promise>INDEX_REBUILD_SETTLED</promise>\n");
    let completion = wait_event(&mut events, |e| {
        matches!(e, SupervisorEvent::Tracker { event: TrackerEvent::CompletionDetected { .. }, .. })
    })
    .await?;
    match completion {
        SupervisorEvent::Tracker {
            event: TrackerEvent::CompletionDetected { phrase }, ..
        } => assert_eq!(phrase, "INDEX_REBUILD_SETTLED"),
        _ => unreachable!(),
    }
    // Completion also surfaces as a session-level event.
    wait_event(&mut events, |e| matches!(e, SupervisorEvent::SessionCompletion { .. })).await?;

    // All todos were marked completed.
    let (_, todos) = world
        .supervisor
        .tracker_snapshot(&session.id)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(todos.len(), 2);
    assert!(todos.iter().all(|t| t.status == TodoStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn status_blocks_drive_breaker_over_the_wire() -> anyhow::Result<()> {
    let world = World::new()?;
    let session = world.agent_session().await?;
    let mut events = world.supervisor.subscribe_events();

    let block = "---RALPH_STATUS---\nSTATUS: IN_PROGRESS\nFILES_MODIFIED: 0\nTASKS_COMPLETED_THIS_LOOP: 0\n---END_RALPH_STATUS---\n";
    // Auto-enable first, then three no-progress blocks.
    world.child_says(&session, "Iteration 1/9\n");
    for _ in 0..3 {
        world.child_says(&session, block);
    }

    let open = wait_event(&mut events, |e| {
        matches!(
            e,
            SupervisorEvent::Tracker {
                event: TrackerEvent::CircuitBreakerUpdate(s),
                ..
            } if s.state == BreakerState::Open
        )
    })
    .await?;
    match open {
        SupervisorEvent::Tracker { event: TrackerEvent::CircuitBreakerUpdate(status), .. } => {
            assert_eq!(status.reason_code.as_deref(), Some("no_progress_open"));
        }
        _ => unreachable!(),
    }
    Ok(())
}

#[tokio::test]
async fn subscriber_hydration_and_ordering() -> anyhow::Result<()> {
    let world = World::new()?;
    let session = world.agent_session().await?;

    // Late subscriber hydrates from the ring, then receives live bytes.
    world.child_says(&session, "early output\n");
    let mut attempts = 0;
    loop {
        let history = world.supervisor.history(&session.id).unwrap_or_default();
        if history == b"early output\n" {
            break;
        }
        attempts += 1;
        anyhow::ensure!(attempts < 100, "ring never hydrated: {history:?}");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    let mut sub = world.supervisor.subscribe_output(&session.id).expect("subscribe");
    world.child_says(&session, "live output\n");
    match tokio::time::timeout(claudeman_specs::EVENT_TIMEOUT, sub.next()).await? {
        SessionChunk::Data(data) => assert_eq!(&data[..], b"live output\n"),
        other => anyhow::bail!("expected live data, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn respawn_refreshes_idle_agent_and_stops_on_completion() -> anyhow::Result<()> {
    let world = World::new()?;
    let session = world.agent_session().await?;
    let mut events = world.supervisor.subscribe_events();

    let config = RespawnConfig {
        update_prompt: Some("continue with @fix_plan.md".to_string()),
        send_clear: true,
        idle_timeout_ms: 200,
        inter_step_delay_ms: 10,
        ..RespawnConfig::default()
    };
    world
        .supervisor
        .start_respawn(&session.id, config)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    // Idle (no output) drives a refresh cycle into the window.
    wait_event(&mut events, |e| {
        matches!(
            e,
            SupervisorEvent::Respawn { event: RespawnEvent::StepSent { step }, .. } if step == "/clear"
        )
    })
    .await?;
    let keys = world.tool.sent_keys(&session.window_name);
    assert!(keys.contains(&"continue with @fix_plan.md".to_string()));

    // Completion stops the controller for good.
    world.child_says(&session, "Starting Ralph loop\n<promise>PLAN_FULLY_EXECUTED</promise>\n");
    wait_event(&mut events, |e| {
        matches!(e, SupervisorEvent::Respawn { event: RespawnEvent::Stopped, .. })
    })
    .await?;
    let status = world.supervisor.respawn_status(&session.id).expect("status");
    assert_eq!(status.state, RespawnState::Stopped);
    Ok(())
}

#[tokio::test]
async fn restart_recovers_sessions_and_reconcile_settles_liveness() -> anyhow::Result<()> {
    let world = World::new()?;
    let alive = world.agent_session().await?;
    let dead = world.agent_session().await?;
    world.tool.mark_dead(&dead.window_name);

    // Restart: registry is reloaded, reconcile settles attachment.
    let restarted = world.restart();
    assert_eq!(restarted.sessions().len(), 2);

    let report = restarted.reconcile().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(report.died, vec![dead.id.clone()]);

    let sessions = restarted.sessions();
    let alive_record = sessions.iter().find(|s| s.id == alive.id).expect("alive record");
    let dead_record = sessions.iter().find(|s| s.id == dead.id).expect("dead record");
    assert!(alive_record.attached);
    assert!(!dead_record.attached);
    Ok(())
}

#[tokio::test]
async fn orphan_discovery_after_registry_loss() -> anyhow::Result<()> {
    let world = World::new()?;
    world.tool.add_orphan("cm-feedc0de");

    let report = world.supervisor.reconcile().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(report.discovered, vec!["restored-feedc0de".to_string()]);

    // The adopted session is fully operational: keystrokes reach it.
    world
        .supervisor
        .send_keys("restored-feedc0de", "echo adopted")
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(world.tool.sent_keys("cm-feedc0de"), vec!["echo adopted".to_string()]);
    Ok(())
}

#[tokio::test]
async fn hook_callback_body_round_trip() -> anyhow::Result<()> {
    let world = World::new()?;
    let session = world.agent_session().await?;
    let mut events = world.supervisor.subscribe_events();

    // What a child would POST to /api/hook-event.
    let body: claudeman::event::HookEventBody = serde_json::from_str(&format!(
        r#"{{"event":"idle_prompt","sessionId":"{}"}}"#,
        session.id
    ))?;
    let kind = HookEventKind::from_name(&body.event).expect("known hook kind");
    world
        .supervisor
        .handle_hook_event(&body.session_id, kind)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    wait_event(&mut events, |e| matches!(e, SupervisorEvent::SessionIdle { .. })).await?;
    Ok(())
}
