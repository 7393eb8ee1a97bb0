// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session supervisor: lifecycle of Session entities, per-session runtime
//! tasks (capture reader, tracker, respawn), the registry, and the event
//! fan-out.
//!
//! Each session is serviced by one reader task that pulls bytes from the
//! window's capture file and synchronously appends to the history ring,
//! publishes to the dispatcher, and feeds the tracker task. The registry
//! map is guarded by a single mutex held only for small copies; all I/O
//! happens outside the lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::dispatch::{Dispatcher, Subscription};
use crate::error::{Result, SupervisorError};
use crate::event::{HookEventKind, SupervisorEvent};
use crate::respawn::{RespawnCommand, RespawnConfig, RespawnController, RespawnStatus};
use crate::ring::HistoryRing;
use crate::session::{
    compose_command, epoch_ms, window_name_for, CommandSpec, CreateSession, Session,
};
use crate::store::{Store, TrackerCheckpoint};
use crate::tracker::{
    FixPlanWatcher, LoopSnapshot, RalphTracker, Todo, TrackerCommand, TrackerEvent, TrackerTask,
};
use crate::usage::{TokenTotals, UsageState};
use crate::window::{CreateWindow, WindowInfo, WindowTool};

/// Minimum interval between tracker checkpoint writes per session.
const CHECKPOINT_THROTTLE: Duration = Duration::from_secs(2);

/// Supervisor-level settings (derived from [`Config`]).
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub window_prefix: String,
    pub ring_size: usize,
    pub api_url: String,
    pub agent_cmd: String,
    pub auto_enable: bool,
}

impl SupervisorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window_prefix: config.window_prefix.clone(),
            ring_size: config.ring_size,
            api_url: config.api_url.clone(),
            agent_cmd: config.agent_cmd.clone(),
            auto_enable: !config.no_auto_enable,
        }
    }
}

/// Per-session runtime state owned by the supervisor.
pub(crate) struct SessionHandle {
    pub(crate) session: Session,
    pub(crate) ring: Arc<Mutex<HistoryRing>>,
    pub(crate) usage: Arc<UsageState>,
    pub(crate) tracker_cmd_tx: mpsc::Sender<TrackerCommand>,
    pub(crate) tracker_events_tx: broadcast::Sender<TrackerEvent>,
    pub(crate) respawn_tx: Option<mpsc::Sender<RespawnCommand>>,
    pub(crate) respawn_status: Option<Arc<Mutex<RespawnStatus>>>,
    pub(crate) cancel: CancellationToken,
}

pub(crate) struct Inner {
    pub(crate) config: SupervisorConfig,
    pub(crate) tool: Arc<dyn WindowTool>,
    pub(crate) store: Store,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) sessions: Mutex<HashMap<String, SessionHandle>>,
    pub(crate) events_tx: broadcast::Sender<SupervisorEvent>,
    pub(crate) auto_enable: AtomicBool,
}

/// The supervisor. Cheap to clone; constructed once at startup and passed
/// into handlers (no process-wide singletons beyond the registry file).
#[derive(Clone)]
pub struct Supervisor {
    pub(crate) inner: Arc<Inner>,
}

impl Supervisor {
    /// Build the supervisor, loading the persisted registry and spawning
    /// runtime tasks for every known session. Liveness is settled by the
    /// first reconcile.
    pub fn new(config: SupervisorConfig, tool: Arc<dyn WindowTool>, store: Store) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        let auto_enable = config.auto_enable;
        let supervisor = Self {
            inner: Arc::new(Inner {
                config,
                tool,
                store,
                dispatcher: Dispatcher::new(),
                sessions: Mutex::new(HashMap::new()),
                events_tx,
                auto_enable: AtomicBool::new(auto_enable),
            }),
        };

        for session in supervisor.inner.store.load_sessions() {
            debug!(id = %session.id, window = %session.window_name, "restoring session");
            supervisor.install_session(session);
        }
        supervisor
    }

    // -- Observation ----------------------------------------------------------

    pub fn subscribe_events(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events_tx.subscribe()
    }

    /// The event feed as a `Stream`, for SSE-style consumers. Gaps from a
    /// lagging consumer are skipped rather than surfaced.
    pub fn event_stream(&self) -> impl Stream<Item = SupervisorEvent> {
        BroadcastStream::new(self.subscribe_events())
            .filter_map(|event| async move { event.ok() })
    }

    /// Subscribe to one session's byte stream.
    pub fn subscribe_output(&self, id: &str) -> Option<Subscription> {
        self.inner.dispatcher.subscribe(id)
    }

    /// Current history-ring contents for hydrating a late subscriber.
    pub fn history(&self, id: &str) -> Option<Vec<u8>> {
        self.inner.dispatcher.snapshot(id)
    }

    /// Drop a session's retained output history.
    pub fn clear_history(&self, id: &str) -> Result<()> {
        let ring = self
            .with_session(id, |h| Arc::clone(&h.ring))
            .ok_or_else(|| unknown_session(id))?;
        ring.lock().clear();
        self.emit(SupervisorEvent::SessionClearTerminal { id: id.to_string() });
        Ok(())
    }

    /// Textual snapshot of the window's visible buffer (via the tool).
    pub async fn window_snapshot(&self, id: &str) -> Result<Vec<u8>> {
        let window_name = self
            .with_session(id, |h| h.session.window_name.clone())
            .ok_or_else(|| unknown_session(id))?;
        self.inner.tool.snapshot(&window_name).await
    }

    pub fn sessions(&self) -> Vec<Session> {
        let sessions = self.inner.sessions.lock();
        let mut out: Vec<Session> = sessions.values().map(|h| h.session.clone()).collect();
        out.sort_by_key(|s| s.created_at);
        out
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.with_session(id, |h| h.session.clone())
    }

    pub fn token_totals(&self, id: &str) -> Option<TokenTotals> {
        self.with_session(id, |h| h.usage.snapshot())
    }

    pub fn respawn_status(&self, id: &str) -> Option<RespawnStatus> {
        self.with_session(id, |h| h.respawn_status.as_ref().map(|s| s.lock().clone()))?
    }

    /// Query the live tracker state of a session.
    pub async fn tracker_snapshot(&self, id: &str) -> Result<(LoopSnapshot, Vec<Todo>)> {
        let tx = self
            .with_session(id, |h| h.tracker_cmd_tx.clone())
            .ok_or_else(|| unknown_session(id))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(TrackerCommand::Snapshot(reply_tx))
            .await
            .map_err(|_| SupervisorError::Internal("tracker task gone".into()))?;
        reply_rx.await.map_err(|_| SupervisorError::Internal("tracker task gone".into()))
    }

    fn with_session<T>(&self, id: &str, f: impl FnOnce(&SessionHandle) -> T) -> Option<T> {
        let sessions = self.inner.sessions.lock();
        sessions.get(id).map(f)
    }

    fn emit(&self, event: SupervisorEvent) {
        let _ = self.inner.events_tx.send(event);
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Create a new session: compose the command line, create the window,
    /// record the session, and start its runtime tasks.
    pub async fn create_session(&self, req: CreateSession) -> Result<Session> {
        crate::window::validate_working_dir(&req.working_dir)?;
        if !req.working_dir.is_dir() {
            return Err(SupervisorError::Validation {
                what: "working directory",
                detail: format!("{} does not exist", req.working_dir.display()),
            });
        }

        let id = Uuid::new_v4().to_string();
        let window_name = window_name_for(&self.inner.config.window_prefix, &id);
        let command = compose_command(&CommandSpec {
            session_id: &id,
            window_name: &window_name,
            working_dir: &req.working_dir,
            mode: req.mode,
            api_url: &self.inner.config.api_url,
            agent_cmd: &self.inner.config.agent_cmd,
            nice: req.nice,
            path_prepend: None,
        });

        let pid = self
            .inner
            .tool
            .create(&CreateWindow {
                name: window_name.clone(),
                working_dir: req.working_dir.clone(),
                command,
            })
            .await?;

        let session = Session {
            id: id.clone(),
            window_name,
            pid,
            created_at: epoch_ms(),
            working_dir: req.working_dir,
            mode: req.mode,
            attached: true,
            name: req.name,
            respawn_config: None,
            ralph_enabled: false,
        };

        info!(id = %session.id, window = %session.window_name, pid, "session created");
        self.install_session(session.clone());
        self.persist();
        self.emit(SupervisorEvent::SessionCreated { id: id.clone() });
        self.emit(SupervisorEvent::ScreenCreated { id });
        Ok(session)
    }

    /// Stop a session: cancel its runtime, optionally kill the window,
    /// drop subscribers, remove it from the registry.
    pub async fn kill_session(&self, id: &str, kill_window: bool) -> Result<()> {
        let handle = {
            let mut sessions = self.inner.sessions.lock();
            sessions.remove(id)
        };
        let Some(handle) = handle else {
            return Err(unknown_session(id));
        };

        if let Some(ref respawn_tx) = handle.respawn_tx {
            let _ = respawn_tx.try_send(RespawnCommand::Stop);
        }
        handle.cancel.cancel();
        self.inner.dispatcher.unregister(id);

        if kill_window {
            match self.inner.tool.kill(&handle.session.window_name, handle.session.pid).await {
                Ok(report) if !report.clean => {
                    warn!(id, survivors = ?report.survivors, "window kill left survivors");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(id, "window kill failed: {e}");
                    self.emit(SupervisorEvent::SessionError {
                        id: id.to_string(),
                        error: e.to_string(),
                    });
                }
            }
            self.emit(SupervisorEvent::ScreenKilled { id: id.to_string() });
            self.emit(SupervisorEvent::SessionExit { id: id.to_string() });
        }

        let _ = self.inner.store.remove_tracker_checkpoint(id);
        self.persist();
        self.emit(SupervisorEvent::SessionDeleted { id: id.to_string() });
        Ok(())
    }

    pub fn rename_session(&self, id: &str, name: &str) -> Result<()> {
        self.mutate_session(id, |session| session.name = Some(name.to_string()))?;
        self.emit(SupervisorEvent::SessionRenamed {
            id: id.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn set_attached(&self, id: &str, attached: bool) -> Result<()> {
        self.mutate_session(id, |session| session.attached = attached)
    }

    pub async fn update_respawn_config(&self, id: &str, config: Option<RespawnConfig>) -> Result<()> {
        self.mutate_session(id, |session| session.respawn_config = config.clone())?;
        // A running controller picks up the new config; a cleared config
        // stops it.
        let respawn_tx = self.with_session(id, |h| h.respawn_tx.clone()).flatten();
        if let Some(tx) = respawn_tx {
            let command = match config {
                Some(config) => RespawnCommand::UpdateConfig(config),
                None => RespawnCommand::Stop,
            };
            let _ = tx.send(command).await;
        }
        Ok(())
    }

    pub async fn update_tracker_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.mutate_session(id, |session| session.ralph_enabled = enabled)?;
        let command = if enabled { TrackerCommand::Enable } else { TrackerCommand::Clear };
        self.tracker_command(id, command).await
    }

    /// Forward a command to a session's tracker task.
    pub async fn tracker_command(&self, id: &str, command: TrackerCommand) -> Result<()> {
        let tx = self
            .with_session(id, |h| h.tracker_cmd_tx.clone())
            .ok_or_else(|| unknown_session(id))?;
        tx.send(command)
            .await
            .map_err(|_| SupervisorError::Internal("tracker task gone".into()))
    }

    /// Inject keystrokes into a session's window.
    pub async fn send_keys(&self, id: &str, text: &str) -> Result<()> {
        let window_name = self
            .with_session(id, |h| h.session.window_name.clone())
            .ok_or_else(|| unknown_session(id))?;
        self.inner.tool.send_keys(&window_name, text).await?;
        self.emit(SupervisorEvent::SessionWorking { id: id.to_string() });
        Ok(())
    }

    /// Synthesize a Session for an orphaned window found by discovery.
    pub fn adopt(&self, info: &WindowInfo) -> Session {
        let suffix = info
            .name
            .strip_prefix(&self.inner.config.window_prefix)
            .unwrap_or(&info.name);
        let id = format!("restored-{suffix}");
        let working_dir =
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));

        let session = Session {
            id: id.clone(),
            window_name: info.name.clone(),
            pid: info.pid,
            created_at: epoch_ms(),
            working_dir,
            mode: crate::session::SessionMode::Agent,
            attached: true,
            name: None,
            respawn_config: None,
            ralph_enabled: false,
        };
        info!(id = %session.id, window = %session.window_name, "adopted orphan window");
        self.install_session(session.clone());
        self.emit(SupervisorEvent::SessionDiscovered { id });
        session
    }

    // -- Hooks & tokens -------------------------------------------------------

    /// Entry point for the child's cooperative hook callback.
    pub async fn handle_hook_event(&self, id: &str, kind: HookEventKind) -> Result<()> {
        if self.session(id).is_none() {
            return Err(unknown_session(id));
        }
        match kind {
            HookEventKind::IdlePrompt => {
                self.emit(SupervisorEvent::SessionIdle { id: id.to_string() });
                let respawn_tx = self.with_session(id, |h| h.respawn_tx.clone()).flatten();
                if let Some(tx) = respawn_tx {
                    let _ = tx.send(RespawnCommand::ExternalIdle).await;
                }
            }
            HookEventKind::PermissionPrompt => {
                self.emit(SupervisorEvent::SessionIdle { id: id.to_string() });
            }
            HookEventKind::Stop => {
                self.emit(SupervisorEvent::SessionCompletion {
                    id: id.to_string(),
                    cost: None,
                });
            }
        }
        Ok(())
    }

    /// Accumulate token usage; crossing the auto-clear threshold pokes the
    /// respawn controller.
    pub async fn record_tokens(&self, id: &str, input: u64, output: u64) -> Result<TokenTotals> {
        let (usage, respawn_tx, threshold) = self
            .with_session(id, |h| {
                let threshold = h
                    .session
                    .respawn_config
                    .as_ref()
                    .and_then(|c| c.auto_clear)
                    .filter(|ac| ac.enabled)
                    .map(|ac| ac.threshold);
                (Arc::clone(&h.usage), h.respawn_tx.clone(), threshold)
            })
            .ok_or_else(|| unknown_session(id))?;

        let before = usage.snapshot().total_tokens;
        let totals = usage.record(input, output);
        if let (Some(threshold), Some(tx)) = (threshold, respawn_tx) {
            if before < threshold && totals.total_tokens >= threshold {
                debug!(id, threshold, "token threshold crossed");
                let _ = tx.send(RespawnCommand::TokensCrossed).await;
            }
        }
        Ok(totals)
    }

    // -- Respawn --------------------------------------------------------------

    /// Start (or restart) the respawn controller for a session.
    pub async fn start_respawn(&self, id: &str, config: RespawnConfig) -> Result<()> {
        self.stop_respawn(id).await.ok();
        self.mutate_session(id, |session| session.respawn_config = Some(config.clone()))?;

        let (window_name, tracker_rx, cancel) = self
            .with_session(id, |h| {
                (
                    h.session.window_name.clone(),
                    h.tracker_events_tx.subscribe(),
                    h.cancel.clone(),
                )
            })
            .ok_or_else(|| unknown_session(id))?;

        let (control_tx, control_rx) = mpsc::channel(16);
        let output_rx = self.inner.dispatcher.subscribe(id);
        let controller = RespawnController::new(
            id.to_string(),
            window_name,
            config,
            Arc::clone(&self.inner.tool),
            tracker_rx,
            output_rx,
            control_rx,
            self.inner.events_tx.clone(),
            cancel.child_token(),
        );
        let status = controller.status_handle();
        tokio::spawn(controller.run());

        {
            let mut sessions = self.inner.sessions.lock();
            if let Some(handle) = sessions.get_mut(id) {
                handle.respawn_tx = Some(control_tx);
                handle.respawn_status = Some(status);
            }
        }
        Ok(())
    }

    pub async fn stop_respawn(&self, id: &str) -> Result<()> {
        let tx = {
            let mut sessions = self.inner.sessions.lock();
            let handle = sessions.get_mut(id).ok_or_else(|| unknown_session(id))?;
            handle.respawn_tx.take()
        };
        if let Some(tx) = tx {
            let _ = tx.send(RespawnCommand::Stop).await;
        }
        Ok(())
    }

    // -- Stats ----------------------------------------------------------------

    /// One stats sweep over all attached sessions.
    pub async fn sample_stats(&self) {
        let targets: Vec<(String, u32)> = {
            let sessions = self.inner.sessions.lock();
            sessions
                .values()
                .filter(|h| h.session.attached && h.session.pid != 0)
                .map(|h| (h.session.id.clone(), h.session.pid))
                .collect()
        };
        if targets.is_empty() {
            return;
        }
        let pids: Vec<u32> = targets.iter().map(|(_, pid)| *pid).collect();
        let stats = crate::stats::sample_trees(&pids).await;
        for (id, pid) in targets {
            if let Some(stats) = stats.get(&pid) {
                self.emit(SupervisorEvent::ScreenStatsUpdated { id, stats: *stats });
            }
        }
    }

    /// Periodic stats loop (batched process sampling). `interval == 0` disables it.
    pub fn spawn_stats_loop(&self, interval: Duration, shutdown: CancellationToken) {
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
                    _ = tick.tick() => supervisor.sample_stats().await,
                }
            }
        });
    }

    // -- Internal plumbing ----------------------------------------------------

    fn mutate_session(&self, id: &str, f: impl FnOnce(&mut Session)) -> Result<()> {
        {
            let mut sessions = self.inner.sessions.lock();
            let handle = sessions.get_mut(id).ok_or_else(|| unknown_session(id))?;
            f(&mut handle.session);
        }
        self.persist();
        Ok(())
    }

    /// Persist the registry. In-memory state stays authoritative when the
    /// write fails.
    pub(crate) fn persist(&self) {
        let records = self.sessions();
        if let Err(e) = self.inner.store.save_sessions(&records) {
            warn!("registry write failed: {e}");
        }
    }

    /// Install a session's runtime: ring + dispatcher registration, tracker
    /// task, capture reader, fix-plan watcher, event forwarding.
    pub(crate) fn install_session(&self, session: Session) {
        let id = session.id.clone();
        let cancel = CancellationToken::new();
        let ring = Arc::new(Mutex::new(HistoryRing::new(self.inner.config.ring_size)));
        self.inner.dispatcher.register(&id, Arc::clone(&ring));

        // Tracker task.
        let mut tracker = RalphTracker::new();
        tracker.set_auto_enable(self.inner.auto_enable.load(Ordering::Relaxed));
        if session.ralph_enabled {
            tracker.enable();
        }
        let (bytes_tx, bytes_rx) = mpsc::channel::<Bytes>(256);
        let (tracker_cmd_tx, tracker_cmd_rx) = mpsc::channel(32);
        let (tracker_events_tx, _) = broadcast::channel(256);
        tokio::spawn(
            TrackerTask::new(
                tracker,
                bytes_rx,
                tracker_cmd_rx,
                tracker_events_tx.clone(),
                cancel.child_token(),
            )
            .run(),
        );

        // Reader task: capture file → ring + dispatcher + tracker.
        let capture_path = self.inner.tool.capture_path(&session.window_name);
        let (chunk_tx, chunk_rx) = mpsc::channel::<Bytes>(256);
        tokio::spawn(
            crate::tail::CaptureTail::new(capture_path).run(chunk_tx, cancel.child_token()),
        );
        self.spawn_byte_pump(&id, chunk_rx, Arc::clone(&ring), bytes_tx, cancel.child_token());

        // Fix-plan watcher: authoritative todos when the file exists.
        self.spawn_fix_plan_watcher(&session, tracker_cmd_tx.clone(), cancel.child_token());

        // Tracker event forwarding + checkpointing.
        self.spawn_tracker_forwarder(&id, tracker_events_tx.subscribe(), cancel.child_token());

        let handle = SessionHandle {
            session,
            ring,
            usage: Arc::new(UsageState::new()),
            tracker_cmd_tx,
            tracker_events_tx,
            respawn_tx: None,
            respawn_status: None,
            cancel,
        };
        self.inner.sessions.lock().insert(id, handle);
    }

    /// The per-session byte path: append to the ring, publish to the
    /// dispatcher, feed the tracker, broadcast `session:terminal`.
    fn spawn_byte_pump(
        &self,
        id: &str,
        mut chunk_rx: mpsc::Receiver<Bytes>,
        ring: Arc<Mutex<HistoryRing>>,
        tracker_bytes_tx: mpsc::Sender<Bytes>,
        shutdown: CancellationToken,
    ) {
        let id = id.to_string();
        let supervisor = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    chunk = chunk_rx.recv() => {
                        let Some(chunk) = chunk else { break };
                        ring.lock().push(&chunk);
                        supervisor.inner.dispatcher.publish(&id, chunk.clone());
                        // Tracker backlog never blocks the byte path.
                        let _ = tracker_bytes_tx.try_send(chunk.clone());
                        supervisor.emit(SupervisorEvent::SessionTerminal {
                            id: id.clone(),
                            data: chunk,
                        });
                    }
                }
            }
        });
    }

    fn spawn_fix_plan_watcher(
        &self,
        session: &Session,
        tracker_cmd_tx: mpsc::Sender<TrackerCommand>,
        shutdown: CancellationToken,
    ) {
        let watcher = FixPlanWatcher::new(&session.working_dir);
        if let Some(items) = watcher.load() {
            let tx = tracker_cmd_tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(TrackerCommand::ImportPlan(items)).await;
            });
        }

        let (items_tx, mut items_rx) = mpsc::channel(4);
        tokio::spawn(watcher.run(items_tx, shutdown.clone()));
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    items = items_rx.recv() => {
                        let Some(items) = items else { break };
                        if tracker_cmd_tx.send(TrackerCommand::ImportPlan(items)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Wrap tracker events into supervisor events and checkpoint loop/todo
    /// snapshots (throttled) for TUI readers.
    fn spawn_tracker_forwarder(
        &self,
        id: &str,
        mut tracker_rx: broadcast::Receiver<TrackerEvent>,
        shutdown: CancellationToken,
    ) {
        let id = id.to_string();
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut checkpoint = TrackerCheckpoint::default();
            let mut last_write = tokio::time::Instant::now() - CHECKPOINT_THROTTLE;
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = tracker_rx.recv() => match event {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };

                let mut dirty = false;
                match &event {
                    TrackerEvent::LoopUpdate(snapshot) => {
                        checkpoint.loop_state = Some(snapshot.clone());
                        dirty = true;
                    }
                    TrackerEvent::TodoUpdate(todos) => {
                        checkpoint.todos = todos.clone();
                        dirty = true;
                    }
                    TrackerEvent::CompletionDetected { .. } => {
                        supervisor.emit(SupervisorEvent::SessionCompletion {
                            id: id.clone(),
                            cost: None,
                        });
                    }
                    _ => {}
                }

                supervisor.emit(SupervisorEvent::Tracker { id: id.clone(), event });

                if dirty && last_write.elapsed() >= CHECKPOINT_THROTTLE {
                    last_write = tokio::time::Instant::now();
                    if let Err(e) =
                        supervisor.inner.store.save_tracker_checkpoint(&id, &checkpoint)
                    {
                        warn!(id = %id, "checkpoint write failed: {e}");
                    }
                }
            }
        });
    }
}

fn unknown_session(id: &str) -> SupervisorError {
    SupervisorError::Validation { what: "session id", detail: format!("unknown session {id}") }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
