// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `@fix_plan.md`: an optional per-working-directory file that, when
//! present, becomes the authoritative todo source. Loaded immediately,
//! watched for changes with a debounce, and re-imported on every change.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::session::epoch_ms;

use super::similarity::content_id;
use super::todos::{clean_content, infer_complexity};
use super::{RalphTracker, Todo, TodoPriority, TodoStatus, TrackerEvent, MAX_TODOS};

/// File name looked up under each session's working directory.
pub const FIX_PLAN_FILE: &str = "@fix_plan.md";
/// Re-import debounce after a filesystem change.
pub const FIX_PLAN_DEBOUNCE: Duration = Duration::from_millis(500);
/// Polling fallback when filesystem events are unavailable.
const FIX_PLAN_POLL: Duration = Duration::from_secs(2);

/// One item of the plan file: the round-trippable subset of a todo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanItem {
    pub content: String,
    pub status: TodoStatus,
    pub priority: Option<TodoPriority>,
}

/// Parse the plan's markdown into items.
///
/// Sections map to priorities (`## High Priority (P0)`, `## Standard (P1)`,
/// `## Nice to Have (P2)`, `## Tasks`, `## Completed`); checkboxes map to
/// status (`[ ]` pending, `[-]` in progress, `[x]` completed). Items in
/// `## Completed` are completed regardless of their checkbox.
pub fn parse_fix_plan(text: &str) -> Vec<PlanItem> {
    let mut items = Vec::new();
    let mut priority: Option<TodoPriority> = None;
    let mut force_completed = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("##") {
            let heading = heading.trim().to_lowercase();
            force_completed = false;
            priority = if heading.contains("p0") || heading.contains("high priority") {
                Some(TodoPriority::P0)
            } else if heading.contains("p1") || heading.contains("standard") {
                Some(TodoPriority::P1)
            } else if heading.contains("p2") || heading.contains("nice to have") {
                Some(TodoPriority::P2)
            } else if heading.contains("completed") {
                force_completed = true;
                None
            } else {
                // "## Tasks" and anything unrecognized.
                None
            };
            continue;
        }

        let Some(rest) = trimmed.strip_prefix("- [").or_else(|| trimmed.strip_prefix("* [")) else {
            continue;
        };
        let Some((mark, content)) = rest.split_once(']') else {
            continue;
        };
        let status = if force_completed {
            TodoStatus::Completed
        } else {
            match mark {
                "x" | "X" => TodoStatus::Completed,
                "-" => TodoStatus::InProgress,
                _ => TodoStatus::Pending,
            }
        };
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        items.push(PlanItem { content: content.to_string(), status, priority });
    }
    items
}

fn checkbox_mark(status: TodoStatus) -> &'static str {
    match status {
        TodoStatus::Pending => " ",
        TodoStatus::InProgress => "-",
        TodoStatus::Completed => "x",
    }
}

/// Render todos back into the plan's markdown (inverse of
/// [`parse_fix_plan`]).
pub fn render_fix_plan(todos: &[Todo]) -> String {
    let mut out = String::from("# Fix Plan\n");

    let mut section = |title: &str, filter: &dyn Fn(&Todo) -> bool, force_mark: Option<&str>| {
        let selected: Vec<&Todo> = todos.iter().filter(|t| filter(t)).collect();
        if selected.is_empty() {
            return;
        }
        out.push_str(&format!("\n## {title}\n"));
        for todo in selected {
            let mark = force_mark.unwrap_or_else(|| checkbox_mark(todo.status));
            out.push_str(&format!("- [{mark}] {}\n", todo.content));
        }
    };

    section("High Priority (P0)", &|t| t.priority == Some(TodoPriority::P0), None);
    section("Standard (P1)", &|t| t.priority == Some(TodoPriority::P1), None);
    section("Nice to Have (P2)", &|t| t.priority == Some(TodoPriority::P2), None);
    section(
        "Tasks",
        &|t| t.priority.is_none() && t.status != TodoStatus::Completed,
        None,
    );
    section(
        "Completed",
        &|t| t.priority.is_none() && t.status == TodoStatus::Completed,
        Some("x"),
    );
    out
}

impl RalphTracker {
    /// Replace the todo set from the plan file and make it authoritative:
    /// while authoritative, terminal-stream todo heuristics are suppressed.
    pub fn import_plan(&mut self, items: Vec<PlanItem>) -> Vec<TrackerEvent> {
        let previous = std::mem::take(&mut self.todos);
        self.fix_plan_authoritative = true;

        for item in items.into_iter().take(MAX_TODOS) {
            let clean = clean_content(&item.content);
            if clean.is_empty() {
                continue;
            }
            let id = content_id(&clean);
            let detected_at =
                previous.get(&id).map(|t| t.detected_at).unwrap_or_else(epoch_ms);
            let complexity = infer_complexity(&self.patterns, &clean);
            let todo = Todo {
                id: id.clone(),
                content: clean,
                status: item.status,
                priority: item.priority,
                detected_at,
                estimated_complexity: complexity,
                estimated_duration_ms: self.estimate_duration(complexity),
            };
            self.todos.insert(id, todo);
        }

        self.pending_todo_update = true;
        vec![]
    }

    /// Drop plan authority (file deleted); stream heuristics resume.
    pub fn set_plan_authoritative(&mut self, authoritative: bool) {
        self.fix_plan_authoritative = authoritative;
    }
}

/// Watches one working directory's plan file, sending parsed items on every
/// debounced change.
pub struct FixPlanWatcher {
    path: PathBuf,
}

impl FixPlanWatcher {
    pub fn new(working_dir: &Path) -> Self {
        Self { path: working_dir.join(FIX_PLAN_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and parse the current plan contents, if present.
    pub fn load(&self) -> Option<Vec<PlanItem>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Some(parse_fix_plan(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), "plan read failed: {e}");
                None
            }
        }
    }

    /// Watch the plan file until shutdown, sending parsed items after each
    /// debounced change. Uses `notify` with a polling fallback.
    pub async fn run(self, items_tx: mpsc::Sender<Vec<PlanItem>>, shutdown: CancellationToken) {
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let _watcher = self.setup_notify_watcher(wake_tx);
        let mut poll = tokio::time::interval(FIX_PLAN_POLL);
        let mut last_text: Option<String> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = wake_rx.recv() => {
                    // Debounce: absorb the burst of events a save produces.
                    tokio::time::sleep(FIX_PLAN_DEBOUNCE).await;
                    while wake_rx.try_recv().is_ok() {}
                }
                _ = poll.tick() => {}
            }

            let text = std::fs::read_to_string(&self.path).ok();
            if text == last_text {
                continue;
            }
            last_text = text.clone();
            if let Some(text) = text {
                debug!(path = %self.path.display(), "plan changed, re-importing");
                if items_tx.send(parse_fix_plan(&text)).await.is_err() {
                    break;
                }
            }
        }
    }

    fn setup_notify_watcher(
        &self,
        wake_tx: mpsc::Sender<()>,
    ) -> Option<notify::RecommendedWatcher> {
        use notify::{RecursiveMode, Watcher};

        let mut watcher = notify::recommended_watcher(move |_: notify::Result<notify::Event>| {
            let _ = wake_tx.try_send(());
        })
        .ok()?;

        // Watch the parent directory so file creation is detected too.
        let watch_path = self.path.parent().unwrap_or(self.path.as_ref());
        watcher.watch(watch_path, RecursiveMode::NonRecursive).ok()?;
        Some(watcher)
    }
}

#[cfg(test)]
#[path = "fix_plan_tests.rs"]
mod tests;
