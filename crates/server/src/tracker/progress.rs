// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-todo timing, remaining-work estimation, and the completion
//! confidence score.

use serde::{Deserialize, Serialize};

use crate::session::epoch_ms;

use super::{Complexity, RalphTracker, TodoStatus, MAX_COMPLETION_TIMES};

/// Confidence at or above which completion is considered trustworthy.
pub const CONFIDENCE_THRESHOLD: u8 = 70;

/// Aggregate todo progress plus a wall-clock projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoProgress {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub percent_complete: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected_completion_at: Option<u64>,
}

impl RalphTracker {
    /// Transition a todo's status, tracking in-progress durations.
    pub(crate) fn set_todo_status(&mut self, id: &str, status: TodoStatus) {
        let now = epoch_ms();
        let Some(todo) = self.todos.get_mut(id) else {
            return;
        };
        if todo.status == status {
            return;
        }

        match status {
            TodoStatus::InProgress => {
                self.todo_start_times.entry(id.to_string()).or_insert(now);
            }
            TodoStatus::Completed => {
                if let Some(start) = self.todo_start_times.remove(id) {
                    self.completion_times.push_back(now.saturating_sub(start));
                    while self.completion_times.len() > MAX_COMPLETION_TIMES {
                        self.completion_times.pop_front();
                    }
                }
            }
            TodoStatus::Pending => {
                self.todo_start_times.remove(id);
            }
        }
        todo.status = status;
    }

    /// Mark every todo completed (sentinel fired or bulk-complete line).
    pub(crate) fn mark_all_todos_completed(&mut self) {
        let ids: Vec<String> = self
            .todos
            .values()
            .filter(|t| t.status != TodoStatus::Completed)
            .map(|t| t.id.clone())
            .collect();
        for id in ids {
            self.set_todo_status(&id, TodoStatus::Completed);
        }
    }

    /// Estimated duration for a new todo: historical average scaled by a
    /// complexity factor, or the default ladder when no history exists.
    pub(crate) fn estimate_duration(&self, complexity: Complexity) -> u64 {
        if self.completion_times.is_empty() {
            return complexity.default_duration_ms();
        }
        let avg =
            self.completion_times.iter().sum::<u64>() / self.completion_times.len() as u64;
        let factor = complexity.default_duration_ms() as f64
            / Complexity::Simple.default_duration_ms() as f64;
        (avg as f64 * factor) as u64
    }

    /// Aggregate progress over tracked todos.
    pub fn todo_progress(&self) -> TodoProgress {
        let total = self.todos.len();
        let completed = self.todos.values().filter(|t| t.status == TodoStatus::Completed).count();
        let in_progress =
            self.todos.values().filter(|t| t.status == TodoStatus::InProgress).count();
        let pending = total - completed - in_progress;
        let percent_complete =
            if total == 0 { 0.0 } else { completed as f64 * 100.0 / total as f64 };

        let remaining = total - completed;
        let now = epoch_ms();
        let estimated_remaining_ms = if remaining == 0 {
            None
        } else if !self.completion_times.is_empty() {
            let avg =
                self.completion_times.iter().sum::<u64>() / self.completion_times.len() as u64;
            Some(avg * remaining as u64)
        } else if let (Some(started), true) = (self.started_at, completed > 0) {
            let elapsed = now.saturating_sub(started);
            Some(elapsed / completed as u64 * remaining as u64)
        } else {
            Some(
                self.todos
                    .values()
                    .filter(|t| t.status != TodoStatus::Completed)
                    .map(|t| t.estimated_duration_ms)
                    .sum(),
            )
        };

        TodoProgress {
            total,
            completed,
            in_progress,
            pending,
            percent_complete,
            estimated_remaining_ms,
            projected_completion_at: estimated_remaining_ms.map(|ms| now + ms),
        }
    }

    /// Completion confidence, 0-100.
    pub fn completion_confidence(&self) -> u8 {
        let mut score: i32 = 0;

        if self.saw_tagged_sentinel {
            score += 30;
        }
        if self.last_sentinel_known {
            score += 25;
        }
        if !self.todos.is_empty()
            && self.todos.values().all(|t| t.status == TodoStatus::Completed)
        {
            score += 20;
        }
        if self.last_block.as_ref().is_some_and(|b| b.exit_signal) {
            score += 15;
        }
        if self.completion_indicators >= 2 {
            score += 10;
        }
        if self.last_context_prompt_like {
            score -= 20;
        } else {
            score += 10;
        }
        if self.active {
            score += 10;
        }
        if self.last_sentinel_occurrences >= 2 {
            score += 15;
        }

        score.clamp(0, 100) as u8
    }

    /// True when the confidence score clears [`CONFIDENCE_THRESHOLD`].
    pub fn is_completion_confident(&self) -> bool {
        self.completion_confidence() >= CONFIDENCE_THRESHOLD
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
