// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Todo extraction from terminal lines: several syntaxes, content-derived
//! ids, similarity-based dedup, and priority/complexity inference.

use tracing::debug;

use crate::session::epoch_ms;

use super::similarity::{content_id, dedup_threshold, hybrid_similarity, normalize_for_id};
use super::{Complexity, RalphTracker, Todo, TodoPriority, TodoStatus, TrackerEvent, MAX_TODOS};

/// Minimum cleaned content length for a line to count as a todo.
const MIN_TODO_LEN: usize = 5;
/// Longest line the "all tasks complete" heuristic will trust.
const ALL_COMPLETE_MAX_LINE: usize = 100;
/// Allowed difference between a mentioned count and the tracked todo count.
const ALL_COMPLETE_COUNT_SLACK: i64 = 2;

fn status_from_checkbox(mark: &str) -> TodoStatus {
    match mark {
        "x" | "X" => TodoStatus::Completed,
        "-" => TodoStatus::InProgress,
        _ => TodoStatus::Pending,
    }
}

fn status_from_icon(icon: &str) -> TodoStatus {
    match icon {
        "☒" | "✓" | "✔" => TodoStatus::Completed,
        "◐" => TodoStatus::InProgress,
        "✗" => TodoStatus::Pending,
        _ => TodoStatus::Pending,
    }
}

fn status_from_word(word: &str) -> Option<TodoStatus> {
    match word {
        "pending" => Some(TodoStatus::Pending),
        "in_progress" => Some(TodoStatus::InProgress),
        "completed" => Some(TodoStatus::Completed),
        _ => None,
    }
}

impl RalphTracker {
    /// Recognize todo syntaxes on one line, in priority order.
    pub(crate) fn scan_todo_line(&mut self, line: &str, _events: &mut [TrackerEvent]) {
        // While @fix_plan.md is authoritative the stream cannot mutate todos.
        if self.fix_plan_authoritative {
            return;
        }
        // Exclusions: tool invocations and assistant commentary.
        if self.patterns.tool_invocation.is_match(line) || self.patterns.commentary.is_match(line)
        {
            return;
        }

        // 1. Markdown checkboxes; possibly several per line.
        let boxes = self.parse_checkboxes(line);
        if !boxes.is_empty() {
            for (status, content) in boxes {
                self.upsert_todo(&content, status, None);
            }
            return;
        }

        // 2. `Todo: <icon> <text>`
        if let Some(caps) = self.patterns.todo_icon.captures(line) {
            let (icon, text) = (caps[1].to_string(), caps[2].to_string());
            self.upsert_todo(&text, status_from_icon(&icon), None);
            return;
        }

        // 3. `<text> (pending|in_progress|completed)`
        if let Some(caps) = self.patterns.status_suffix.captures(line) {
            if let Some(status) = status_from_word(&caps[2]) {
                let text = caps[1].to_string();
                self.upsert_todo(&text, status, None);
                return;
            }
        }

        // 4. Native bare icon at line start.
        if let Some(caps) = self.patterns.bare_icon.captures(line) {
            let (icon, text) = (caps[1].to_string(), caps[2].to_string());
            self.upsert_todo(&text, status_from_icon(&icon), None);
            return;
        }

        // 5. `✔ Task #N created: <text>`
        if let Some(caps) = self.patterns.task_created.captures(line) {
            if let Ok(number) = caps[1].parse::<u32>() {
                let text = caps[2].trim().to_string();
                self.register_task_number(number, &text);
                self.upsert_todo(&text, TodoStatus::Pending, None);
            }
            return;
        }

        // 6. `✔ Task #N updated: status → <value>`
        if let Some(caps) = self.patterns.task_updated.captures(line) {
            if let (Ok(number), Some(status)) =
                (caps[1].parse::<u32>(), status_from_word(&caps[2].to_lowercase()))
            {
                if let Some(content) = self.task_numbers.get(&number).cloned() {
                    self.upsert_todo(&content, status, None);
                } else {
                    debug!(number, "status update for unknown task number");
                }
            }
            return;
        }

        // 7. `✔ #N <text>` summary line.
        if let Some(caps) = self.patterns.task_summary.captures(line) {
            if let Ok(number) = caps[1].parse::<u32>() {
                let text = caps[2].trim().to_string();
                if !self.task_numbers.contains_key(&number) {
                    self.register_task_number(number, &text);
                    self.upsert_todo(&text, TodoStatus::Pending, None);
                }
            }
        }
    }

    /// Find every checkbox on the line; content runs until the next marker.
    fn parse_checkboxes(&self, line: &str) -> Vec<(TodoStatus, String)> {
        let marks: Vec<(usize, usize, TodoStatus)> = self
            .patterns
            .checkbox
            .captures_iter(line)
            .filter_map(|caps| {
                let m = caps.get(0)?;
                Some((m.start(), m.end(), status_from_checkbox(&caps[1])))
            })
            .collect();

        let mut out = Vec::new();
        for (i, &(_, content_start, status)) in marks.iter().enumerate() {
            let content_end = marks.get(i + 1).map(|&(next, _, _)| next).unwrap_or(line.len());
            let content = line[content_start..content_end].trim();
            if !content.is_empty() {
                out.push((status, content.to_string()));
            }
        }
        out
    }

    fn register_task_number(&mut self, number: u32, content: &str) {
        self.task_numbers.insert(number, content.to_string());
        // Bounded: evict the lowest task numbers.
        while self.task_numbers.len() > super::MAX_TASK_MAPPINGS {
            if let Some(&lowest) = self.task_numbers.keys().next() {
                self.task_numbers.remove(&lowest);
            }
        }
    }

    /// Upsert a todo by content. Returns the id the
    /// content landed under, or `None` when the line was rejected.
    pub(crate) fn upsert_todo(
        &mut self,
        content: &str,
        status: TodoStatus,
        priority: Option<TodoPriority>,
    ) -> Option<String> {
        let clean = clean_content(content);
        if clean.chars().count() < MIN_TODO_LEN {
            return None;
        }

        let id = content_id(&clean);

        // Exact id hit: update status and refresh the seen-timestamp.
        if self.todos.contains_key(&id) {
            self.set_todo_status(&id, status);
            if let Some(todo) = self.todos.get_mut(&id) {
                todo.detected_at = epoch_ms();
                if todo.priority.is_none() {
                    todo.priority = priority.or_else(|| infer_priority(&self.patterns, &clean));
                }
            }
            self.pending_todo_update = true;
            return Some(id);
        }

        // Similarity fold: near-duplicates collapse into the existing todo,
        // keeping the longer content and any established priority.
        let normalized = normalize_for_id(&clean);
        let threshold = dedup_threshold(normalized.chars().count());
        let similar = self.todos.iter().find_map(|(existing_id, todo)| {
            let existing_norm = normalize_for_id(&todo.content);
            (hybrid_similarity(&normalized, &existing_norm) >= threshold)
                .then(|| existing_id.clone())
        });

        if let Some(existing_id) = similar {
            self.set_todo_status(&existing_id, status);
            if let Some(todo) = self.todos.get_mut(&existing_id) {
                if clean.chars().count() > todo.content.chars().count() {
                    todo.content = clean;
                }
                todo.detected_at = epoch_ms();
                if todo.priority.is_none() {
                    todo.priority = priority;
                }
            }
            self.pending_todo_update = true;
            return Some(existing_id);
        }

        // Insert, evicting the oldest when full.
        if self.todos.len() >= MAX_TODOS {
            let oldest = self
                .todos
                .values()
                .min_by_key(|t| t.detected_at)
                .map(|t| t.id.clone());
            if let Some(oldest) = oldest {
                self.todos.shift_remove(&oldest);
                self.todo_start_times.remove(&oldest);
            }
        }

        let complexity = infer_complexity(&self.patterns, &clean);
        let todo = Todo {
            id: id.clone(),
            content: clean.clone(),
            status: TodoStatus::Pending,
            priority: priority.or_else(|| infer_priority(&self.patterns, &clean)),
            detected_at: epoch_ms(),
            estimated_complexity: complexity,
            estimated_duration_ms: self.estimate_duration(complexity),
        };
        self.todos.insert(id.clone(), todo);
        if status != TodoStatus::Pending {
            self.set_todo_status(&id, status);
        }
        self.pending_todo_update = true;
        Some(id)
    }

    /// `all tasks complete` line: guarded bulk completion.
    pub(crate) fn scan_all_complete(&mut self, line: &str, _events: &mut [TrackerEvent]) {
        if self.fix_plan_authoritative {
            return;
        }
        let Some(caps) = self.patterns.all_complete.captures(line) else {
            return;
        };
        if line.chars().count() > ALL_COMPLETE_MAX_LINE {
            return;
        }
        // Prompt echoes ("when all tasks are done, output: ...") must not
        // complete anything.
        let lower = line.to_lowercase();
        if lower.contains("output:") || lower.contains('"') || lower.contains("<promise>") {
            return;
        }
        if self.todos.is_empty() {
            return;
        }
        if let Some(count) = caps.get(1).and_then(|m| m.as_str().trim().parse::<i64>().ok()) {
            let diff = (count - self.todos.len() as i64).abs();
            if diff > ALL_COMPLETE_COUNT_SLACK {
                return;
            }
        }
        self.mark_all_todos_completed();
        self.pending_todo_update = true;
    }
}

/// Collapse whitespace and trim (input is already ANSI-stripped).
pub(crate) fn clean_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Regex-family priority inference; the highest matching priority wins.
pub(crate) fn infer_priority(
    patterns: &super::Patterns,
    content: &str,
) -> Option<TodoPriority> {
    if patterns.priority_p0.is_match(content) {
        Some(TodoPriority::P0)
    } else if patterns.priority_p1.is_match(content) {
        Some(TodoPriority::P1)
    } else if patterns.priority_p2.is_match(content) {
        Some(TodoPriority::P2)
    } else {
        None
    }
}

/// Regex-family complexity inference.
pub(crate) fn infer_complexity(patterns: &super::Patterns, content: &str) -> Complexity {
    if patterns.complexity_trivial.is_match(content) {
        Complexity::Trivial
    } else if patterns.complexity_complex.is_match(content) {
        Complexity::Complex
    } else if patterns.complexity_moderate.is_match(content) {
        Complexity::Moderate
    } else {
        Complexity::Simple
    }
}

#[cfg(test)]
#[path = "todos_tests.rs"]
mod tests;
