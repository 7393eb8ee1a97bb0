// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RalphTracker: stateful parser over one session's ANSI-stripped output.
//!
//! Recognizes iteration markers, a structured status block, todo lists in
//! several syntaxes, and a `<promise>…</promise>` completion sentinel, and
//! derives progress, stall, circuit-breaker, and completion-confidence
//! signals from them.
//!
//! The tracker itself is synchronous and single-owner: `feed()` returns the
//! immediately emittable events, while `loopUpdate`/`todoUpdate` are
//! debounced — they set a pending flag that the owning task drains via
//! `flush()` after [`EVENT_DEBOUNCE`]. Listeners therefore can never
//! re-enter the parser mid-update.

pub mod breaker;
pub mod fix_plan;
pub mod progress;
pub mod sentinel;
pub mod similarity;
pub mod status;
pub mod task;
pub mod todos;

pub use breaker::{BreakerState, BreakerStatus, CircuitBreaker};
pub use fix_plan::{parse_fix_plan, render_fix_plan, FixPlanWatcher, PlanItem, FIX_PLAN_FILE};
pub use progress::TodoProgress;
pub use status::{LoopStatus, StatusBlock, TestsStatus, WorkType};
pub use task::{TrackerCommand, TrackerTask};

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::session::epoch_ms;

// -- Limits -------------------------------------------------------------------

/// Line assembly buffer cap; on overflow the tail half is retained.
pub const MAX_LINE_BUFFER: usize = 64 * 1024;
/// Todo map cap; oldest by `detected_at` evicted on overflow.
pub const MAX_TODOS: usize = 50;
/// Completion-phrase occurrence map cap; lowest counts trimmed on overflow.
pub const MAX_PHRASE_ENTRIES: usize = 50;
/// Task-number → content map cap; lowest numbers evicted on overflow.
pub const MAX_TASK_MAPPINGS: usize = 100;
/// Cross-chunk sentinel carry buffer cap in bytes.
pub const MAX_PARTIAL_PROMISE: usize = 256;
/// Completion duration samples retained for estimation.
pub const MAX_COMPLETION_TIMES: usize = 50;
/// Todos unseen for this long are purged.
pub const TODO_EXPIRY: Duration = Duration::from_secs(60 * 60);
/// Minimum interval between expiry-cleanup passes.
pub const CLEANUP_THROTTLE: Duration = Duration::from_secs(30);
/// Trailing debounce for `loopUpdate`/`todoUpdate`.
pub const EVENT_DEBOUNCE: Duration = Duration::from_millis(50);
/// Stalled-iteration warning threshold.
pub const STALL_WARNING: Duration = Duration::from_secs(10 * 60);
/// Stalled-iteration critical threshold.
pub const STALL_CRITICAL: Duration = Duration::from_secs(20 * 60);

// -- Types --------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TodoPriority {
    P0,
    P1,
    P2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    /// Default duration ladder: 1 / 3 / 10 / 30 minutes.
    pub fn default_duration_ms(&self) -> u64 {
        match self {
            Self::Trivial => 60_000,
            Self::Simple => 3 * 60_000,
            Self::Moderate => 10 * 60_000,
            Self::Complex => 30 * 60_000,
        }
    }
}

/// One tracked todo item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Content-derived id (djb2 over the normalized content).
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TodoPriority>,
    pub detected_at: u64,
    pub estimated_complexity: Complexity,
    pub estimated_duration_ms: u64,
}

/// Snapshot of the loop-level tracker state, carried by `loopUpdate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopSnapshot {
    pub active: bool,
    pub cycle_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    pub elapsed_hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_phrase: Option<String>,
    #[serde(default)]
    pub alternate_completion_phrases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    pub last_activity: u64,
}

/// Why a declared completion phrase is considered risky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    Common,
    Short,
    Numeric,
}

impl ValidationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Short => "short",
            Self::Numeric => "numeric",
        }
    }
}

/// Everything the tracker emits. A closed set with typed payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Enabled,
    LoopUpdate(LoopSnapshot),
    TodoUpdate(Vec<Todo>),
    CompletionDetected { phrase: String },
    StatusBlockDetected(StatusBlock),
    CircuitBreakerUpdate(BreakerStatus),
    ExitGateMet { completion_indicators: u32, exit_signal: bool },
    IterationStallWarning { stalled_for: Duration },
    IterationStallCritical { stalled_for: Duration },
    PhraseValidationWarning { phrase: String, reason: ValidationReason, suggestion: String },
}

impl TrackerEvent {
    /// Wire-format event name for SSE/TUI consumers.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::LoopUpdate(_) => "loopUpdate",
            Self::TodoUpdate(_) => "todoUpdate",
            Self::CompletionDetected { .. } => "completionDetected",
            Self::StatusBlockDetected(_) => "statusBlockDetected",
            Self::CircuitBreakerUpdate(_) => "circuitBreakerUpdate",
            Self::ExitGateMet { .. } => "exitGateMet",
            Self::IterationStallWarning { .. } => "iterationStallWarning",
            Self::IterationStallCritical { .. } => "iterationStallCritical",
            Self::PhraseValidationWarning { .. } => "phraseValidationWarning",
        }
    }
}

// -- Patterns -----------------------------------------------------------------

/// Compile a pattern known valid at authoring time.
#[allow(clippy::expect_used)]
fn re(pattern: &'static str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

pub(crate) struct Patterns {
    pub promise: Regex,
    pub iteration: Regex,
    pub bracket_iteration: Regex,
    pub elapsed: Regex,
    pub legacy_cycle: Regex,
    pub loop_start: Regex,
    pub checkbox: Regex,
    pub todo_icon: Regex,
    pub bare_icon: Regex,
    pub status_suffix: Regex,
    pub task_created: Regex,
    pub task_summary: Regex,
    pub task_updated: Regex,
    pub tool_invocation: Regex,
    pub commentary: Regex,
    pub all_complete: Regex,
    pub priority_p0: Regex,
    pub priority_p1: Regex,
    pub priority_p2: Regex,
    pub complexity_trivial: Regex,
    pub complexity_complex: Regex,
    pub complexity_moderate: Regex,
}

impl Patterns {
    fn new() -> Self {
        Self {
            promise: re(r"(?i)<promise>\s*([^<]+?)\s*</promise>"),
            iteration: re(r"(?i)\bIteration\s+(\d+)\s*/\s*(\d+)"),
            bracket_iteration: re(r"\[(\d+)/(\d+)\]"),
            elapsed: re(r"(?i)\belapsed(?:\s*time)?\s*:?\s*(\d+(?:\.\d+)?)\s*h(?:ours?|rs?)?\b"),
            legacy_cycle: re(r"(?i)\bcycle\s+#?(\d+)\b"),
            loop_start: re(
                r"(?i)(?:starting|beginning|entering|resuming)\s+(?:the\s+)?(?:autonomous|ralph)\s+loop",
            ),
            checkbox: re(r"[-*]\s*\[([ xX-])\]\s*"),
            todo_icon: re(r"^\s*Todo:\s*([☐☒◐✓✔✗])\s+(.+)$"),
            bare_icon: re(r"^[\s\[\]]*([☐☒◐])\s+(.+)$"),
            status_suffix: re(r"^(.*\S)\s*\((pending|in_progress|completed)\)\s*$"),
            task_created: re(r"[✔✓]\s*Task\s*#(\d+)\s*created:\s*(.+)$"),
            task_summary: re(r"^\s*[✔✓]\s*#(\d+)\s+(.+)$"),
            task_updated: re(r"[✔✓]\s*Task\s*#(\d+)\s*updated:\s*status\s*(?:→|->)\s*(\w+)"),
            tool_invocation: re(r"^\s*[A-Z][A-Za-z]*\("),
            commentary: re(
                r"^\s*(?:I'll\b|I will\b|I'm\b|Let me\b|Let's\b|Now I\b|First,|Next,|Task \d+:)",
            ),
            all_complete: re(
                r"(?i)\ball\s+(\d+\s+)?tasks?\s+(?:are\s+)?(?:complete(?:d)?|done|finished)\b",
            ),
            priority_p0: re(
                r"(?i)\b(?:critical|blocker|blocking|urgent|security|vulnerab\w*|crash\w*|data[\s-]?loss|hotfix|p0)\b",
            ),
            priority_p1: re(
                r"(?i)\b(?:bug|fix|error|fail(?:ing|ure|s)?|regression|required|must|broken|p1)\b",
            ),
            priority_p2: re(
                r"(?i)\b(?:nice[\s-]to[\s-]have|refactor\w*|clean\s?up|optimi[sz]e\w*|polish|docs?|documentation|style|p2)\b",
            ),
            complexity_trivial: re(
                r"(?i)\b(?:typo|rename|bump|tweak|comment|whitespace|trivial|one[\s-]?liner)\b",
            ),
            complexity_complex: re(
                r"(?i)\b(?:architect\w*|redesign|rewrite|migrat\w*|overhaul|integrat\w*|distributed|concurren\w*|complex)\b",
            ),
            complexity_moderate: re(
                r"(?i)\b(?:implement|add|create|build|support|handle|feature|fix)\b",
            ),
        }
    }

    /// Does this chunk contain any evidence of an autonomous-loop workload?
    fn auto_enable_trigger(&self, text: &str) -> bool {
        if self.promise.is_match(text)
            || self.iteration.is_match(text)
            || self.bracket_iteration.is_match(text)
            || self.loop_start.is_match(text)
            || self.checkbox.is_match(text)
            || self.task_created.is_match(text)
            || self.all_complete.is_match(text)
        {
            return true;
        }
        if text.contains(status::STATUS_BLOCK_START) {
            return true;
        }
        text.lines().any(|l| self.bare_icon.is_match(l))
    }
}

// -- Tracker ------------------------------------------------------------------

/// Stateful parser for one session's autonomous-loop output.
pub struct RalphTracker {
    pub(crate) patterns: Patterns,

    pub(crate) enabled: bool,
    pub(crate) auto_enable_allowed: bool,
    pub(crate) active: bool,
    pub(crate) started_at: Option<u64>,
    pub(crate) cycle_count: u32,
    pub(crate) max_iterations: Option<u32>,
    pub(crate) elapsed_hours: f64,
    pub(crate) last_activity: u64,

    pub(crate) completion_phrase: Option<String>,
    pub(crate) alternate_phrases: Vec<String>,
    /// Normalized phrases whose completion effects already fired.
    pub(crate) completed_phrases: HashSet<String>,
    /// Occurrence counts per normalized phrase, cap [`MAX_PHRASE_ENTRIES`].
    pub(crate) phrase_counts: HashMap<String, u32>,
    /// Consume-once guard so the cross-chunk probe and the line pipeline
    /// never double-count the same tagged occurrence.
    pub(crate) skip_next_tagged: Option<String>,

    pub(crate) todos: IndexMap<String, Todo>,
    pub(crate) task_numbers: BTreeMap<u32, String>,
    pub(crate) todo_start_times: HashMap<String, u64>,
    pub(crate) completion_times: VecDeque<u64>,
    pub(crate) fix_plan_authoritative: bool,

    // Status block machinery.
    pub(crate) in_status_block: bool,
    pub(crate) block_lines: Vec<String>,
    pub(crate) last_block: Option<StatusBlock>,
    pub(crate) total_files_modified: u64,
    pub(crate) total_tasks_completed: u64,
    pub(crate) completion_indicators: u32,
    pub(crate) exit_gate_met: bool,

    pub(crate) breaker: CircuitBreaker,

    // Stall watcher.
    pub(crate) last_iteration_change: Option<Instant>,
    pub(crate) stall_warned: bool,

    // Confidence inputs.
    pub(crate) saw_tagged_sentinel: bool,
    pub(crate) last_sentinel_known: bool,
    pub(crate) last_sentinel_occurrences: u32,
    pub(crate) last_context_prompt_like: bool,

    // Line assembly.
    pub(crate) line_buffer: String,
    pub(crate) partial_promise: String,

    /// Last expiry-cleanup pass, epoch ms.
    pub(crate) last_cleanup: u64,

    // Debounced emissions.
    pub(crate) pending_loop_update: bool,
    pub(crate) pending_todo_update: bool,
}

impl Default for RalphTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RalphTracker {
    pub fn new() -> Self {
        Self {
            patterns: Patterns::new(),
            enabled: false,
            auto_enable_allowed: true,
            active: false,
            started_at: None,
            cycle_count: 0,
            max_iterations: None,
            elapsed_hours: 0.0,
            last_activity: 0,
            completion_phrase: None,
            alternate_phrases: Vec::new(),
            completed_phrases: HashSet::new(),
            phrase_counts: HashMap::new(),
            skip_next_tagged: None,
            todos: IndexMap::new(),
            task_numbers: BTreeMap::new(),
            todo_start_times: HashMap::new(),
            completion_times: VecDeque::new(),
            fix_plan_authoritative: false,
            in_status_block: false,
            block_lines: Vec::new(),
            last_block: None,
            total_files_modified: 0,
            total_tasks_completed: 0,
            completion_indicators: 0,
            exit_gate_met: false,
            breaker: CircuitBreaker::new(),
            last_iteration_change: None,
            stall_warned: false,
            saw_tagged_sentinel: false,
            last_sentinel_known: false,
            last_sentinel_occurrences: 0,
            last_context_prompt_like: false,
            line_buffer: String::new(),
            partial_promise: String::new(),
            last_cleanup: 0,
            pending_loop_update: false,
            pending_todo_update: false,
        }
    }

    /// Suppress or allow auto-enable (process-wide kill switch).
    pub fn set_auto_enable(&mut self, allowed: bool) {
        self.auto_enable_allowed = allowed;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn breaker_status(&self) -> &BreakerStatus {
        self.breaker.status()
    }

    pub fn last_status_block(&self) -> Option<&StatusBlock> {
        self.last_block.as_ref()
    }

    pub fn todos(&self) -> Vec<Todo> {
        self.todos.values().cloned().collect()
    }

    pub fn loop_snapshot(&self) -> LoopSnapshot {
        LoopSnapshot {
            active: self.active,
            cycle_count: self.cycle_count,
            max_iterations: self.max_iterations,
            elapsed_hours: self.elapsed_hours,
            completion_phrase: self.completion_phrase.clone(),
            alternate_completion_phrases: self.alternate_phrases.clone(),
            started_at: self.started_at,
            last_activity: self.last_activity,
        }
    }

    /// Explicit enable (API path). Always enables, regardless of the
    /// auto-enable kill switch.
    pub fn enable(&mut self) -> Vec<TrackerEvent> {
        if self.enabled {
            return vec![];
        }
        self.enabled = true;
        vec![TrackerEvent::Enabled]
    }

    /// Explicitly start a loop with an optional expected phrase. Re-arms
    /// completion detection for the new run.
    pub fn start_loop(
        &mut self,
        phrase: Option<String>,
        max_iterations: Option<u32>,
    ) -> Vec<TrackerEvent> {
        let mut events = self.enable();
        self.active = true;
        self.started_at = Some(epoch_ms());
        self.max_iterations = max_iterations;
        self.last_iteration_change = Some(Instant::now());
        self.stall_warned = false;
        self.completed_phrases.clear();
        self.phrase_counts.clear();
        self.saw_tagged_sentinel = false;
        self.last_sentinel_occurrences = 0;
        if let Some(phrase) = phrase {
            events.extend(self.set_completion_phrase(&phrase));
        }
        self.pending_loop_update = true;
        events
    }

    /// Deactivate the loop without clearing parsed state.
    pub fn stop_loop(&mut self) -> Vec<TrackerEvent> {
        self.active = false;
        self.pending_loop_update = true;
        vec![]
    }

    /// Feed one captured chunk. Returns the immediately emittable events;
    /// debounced kinds are drained later via [`RalphTracker::flush`].
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        let raw = String::from_utf8_lossy(chunk);
        let text = crate::ansi::ansi_strip_str(&raw);

        if !self.enabled {
            if self.auto_enable_allowed && self.patterns.auto_enable_trigger(&text) {
                self.enabled = true;
                debug!("tracker auto-enabled");
                events.push(TrackerEvent::Enabled);
            } else {
                return events;
            }
        }

        self.last_activity = epoch_ms();
        self.maybe_expire_todos();

        // Cross-chunk sentinel probe (tag split across chunk boundaries).
        self.probe_partial_promise(&text, &mut events);

        // Line assembly.
        self.line_buffer.push_str(&text);
        if self.line_buffer.len() > MAX_LINE_BUFFER {
            let mut from = self.line_buffer.len() - MAX_LINE_BUFFER / 2;
            while !self.line_buffer.is_char_boundary(from) {
                from += 1;
            }
            self.line_buffer = self.line_buffer[from..].to_string();
        }

        while let Some(pos) = self.line_buffer.find('\n') {
            let rest = self.line_buffer.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.line_buffer, rest);
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            self.process_line(&line, &mut events);
        }

        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<TrackerEvent>) {
        // The status block fence swallows its interior lines.
        if self.scan_status_line(line, events) {
            return;
        }
        self.scan_sentinel_line(line, events);
        self.scan_loop_status(line, events);
        self.scan_todo_line(line, events);
        self.scan_all_complete(line, events);
    }

    /// Iteration markers, elapsed time, legacy cycle lines, TodoWrite.
    fn scan_loop_status(&mut self, line: &str, events: &mut Vec<TrackerEvent>) {
        let captured = self
            .patterns
            .iteration
            .captures(line)
            .or_else(|| self.patterns.bracket_iteration.captures(line));
        if let Some(caps) = captured {
            let cycle: u32 = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
            let max: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
            if cycle > self.cycle_count {
                self.cycle_count = cycle;
                self.last_iteration_change = Some(Instant::now());
                self.stall_warned = false;
                if let Some(update) = self.breaker.on_iteration_advance(cycle) {
                    events.push(TrackerEvent::CircuitBreakerUpdate(update));
                }
            } else {
                self.cycle_count = cycle;
            }
            if max.is_some() {
                self.max_iterations = max;
            }
            self.pending_loop_update = true;
            return;
        }

        if let Some(caps) = self.patterns.elapsed.captures(line) {
            if let Some(hours) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
                self.elapsed_hours = hours;
                self.pending_loop_update = true;
            }
            return;
        }

        if let Some(caps) = self.patterns.legacy_cycle.captures(line) {
            if let Some(cycle) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                if cycle > self.cycle_count {
                    self.cycle_count = cycle;
                    self.last_iteration_change = Some(Instant::now());
                    self.stall_warned = false;
                    self.pending_loop_update = true;
                }
            }
            return;
        }

        if line.contains("TodoWrite") {
            self.last_activity = epoch_ms();
        }

        // A loop-start phrase arms the loop, but never re-arms one that
        // already completed; only an explicit start_loop() does that.
        if self.patterns.loop_start.is_match(line)
            && !self.active
            && self.completed_phrases.is_empty()
        {
            self.active = true;
            self.started_at = Some(epoch_ms());
            self.last_iteration_change = Some(Instant::now());
            self.stall_warned = false;
            self.pending_loop_update = true;
        }
    }

    /// Status block fence handling. Returns true when the line was
    /// consumed by the block machinery.
    fn scan_status_line(&mut self, line: &str, events: &mut Vec<TrackerEvent>) -> bool {
        let trimmed = line.trim();
        if !self.in_status_block {
            if trimmed == status::STATUS_BLOCK_START {
                self.in_status_block = true;
                self.block_lines.clear();
                return true;
            }
            return false;
        }

        if trimmed != status::STATUS_BLOCK_END {
            self.block_lines.push(line.to_string());
            return true;
        }

        self.in_status_block = false;
        let lines = std::mem::take(&mut self.block_lines);
        match status::parse_status_block(&lines) {
            Ok(block) => self.apply_status_block(block, events),
            Err(reason) => warn!("discarding malformed status block: {reason}"),
        }
        true
    }

    fn apply_status_block(&mut self, block: StatusBlock, events: &mut Vec<TrackerEvent>) {
        self.total_files_modified += u64::from(block.files_modified);
        self.total_tasks_completed += u64::from(block.tasks_completed_this_loop);

        if block.status == LoopStatus::Complete {
            self.completion_indicators += 1;
        }

        if let Some(update) = self.breaker.on_status_block(&block, self.cycle_count) {
            events.push(TrackerEvent::CircuitBreakerUpdate(update));
        }

        if block.exit_signal && self.completion_indicators >= 2 && !self.exit_gate_met {
            self.exit_gate_met = true;
            events.push(TrackerEvent::ExitGateMet {
                completion_indicators: self.completion_indicators,
                exit_signal: true,
            });
        }

        events.push(TrackerEvent::StatusBlockDetected(block.clone()));
        self.last_block = Some(block);
        self.pending_loop_update = true;
    }

    /// Purge todos unseen for longer than [`TODO_EXPIRY`], at most once per
    /// [`CLEANUP_THROTTLE`]. Not applied while a plan file is authoritative.
    fn maybe_expire_todos(&mut self) {
        let now = epoch_ms();
        if self.fix_plan_authoritative
            || now.saturating_sub(self.last_cleanup) < CLEANUP_THROTTLE.as_millis() as u64
        {
            return;
        }
        self.last_cleanup = now;
        let expiry = TODO_EXPIRY.as_millis() as u64;
        let before = self.todos.len();
        self.todos.retain(|_, todo| now.saturating_sub(todo.detected_at) < expiry);
        if self.todos.len() != before {
            debug!(removed = before - self.todos.len(), "expired stale todos");
            self.todo_start_times.retain(|id, _| self.todos.contains_key(id));
            self.pending_todo_update = true;
        }
    }

    /// Stall watcher tick (driven every 60 s by the owning task).
    pub fn check_stall(&mut self) -> Vec<TrackerEvent> {
        self.check_stall_at(Instant::now())
    }

    pub(crate) fn check_stall_at(&mut self, now: Instant) -> Vec<TrackerEvent> {
        if !self.active {
            return vec![];
        }
        let Some(last_change) = self.last_iteration_change else {
            return vec![];
        };
        let stalled_for = now.saturating_duration_since(last_change);

        if stalled_for >= STALL_CRITICAL {
            // Critical fires on every tick while the stall persists.
            return vec![TrackerEvent::IterationStallCritical { stalled_for }];
        }
        if stalled_for >= STALL_WARNING && !self.stall_warned {
            self.stall_warned = true;
            return vec![TrackerEvent::IterationStallWarning { stalled_for }];
        }
        vec![]
    }

    /// True when a debounced emission is waiting to be flushed.
    pub fn has_pending(&self) -> bool {
        self.pending_loop_update || self.pending_todo_update
    }

    /// Drain pending debounced emissions immediately.
    pub fn flush(&mut self) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        if std::mem::take(&mut self.pending_loop_update) {
            events.push(TrackerEvent::LoopUpdate(self.loop_snapshot()));
        }
        if std::mem::take(&mut self.pending_todo_update) {
            events.push(TrackerEvent::TodoUpdate(self.todos()));
        }
        events
    }

    /// Manually reset the circuit breaker to `CLOSED`.
    pub fn reset_circuit_breaker(&mut self) -> Vec<TrackerEvent> {
        match self.breaker.reset() {
            Some(update) => vec![TrackerEvent::CircuitBreakerUpdate(update)],
            None => vec![],
        }
    }

    /// Clear parsed state but preserve `enabled` and the circuit breaker.
    ///
    /// Pending emissions are left set so the owning task posts fresh
    /// (empty) snapshots on its next tick rather than from within the
    /// caller's stack.
    pub fn reset(&mut self) {
        self.active = false;
        self.started_at = None;
        self.cycle_count = 0;
        self.max_iterations = None;
        self.elapsed_hours = 0.0;
        self.completion_phrase = None;
        self.alternate_phrases.clear();
        self.completed_phrases.clear();
        self.phrase_counts.clear();
        self.skip_next_tagged = None;
        self.todos.clear();
        self.task_numbers.clear();
        self.todo_start_times.clear();
        self.completion_times.clear();
        self.fix_plan_authoritative = false;
        self.in_status_block = false;
        self.block_lines.clear();
        self.last_block = None;
        self.total_files_modified = 0;
        self.total_tasks_completed = 0;
        self.completion_indicators = 0;
        self.exit_gate_met = false;
        self.last_iteration_change = None;
        self.stall_warned = false;
        self.saw_tagged_sentinel = false;
        self.last_sentinel_known = false;
        self.last_sentinel_occurrences = 0;
        self.last_context_prompt_like = false;
        self.line_buffer.clear();
        self.partial_promise.clear();
        self.pending_loop_update = true;
        self.pending_todo_update = true;
    }

    /// [`RalphTracker::reset`] plus a circuit-breaker reset.
    pub fn full_reset(&mut self) {
        self.reset();
        self.breaker.reset();
    }

    /// [`RalphTracker::full_reset`] plus disable.
    pub fn clear(&mut self) {
        self.full_reset();
        self.enabled = false;
        self.pending_loop_update = false;
        self.pending_todo_update = false;
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
