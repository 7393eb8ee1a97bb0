// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion sentinel handling: `<promise>PHRASE</promise>` tags, bare
//! phrase occurrences, and declared-phrase validation.

use tracing::debug;

use crate::session::epoch_ms;

use super::similarity::{is_fuzzy_phrase_match, normalize_phrase};
use super::{RalphTracker, TrackerEvent, ValidationReason, MAX_PARTIAL_PROMISE, MAX_PHRASE_ENTRIES};

/// Maximum Levenshtein distance for phrase equivalence.
pub const PHRASE_FUZZ: usize = 2;
/// Minimum normalized phrase length before a `short` warning.
pub const MIN_PHRASE_LEN: usize = 6;

/// Generic words that make a completion phrase risky. Matched against the
/// phrase's words case-sensitively: an ALL-CAPS `DONE` is generic, a
/// lowercase `done` inside a longer phrase is judged by the other rules.
const COMMON_WORDS: &[&str] =
    &["DONE", "OK", "OKAY", "COMPLETE", "COMPLETED", "FINISHED", "SUCCESS", "END", "READY", "YES"];

/// Validate a declared completion phrase; `None` when it looks safe.
pub fn validate_phrase(phrase: &str) -> Option<TrackerEvent> {
    let reason = if phrase
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|w| COMMON_WORDS.contains(&w))
    {
        Some(ValidationReason::Common)
    } else {
        let normalized = normalize_phrase(phrase);
        if !normalized.is_empty() && normalized.chars().all(|c| c.is_ascii_digit()) {
            Some(ValidationReason::Numeric)
        } else if normalized.chars().count() < MIN_PHRASE_LEN {
            Some(ValidationReason::Short)
        } else {
            None
        }
    };

    reason.map(|reason| TrackerEvent::PhraseValidationWarning {
        phrase: phrase.to_string(),
        reason,
        suggestion: suggest_phrase(phrase),
    })
}

/// Synthesize a safer phrase by appending a short timestamp-derived suffix.
fn suggest_phrase(phrase: &str) -> String {
    format!("{}_{:05}", phrase.trim(), epoch_ms() % 100_000)
}

impl RalphTracker {
    /// Declare the expected completion phrase, validating it.
    pub fn set_completion_phrase(&mut self, phrase: &str) -> Vec<TrackerEvent> {
        self.completion_phrase = Some(phrase.to_string());
        self.pending_loop_update = true;
        match validate_phrase(phrase) {
            Some(warning) => vec![warning],
            None => vec![],
        }
    }

    /// Register an alternate phrase that also counts as completion.
    pub fn add_alternate_phrase(&mut self, phrase: &str) {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return;
        }
        if !self.alternate_phrases.iter().any(|p| p == phrase) {
            self.alternate_phrases.push(phrase.to_string());
            self.pending_loop_update = true;
        }
    }

    /// Does `candidate` fuzzily match the primary phrase or any alternate?
    pub(crate) fn matches_known_phrase(&self, candidate: &str) -> bool {
        self.completion_phrase
            .iter()
            .chain(self.alternate_phrases.iter())
            .any(|known| is_fuzzy_phrase_match(candidate, known, PHRASE_FUZZ))
    }

    /// Cross-chunk sentinel probe: scan the carry buffer concatenated with
    /// the new chunk for a tag split across the boundary. Matches fully
    /// inside the new chunk are left for the line pipeline.
    pub(crate) fn probe_partial_promise(&mut self, text: &str, events: &mut Vec<TrackerEvent>) {
        let boundary = self.partial_promise.len();
        let probe = format!("{}{}", self.partial_promise, text);

        let spanning: Vec<String> = self
            .patterns
            .promise
            .captures_iter(&probe)
            .filter_map(|caps| {
                let m = caps.get(0)?;
                let phrase = caps.get(1)?.as_str().trim().to_string();
                (m.start() < boundary && m.end() > boundary).then_some(phrase)
            })
            .collect();

        for phrase in spanning {
            debug!(phrase, "sentinel tag spanned a chunk boundary");
            // The completed line will contain the same tag; skip it once.
            self.skip_next_tagged = Some(normalize_phrase(&phrase));
            self.on_tagged_phrase(&phrase, events);
        }

        // Carry the probe tail, bounded and on a char boundary.
        let mut from = probe.len().saturating_sub(MAX_PARTIAL_PROMISE);
        while !probe.is_char_boundary(from) {
            from += 1;
        }
        self.partial_promise = probe[from..].to_string();
    }

    /// Per-line sentinel scan: tagged occurrences, then bare occurrences.
    pub(crate) fn scan_sentinel_line(&mut self, line: &str, events: &mut Vec<TrackerEvent>) {
        let tagged: Vec<String> = self
            .patterns
            .promise
            .captures_iter(line)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
            .collect();

        for phrase in &tagged {
            let norm = normalize_phrase(phrase);
            if self.skip_next_tagged.as_deref() == Some(norm.as_str()) {
                self.skip_next_tagged = None;
                continue;
            }
            self.on_tagged_phrase(phrase, events);
        }

        if tagged.is_empty() {
            self.scan_bare_phrase(line, events);
        }
    }

    /// A tagged `<promise>PHRASE</promise>` occurrence.
    fn on_tagged_phrase(&mut self, phrase: &str, events: &mut Vec<TrackerEvent>) {
        self.saw_tagged_sentinel = true;
        self.last_context_prompt_like = false;
        let count = self.bump_phrase_count(phrase);
        self.last_sentinel_occurrences = count;

        if self.completion_phrase.is_none() {
            // First declaration: record it, validate, surface a loop update.
            events.extend(self.set_completion_phrase(phrase));
        }
        self.last_sentinel_known = self.matches_known_phrase(phrase);

        if count >= 2 || self.active {
            self.complete_with(phrase, events);
        }
    }

    /// Bare occurrence of a known phrase on its own line.
    fn scan_bare_phrase(&mut self, line: &str, events: &mut Vec<TrackerEvent>) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        // Prompt-context heuristics: instructions that merely mention the
        // phrase must not complete the loop.
        let lower = trimmed.to_lowercase();
        if lower.contains("output:") || lower.contains("completion phrase") {
            self.last_context_prompt_like = true;
            return;
        }

        let known: Vec<String> = self
            .completion_phrase
            .iter()
            .chain(self.alternate_phrases.iter())
            .cloned()
            .collect();
        for candidate in known {
            if is_fuzzy_phrase_match(trimmed, &candidate, PHRASE_FUZZ) {
                // Bare matches only count after the tagged form was seen or
                // while the loop is explicitly active.
                if self.saw_tagged_sentinel || self.active {
                    self.last_sentinel_known = true;
                    self.complete_with(&candidate, events);
                }
                return;
            }
        }
    }

    /// Apply completion effects exactly once per phrase.
    pub(crate) fn complete_with(&mut self, phrase: &str, events: &mut Vec<TrackerEvent>) {
        let norm = normalize_phrase(phrase);
        if !self.completed_phrases.insert(norm) {
            return;
        }
        self.mark_all_todos_completed();
        self.active = false;
        self.pending_loop_update = true;
        self.pending_todo_update = true;
        events.push(TrackerEvent::CompletionDetected { phrase: phrase.to_string() });
    }

    /// Bump the occurrence count for a phrase, trimming the map to the
    /// top-counted entries on overflow.
    fn bump_phrase_count(&mut self, phrase: &str) -> u32 {
        let norm = normalize_phrase(phrase);
        let count = self.phrase_counts.entry(norm).or_insert(0);
        *count += 1;
        let count = *count;

        if self.phrase_counts.len() > MAX_PHRASE_ENTRIES {
            let mut entries: Vec<(String, u32)> = self.phrase_counts.drain().collect();
            entries.sort_by(|a, b| b.1.cmp(&a.1));
            entries.truncate(MAX_PHRASE_ENTRIES);
            self.phrase_counts = entries.into_iter().collect();
        }
        count
    }
}

#[cfg(test)]
#[path = "sentinel_tests.rs"]
mod tests;
