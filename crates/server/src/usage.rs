// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session token accounting.
//!
//! Fed by the transport's stream parser (out of the core's scope); the core
//! accumulates lifetime totals and lets the respawn controller watch for an
//! auto-clear threshold crossing.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Cumulative token counts for the lifetime of a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Shared token counters, safe to bump from any task.
#[derive(Debug, Default)]
pub struct UsageState {
    input: AtomicU64,
    output: AtomicU64,
}

impl UsageState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate a delta; returns the updated totals.
    pub fn record(&self, input_tokens: u64, output_tokens: u64) -> TokenTotals {
        let input = self.input.fetch_add(input_tokens, Ordering::Relaxed) + input_tokens;
        let output = self.output.fetch_add(output_tokens, Ordering::Relaxed) + output_tokens;
        TokenTotals { input_tokens: input, output_tokens: output, total_tokens: input + output }
    }

    pub fn snapshot(&self) -> TokenTotals {
        let input = self.input.load(Ordering::Relaxed);
        let output = self.output.load(Ordering::Relaxed);
        TokenTotals { input_tokens: input, output_tokens: output, total_tokens: input + output }
    }

    /// Reset counters (after a context clear).
    pub fn reset(&self) {
        self.input.store(0, Ordering::Relaxed);
        self.output.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[path = "usage_tests.rs"]
mod tests;
