// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker: the safety gate that opens when successive iterations
//! show no progress, tests fail for too long, or the child reports itself
//! blocked.

use serde::{Deserialize, Serialize};

use crate::session::epoch_ms;

use super::status::{LoopStatus, StatusBlock, TestsStatus};

/// Consecutive no-progress blocks before the breaker half-opens.
pub const NO_PROGRESS_HALF_OPEN: u32 = 2;
/// Consecutive no-progress blocks before the breaker opens.
pub const NO_PROGRESS_OPEN: u32 = 3;
/// Consecutive failing-test blocks before the breaker opens.
pub const TESTS_FAILURE_OPEN: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    #[default]
    Closed,
    HalfOpen,
    Open,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::HalfOpen => "HALF_OPEN",
            Self::Open => "OPEN",
        }
    }
}

/// Full breaker snapshot, emitted with every state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatus {
    pub state: BreakerState,
    pub consecutive_no_progress: u32,
    pub consecutive_same_error: u32,
    pub consecutive_tests_failure: u32,
    pub last_progress_iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    pub last_transition_at: u64,
}

/// The three-state machine, driven once per received status block.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    status: BreakerStatus,
    last_recommendation: String,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &BreakerStatus {
        &self.status
    }

    pub fn state(&self) -> BreakerState {
        self.status.state
    }

    fn transition(&mut self, state: BreakerState, reason: Option<&str>) {
        self.status.state = state;
        self.status.reason_code = reason.map(str::to_string);
        self.status.last_transition_at = epoch_ms();
    }

    /// Feed one status block. Returns the updated snapshot when the state
    /// changed.
    pub fn on_status_block(&mut self, block: &StatusBlock, iteration: u32) -> Option<BreakerStatus> {
        let before = self.status.state;

        if block.status == LoopStatus::Blocked {
            self.transition(BreakerState::Open, Some("reported_blocked"));
            return self.changed_since(before);
        }

        if block.has_progress() {
            self.status.consecutive_no_progress = 0;
            self.status.consecutive_same_error = 0;
            self.status.last_progress_iteration = iteration;
            if self.status.state == BreakerState::HalfOpen {
                self.transition(BreakerState::Closed, Some("progress_resumed"));
            }
        } else {
            self.status.consecutive_no_progress += 1;
            if !block.recommendation.is_empty() && block.recommendation == self.last_recommendation
            {
                self.status.consecutive_same_error += 1;
            } else {
                self.status.consecutive_same_error = 0;
            }

            if self.status.consecutive_no_progress >= NO_PROGRESS_OPEN {
                self.transition(BreakerState::Open, Some("no_progress_open"));
            } else if self.status.state == BreakerState::Closed
                && self.status.consecutive_no_progress >= NO_PROGRESS_HALF_OPEN
            {
                self.transition(BreakerState::HalfOpen, Some("no_progress_half_open"));
            }
        }

        if block.tests_status == TestsStatus::Failing {
            self.status.consecutive_tests_failure += 1;
            if self.status.consecutive_tests_failure >= TESTS_FAILURE_OPEN {
                self.transition(BreakerState::Open, Some("tests_failing_open"));
            }
        } else if block.tests_status == TestsStatus::Passing {
            self.status.consecutive_tests_failure = 0;
        }

        self.last_recommendation = block.recommendation.clone();
        self.changed_since(before)
    }

    /// A strictly increasing iteration count clears the no-progress streak
    /// and closes a half-open breaker.
    pub fn on_iteration_advance(&mut self, iteration: u32) -> Option<BreakerStatus> {
        let before = self.status.state;
        self.status.consecutive_no_progress = 0;
        self.status.consecutive_same_error = 0;
        self.status.last_progress_iteration = iteration;
        if self.status.state == BreakerState::HalfOpen {
            self.transition(BreakerState::Closed, Some("iteration_advanced"));
        }
        self.changed_since(before)
    }

    /// Manual reset back to `CLOSED`.
    pub fn reset(&mut self) -> Option<BreakerStatus> {
        let before = self.status.state;
        self.status = BreakerStatus::default();
        self.last_recommendation.clear();
        if before != BreakerState::Closed {
            self.status.last_transition_at = epoch_ms();
        }
        self.changed_since(before)
    }

    fn changed_since(&self, before: BreakerState) -> Option<BreakerStatus> {
        (self.status.state != before).then(|| self.status.clone())
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
