// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parser for the fenced `---RALPH_STATUS---` block the child emits between
//! iterations.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Start marker of the fenced block.
pub const STATUS_BLOCK_START: &str = "---RALPH_STATUS---";
/// End marker of the fenced block.
pub const STATUS_BLOCK_END: &str = "---END_RALPH_STATUS---";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopStatus {
    InProgress,
    Complete,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestsStatus {
    Passing,
    Failing,
    NotRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkType {
    Implementation,
    Testing,
    Documentation,
    Refactoring,
}

/// One parsed status block. Missing optional fields carry defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBlock {
    pub status: LoopStatus,
    pub tasks_completed_this_loop: u32,
    pub files_modified: u32,
    pub tests_status: TestsStatus,
    pub work_type: WorkType,
    pub exit_signal: bool,
    pub recommendation: String,
}

impl StatusBlock {
    /// True when this block reports concrete forward progress.
    pub fn has_progress(&self) -> bool {
        self.files_modified > 0 || self.tasks_completed_this_loop > 0
    }
}

/// Parse buffered block lines into a [`StatusBlock`].
///
/// Returns `Err` only when the required `STATUS` field is absent (the block
/// is discarded). Invalid enum values and unknown keys degrade field-by-field
/// with a warning, keeping the rest of the block.
pub fn parse_status_block(lines: &[String]) -> Result<StatusBlock, String> {
    let mut status: Option<LoopStatus> = None;
    let mut tasks_completed = 0u32;
    let mut files_modified = 0u32;
    let mut tests_status = TestsStatus::NotRun;
    let mut work_type = WorkType::Implementation;
    let mut exit_signal = false;
    let mut recommendation = String::new();

    for raw in lines {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            warn!("status block: ignoring non key:value line {line:?}");
            continue;
        };
        let key = key.trim().to_ascii_uppercase();
        let value = value.trim();

        match key.as_str() {
            "STATUS" => match value.to_ascii_uppercase().as_str() {
                "IN_PROGRESS" => status = Some(LoopStatus::InProgress),
                "COMPLETE" => status = Some(LoopStatus::Complete),
                "BLOCKED" => status = Some(LoopStatus::Blocked),
                other => warn!("status block: invalid STATUS value {other:?}"),
            },
            "TASKS_COMPLETED_THIS_LOOP" => match value.parse() {
                Ok(n) => tasks_completed = n,
                Err(_) => warn!("status block: invalid TASKS_COMPLETED_THIS_LOOP {value:?}"),
            },
            "FILES_MODIFIED" => match value.parse() {
                Ok(n) => files_modified = n,
                Err(_) => warn!("status block: invalid FILES_MODIFIED {value:?}"),
            },
            "TESTS_STATUS" => match value.to_ascii_uppercase().as_str() {
                "PASSING" => tests_status = TestsStatus::Passing,
                "FAILING" => tests_status = TestsStatus::Failing,
                "NOT_RUN" => tests_status = TestsStatus::NotRun,
                other => warn!("status block: invalid TESTS_STATUS value {other:?}"),
            },
            "WORK_TYPE" => match value.to_ascii_uppercase().as_str() {
                "IMPLEMENTATION" => work_type = WorkType::Implementation,
                "TESTING" => work_type = WorkType::Testing,
                "DOCUMENTATION" => work_type = WorkType::Documentation,
                "REFACTORING" => work_type = WorkType::Refactoring,
                other => warn!("status block: invalid WORK_TYPE value {other:?}"),
            },
            "EXIT_SIGNAL" => match value.to_ascii_lowercase().as_str() {
                "true" => exit_signal = true,
                "false" => exit_signal = false,
                other => warn!("status block: invalid EXIT_SIGNAL value {other:?}"),
            },
            "RECOMMENDATION" => recommendation = value.to_string(),
            other => warn!("status block: unknown field {other:?}"),
        }
    }

    let Some(status) = status else {
        return Err("missing required STATUS field".to_string());
    };

    Ok(StatusBlock {
        status,
        tasks_completed_this_loop: tasks_completed,
        files_modified,
        tests_status,
        work_type,
        exit_signal,
        recommendation,
    })
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
