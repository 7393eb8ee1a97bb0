// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batched process statistics for supervised process trees.
//!
//! One `ps` invocation builds the pid→children table for every session at
//! once; a second queries RSS and CPU for the union of all pids. Per-tree
//! sums yield `{memoryMB, cpuPercent, childCount}`. A per-pid fallback path
//! produces the same record shape when the batch path fails.

use std::collections::HashMap;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::window::TOOL_TIMEOUT;

/// Aggregate resource usage of one supervised process tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStats {
    #[serde(rename = "memoryMB")]
    pub memory_mb: f64,
    pub cpu_percent: f64,
    pub child_count: u32,
}

/// Parse `ps -Ao pid=,ppid=` output into a parent→children map.
pub fn parse_pid_table(text: &str) -> HashMap<u32, Vec<u32>> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let (Some(pid), Some(ppid)) = (fields.next(), fields.next()) else {
            continue;
        };
        let (Ok(pid), Ok(ppid)) = (pid.parse::<u32>(), ppid.parse::<u32>()) else {
            continue;
        };
        children.entry(ppid).or_default().push(pid);
    }
    children
}

/// All descendants of `root`, leaf-first (children before parents),
/// excluding `root` itself.
pub fn descendants_leaf_first(children: &HashMap<u32, Vec<u32>>, root: u32) -> Vec<u32> {
    let mut out = Vec::new();
    let mut stack = vec![(root, false)];
    while let Some((pid, expanded)) = stack.pop() {
        if expanded {
            if pid != root {
                out.push(pid);
            }
            continue;
        }
        stack.push((pid, true));
        if let Some(kids) = children.get(&pid) {
            for &kid in kids {
                stack.push((kid, false));
            }
        }
    }
    out
}

/// Parse `ps -o pid=,rss=,%cpu=` output into pid → (rss KiB, cpu percent).
pub fn parse_sample_table(text: &str) -> HashMap<u32, (u64, f64)> {
    let mut out = HashMap::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let (Some(pid), Some(rss), Some(cpu)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let Ok(pid) = pid.parse::<u32>() else { continue };
        let rss = rss.parse::<u64>().unwrap_or(0);
        let cpu = cpu.parse::<f64>().unwrap_or(0.0);
        out.insert(pid, (rss, cpu));
    }
    out
}

/// Sum per-pid samples over each root's tree.
pub fn aggregate_trees(
    roots: &[u32],
    children: &HashMap<u32, Vec<u32>>,
    samples: &HashMap<u32, (u64, f64)>,
) -> HashMap<u32, ProcessStats> {
    let mut out = HashMap::new();
    for &root in roots {
        let descendants = descendants_leaf_first(children, root);
        let mut rss_kb = 0u64;
        let mut cpu = 0f64;
        for pid in descendants.iter().chain(std::iter::once(&root)) {
            if let Some(&(r, c)) = samples.get(pid) {
                rss_kb += r;
                cpu += c;
            }
        }
        out.insert(
            root,
            ProcessStats {
                memory_mb: rss_kb as f64 / 1024.0,
                cpu_percent: cpu,
                child_count: descendants.len() as u32,
            },
        );
    }
    out
}

async fn run_ps(args: &[&str]) -> anyhow::Result<String> {
    let output = tokio::time::timeout(
        TOOL_TIMEOUT,
        Command::new("ps").args(args).stdin(Stdio::null()).output(),
    )
    .await??;
    if !output.status.success() {
        anyhow::bail!("ps {:?} exited with {}", args, output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Sample resource usage for the given root pids.
///
/// Batch path: two `ps` invocations total. On failure, falls back to one
/// invocation per root (same record shape; descendants unknown, so
/// `child_count` is 0 and only the root's own usage is reported).
pub async fn sample_trees(roots: &[u32]) -> HashMap<u32, ProcessStats> {
    if roots.is_empty() {
        return HashMap::new();
    }

    match sample_batch(roots).await {
        Ok(stats) => stats,
        Err(e) => {
            warn!("batched stats failed, falling back to per-pid queries: {e}");
            sample_fallback(roots).await
        }
    }
}

async fn sample_batch(roots: &[u32]) -> anyhow::Result<HashMap<u32, ProcessStats>> {
    let table = run_ps(&["-Ao", "pid=,ppid="]).await?;
    let children = parse_pid_table(&table);

    let mut union: Vec<u32> = Vec::new();
    for &root in roots {
        union.push(root);
        union.extend(descendants_leaf_first(&children, root));
    }
    let pid_list = union.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(",");

    let sample = run_ps(&["-o", "pid=,rss=,%cpu=", "-p", &pid_list]).await?;
    let samples = parse_sample_table(&sample);
    Ok(aggregate_trees(roots, &children, &samples))
}

async fn sample_fallback(roots: &[u32]) -> HashMap<u32, ProcessStats> {
    let mut out = HashMap::new();
    for &root in roots {
        let pid = root.to_string();
        match run_ps(&["-o", "pid=,rss=,%cpu=", "-p", &pid]).await {
            Ok(text) => {
                let samples = parse_sample_table(&text);
                let (rss_kb, cpu) = samples.get(&root).copied().unwrap_or((0, 0.0));
                out.insert(
                    root,
                    ProcessStats {
                        memory_mb: rss_kb as f64 / 1024.0,
                        cpu_percent: cpu,
                        child_count: 0,
                    },
                );
            }
            Err(e) => {
                debug!(root, "per-pid stats query failed: {e}");
                out.insert(root, ProcessStats::default());
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
