// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const PID_TABLE: &str = "\
    1     0
  100     1
  101   100
  102   100
  103   102
  200     1
";

#[test]
fn pid_table_parses() {
    let children = parse_pid_table(PID_TABLE);
    assert_eq!(children.get(&100), Some(&vec![101, 102]));
    assert_eq!(children.get(&102), Some(&vec![103]));
    assert!(!children.contains_key(&103));
}

#[test]
fn descendants_are_leaf_first() {
    let children = parse_pid_table(PID_TABLE);
    let order = descendants_leaf_first(&children, 100);
    assert_eq!(order.len(), 3);
    // 103 (leaf) must come before its parent 102.
    let pos = |p: u32| order.iter().position(|&x| x == p).unwrap();
    assert!(pos(103) < pos(102));
    assert!(!order.contains(&100));
}

#[test]
fn descendants_of_leaf_is_empty() {
    let children = parse_pid_table(PID_TABLE);
    assert!(descendants_leaf_first(&children, 103).is_empty());
}

#[test]
fn sample_table_parses() {
    let samples = parse_sample_table("  100  2048  1.5\n  101  1024  0.0\n garbage line\n");
    assert_eq!(samples.get(&100), Some(&(2048, 1.5)));
    assert_eq!(samples.get(&101), Some(&(1024, 0.0)));
    assert_eq!(samples.len(), 2);
}

#[test]
fn trees_aggregate_memory_cpu_and_children() {
    let children = parse_pid_table(PID_TABLE);
    let mut samples = HashMap::new();
    samples.insert(100, (1024, 1.0));
    samples.insert(101, (2048, 2.0));
    samples.insert(102, (1024, 0.5));
    samples.insert(103, (1024, 0.5));
    samples.insert(200, (512, 0.0));

    let stats = aggregate_trees(&[100, 200], &children, &samples);
    let tree = stats.get(&100).unwrap();
    assert_eq!(tree.child_count, 3);
    assert!((tree.memory_mb - 5.0).abs() < 1e-9);
    assert!((tree.cpu_percent - 4.0).abs() < 1e-9);

    let lone = stats.get(&200).unwrap();
    assert_eq!(lone.child_count, 0);
    assert!((lone.memory_mb - 0.5).abs() < 1e-9);
}

#[test]
fn missing_samples_count_as_zero() {
    let children = parse_pid_table(PID_TABLE);
    let stats = aggregate_trees(&[100], &children, &HashMap::new());
    assert_eq!(stats.get(&100), Some(&ProcessStats { memory_mb: 0.0, cpu_percent: 0.0, child_count: 3 }));
}

#[test]
fn stats_serialize_camel_case() {
    let stats = ProcessStats { memory_mb: 1.5, cpu_percent: 2.0, child_count: 3 };
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["memoryMB"], serde_json::json!(1.5));
    assert_eq!(json["cpuPercent"], serde_json::json!(2.0));
    assert_eq!(json["childCount"], serde_json::json!(3));
}
