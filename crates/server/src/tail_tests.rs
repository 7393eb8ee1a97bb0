// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::*;

#[test]
fn missing_file_reads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut tail = CaptureTail::new(dir.path().join("absent.log"));
    assert!(tail.read_new_bytes().unwrap().is_empty());
    assert_eq!(tail.offset(), 0);
}

#[test]
fn reads_only_appended_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cm-x.log");
    std::fs::write(&path, b"first").unwrap();

    let mut tail = CaptureTail::new(path.clone());
    assert_eq!(tail.read_new_bytes().unwrap(), b"first");
    assert!(tail.read_new_bytes().unwrap().is_empty());

    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b" second").unwrap();
    drop(file);

    assert_eq!(tail.read_new_bytes().unwrap(), b" second");
    assert_eq!(tail.offset(), 12);
}

#[test]
fn truncation_restarts_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cm-x.log");
    std::fs::write(&path, b"a long first round of output").unwrap();

    let mut tail = CaptureTail::new(path.clone());
    tail.read_new_bytes().unwrap();

    std::fs::write(&path, b"new").unwrap();
    assert_eq!(tail.read_new_bytes().unwrap(), b"new");
}

#[tokio::test]
async fn run_streams_appended_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cm-x.log");
    std::fs::write(&path, b"").unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let tail = CaptureTail::new(path.clone()).with_poll_interval(Duration::from_millis(50));
    let handle = tokio::spawn(tail.run(tx, shutdown.clone()));

    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"streamed output").unwrap();
    file.flush().unwrap();
    drop(file);

    let chunk = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("chunk wait timed out")
        .unwrap();
    assert_eq!(&chunk[..], b"streamed output");

    shutdown.cancel();
    let _ = handle.await;
}
