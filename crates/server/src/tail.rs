// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Tails a window's capture file for bytes appended after a tracked offset.
/// Uses `notify` for filesystem events with a polling fallback.
///
/// This is the byte source for a session's reader task: the multiplexer
/// logs the child's output stream to the capture file, and the supervisor
/// turns appended bytes into ring/dispatcher/tracker input.
pub struct CaptureTail {
    path: PathBuf,
    offset: u64,
    poll_interval: Duration,
}

impl CaptureTail {
    pub fn new(path: PathBuf) -> Self {
        Self { path, offset: 0, poll_interval: Duration::from_millis(250) }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Current byte offset into the capture file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read bytes appended since the last read.
    ///
    /// A missing file yields nothing (the window may not have produced
    /// output yet). If the file shrank below the tracked offset (log
    /// truncation), reading restarts from the beginning.
    pub fn read_new_bytes(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        if let Ok(meta) = file.metadata() {
            if meta.len() < self.offset {
                self.offset = 0;
            }
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        self.offset += buf.len() as u64;
        Ok(buf)
    }

    /// Tail the file until shutdown, sending appended chunks to `chunk_tx`.
    pub async fn run(mut self, chunk_tx: mpsc::Sender<Bytes>, shutdown: CancellationToken) {
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let _watcher = self.setup_notify_watcher(wake_tx);
        let mut poll = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = wake_rx.recv() => {}
                _ = poll.tick() => {}
            }

            match self.read_new_bytes() {
                Ok(bytes) if !bytes.is_empty() => {
                    if chunk_tx.send(Bytes::from(bytes)).await.is_err() {
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    /// Watch the capture file's parent directory so file creation is
    /// detected too. The watcher handle must be kept alive.
    fn setup_notify_watcher(
        &self,
        wake_tx: mpsc::Sender<()>,
    ) -> Option<notify::RecommendedWatcher> {
        use notify::{RecursiveMode, Watcher};

        let mut watcher = notify::recommended_watcher(move |_: notify::Result<notify::Event>| {
            let _ = wake_tx.try_send(());
        })
        .ok()?;

        let watch_path = self.path.parent().unwrap_or(self.path.as_ref());
        watcher.watch(watch_path, RecursiveMode::NonRecursive).ok()?;
        Some(watcher)
    }
}

#[cfg(test)]
#[path = "tail_tests.rs"]
mod tests;
