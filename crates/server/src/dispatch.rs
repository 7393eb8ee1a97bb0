// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session byte-stream fan-out.
//!
//! Each session has one bounded broadcast channel. Slow subscribers never
//! block the writer: when a subscriber falls behind, the oldest chunks are
//! dropped and the subscriber receives a `Dropped(n)` marker so clients can
//! re-fetch the history ring.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::ring::HistoryRing;

/// Per-subscriber queue depth, in chunks.
pub const SUBSCRIBER_QUEUE: usize = 1024;

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChunk {
    /// A chunk of captured output.
    Data(Bytes),
    /// `n` chunks were dropped because this subscriber lagged; re-fetch the
    /// ring via [`Dispatcher::snapshot`].
    Dropped(u64),
    /// The session ended; no further chunks will arrive.
    Closed,
}

struct Channel {
    tx: broadcast::Sender<Bytes>,
    ring: Arc<Mutex<HistoryRing>>,
}

/// Fans each session's byte stream to N subscribers.
#[derive(Default)]
pub struct Dispatcher {
    channels: Mutex<HashMap<String, Channel>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session's stream, sharing its history ring for hydration.
    pub fn register(&self, session_id: &str, ring: Arc<Mutex<HistoryRing>>) {
        let (tx, _) = broadcast::channel(SUBSCRIBER_QUEUE);
        self.channels.lock().insert(session_id.to_string(), Channel { tx, ring });
    }

    /// Drop a session's channel; live subscribers observe `Closed`.
    pub fn unregister(&self, session_id: &str) {
        self.channels.lock().remove(session_id);
    }

    /// Non-blocking publish to every live subscriber.
    pub fn publish(&self, session_id: &str, data: Bytes) {
        let channels = self.channels.lock();
        if let Some(channel) = channels.get(session_id) {
            // Send errors just mean no subscribers are listening.
            let _ = channel.tx.send(data);
        }
    }

    /// Subscribe to a session's live stream. `None` for unknown sessions.
    pub fn subscribe(&self, session_id: &str) -> Option<Subscription> {
        let channels = self.channels.lock();
        channels.get(session_id).map(|c| Subscription { rx: c.tx.subscribe() })
    }

    /// Current ring contents for hydrating a late subscriber.
    pub fn snapshot(&self, session_id: &str) -> Option<Vec<u8>> {
        let channels = self.channels.lock();
        channels.get(session_id).map(|c| c.ring.lock().snapshot())
    }

    /// Number of live subscribers for a session.
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        let channels = self.channels.lock();
        channels.get(session_id).map(|c| c.tx.receiver_count()).unwrap_or(0)
    }
}

/// A live subscription; drop (or [`Subscription::cancel`]) to release the
/// queue.
pub struct Subscription {
    rx: broadcast::Receiver<Bytes>,
}

impl Subscription {
    /// Receive the next chunk, lag marker, or terminal `Closed`.
    pub async fn next(&mut self) -> SessionChunk {
        match self.rx.recv().await {
            Ok(data) => SessionChunk::Data(data),
            Err(broadcast::error::RecvError::Lagged(n)) => SessionChunk::Dropped(n),
            Err(broadcast::error::RecvError::Closed) => SessionChunk::Closed,
        }
    }

    /// Explicitly cancel the subscription.
    pub fn cancel(self) {}
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
