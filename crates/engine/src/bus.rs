// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic non-blocking pub/sub broker.
//!
//! Publishers never block on slow consumers: each subscriber has a bounded
//! mailbox and a full mailbox drops the event for that subscriber only.
//! Callers that need delivery guarantees must poll state separately.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Per-subscriber mailbox capacity.
const MAILBOX_CAPACITY: usize = 64;

/// Fan-out broker for values of type `T`.
pub struct Broker<T> {
    subscribers: Arc<RwLock<HashMap<u64, mpsc::Sender<T>>>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl<T: Clone + Send + 'static> Broker<T> {
    pub fn new() -> Broker<T> {
        Broker {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Subscribe for the lifetime of `ctx`. The returned channel closes
    /// exactly once: when `ctx` is cancelled or the broker shuts down.
    pub fn subscribe(&self, ctx: &CancellationToken) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if self.shutdown.is_cancelled() {
            // Already shut down: hand back a closed channel.
            return rx;
        }
        self.subscribers.write().insert(id, tx);

        let subscribers = Arc::clone(&self.subscribers);
        let ctx = ctx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = shutdown.cancelled() => {}
            }
            // Dropping the sender closes the subscriber's channel.
            subscribers.write().remove(&id);
        });

        rx
    }

    /// Publish to every live subscriber without blocking. A subscriber
    /// whose mailbox is full misses this event.
    pub fn publish(&self, value: T) {
        let subscribers = self.subscribers.read();
        for (id, tx) in subscribers.iter() {
            if tx.try_send(value.clone()).is_err() {
                trace!(subscriber = id, "mailbox full or closed, dropping event");
            }
        }
    }

    /// Current subscriber count (diagnostics).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Close every subscriber channel and refuse new subscriptions.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.subscribers.write().clear();
    }
}

impl<T: Clone + Send + 'static> Default for Broker<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
