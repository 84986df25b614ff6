//! Event sink trait and implementations.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;

use super::PriceCacheEvent;

/// Trait for receiving price cache events.
///
/// # Design Rules
///
/// - `emit()` must be fast and non-blocking (no network calls, no DB writes)
/// - `emit()` is called from background tasks; implementations must only
///   enqueue, never mutate consumer-owned state
/// - Failure to emit must not affect the refresh (best-effort)
pub trait PriceEventSink: Send + Sync {
    /// Emit a single event.
    fn emit(&self, event: PriceCacheEvent);
}

/// No-op implementation for hosts that poll instead of listening.
#[derive(Clone, Default)]
pub struct NoOpEventSink;

impl PriceEventSink for NoOpEventSink {
    fn emit(&self, _event: PriceCacheEvent) {}
}

/// Mock sink for testing - collects emitted events.
#[derive(Clone, Default)]
pub struct MockEventSink {
    events: Arc<Mutex<Vec<PriceCacheEvent>>>,
}

impl MockEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    pub fn events(&self) -> Vec<PriceCacheEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }
}

impl PriceEventSink for MockEventSink {
    fn emit(&self, event: PriceCacheEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Sink that enqueues events on an unbounded channel.
///
/// Pair it with the [`PriceEventReceiver`] returned by [`event_channel`].
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<PriceCacheEvent>,
}

impl PriceEventSink for ChannelEventSink {
    fn emit(&self, event: PriceCacheEvent) {
        // The receiver is gone once the host has shut down; dropping is fine
        if self.tx.send(event).is_err() {
            debug!("Price event dropped: receiver closed");
        }
    }
}

/// Receiving end owned by the interactive thread.
pub struct PriceEventReceiver {
    rx: mpsc::UnboundedReceiver<PriceCacheEvent>,
}

impl PriceEventReceiver {
    /// Takes every queued event without blocking.
    ///
    /// Intended to be called once per iteration of the host's main loop.
    pub fn drain(&mut self) -> Vec<PriceCacheEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Waits for the next event (async hosts and tests).
    pub async fn recv(&mut self) -> Option<PriceCacheEvent> {
        self.rx.recv().await
    }

    /// Waits at most `timeout` for the next event.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<PriceCacheEvent> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Creates a connected sink/receiver pair.
pub fn event_channel() -> (ChannelEventSink, PriceEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelEventSink { tx }, PriceEventReceiver { rx })
}
