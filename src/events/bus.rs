//! # Event bus.
//!
//! [`Bus`] wraps a [`tokio::sync::broadcast`] channel. The orchestrator
//! publishes; the pool's fan-out listener and any receiver handed out by
//! `RenderPool::events` read.
//!
//! Publishing never waits. The ring buffer is shared by every receiver, so a
//! receiver that falls behind gets `RecvError::Lagged(n)` and loses the `n`
//! oldest events. Nothing is kept for receivers that subscribe later.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for pool events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Sends to current receivers; dropped when there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
