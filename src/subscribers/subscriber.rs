//! # Pool event subscribers.
//!
//! [`Subscribe`] is how callers watch the render pool: exporters for queue
//! depth, audit trails of failed renders, alerting on repeated unit restarts.
//!
//! A subscriber never runs on the orchestrator. [`SubscriberSet`](super::SubscriberSet)
//! gives it its own bounded mailbox and a tokio task that drains it in order.
//! When the mailbox is full the event is dropped for that subscriber alone and
//! `EventKind::SubscriberOverflow` goes out on the bus. A panic in `on_event`
//! is caught and surfaces as `EventKind::SubscriberPanicked`.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use rendervisor::{Event, EventKind, Subscribe};
//!
//! struct TimeoutCounter;
//!
//! #[async_trait]
//! impl Subscribe for TimeoutCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::TaskTimedOut) {
//!             // bump a counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "timeouts" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives every pool event, one at a time.
///
/// Keep `on_event` non-blocking. A slow subscriber only backs up its own mailbox.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Label carried by overflow and panic events about this subscriber.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Mailbox size, at least 1. Defaults to 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
