//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to publish
//! and observe what the render pool does.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publisher**: the orchestrator (`core::orchestrator`), and `SubscriberSet`
//!   workers for overflow/panic.
//! - **Consumers**: the pool's fan-out listener (feeds [`SubscriberSet`](crate::SubscriberSet))
//!   and any receiver obtained from [`RenderPool::events`](crate::RenderPool::events).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
