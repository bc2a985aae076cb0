//! # Event subscribers for the render pool.
//!
//! ```text
//! Orchestrator ── publish(Event) ──► Bus ──► fan-out listener ──► SubscriberSet
//!                                                                     │
//!                                                          ┌──────────┼──────────┐
//!                                                          ▼          ▼          ▼
//!                                                      LogWriter   Metrics    Custom
//! ```
//!
//! - [`Subscribe`] the trait user handlers implement
//! - [`SubscriberSet`] per-subscriber queues, workers and panic isolation
//! - [`LogWriter`] built-in `tracing` writer

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
